//! The backup run: count, then copy, then persist.
//!
//! [`BackupEngine::run`] is synchronous and processes files strictly one at a
//! time. [`BackupHandle::spawn`] runs an engine on its own thread and exposes
//! the event stream and cancellation to whoever is observing.
//!
//! Events carry the user-facing log lines; the same outcomes are mirrored to
//! `tracing` for diagnostics.

use crate::error::{Result, VaultError};
use crate::index::{Index, IndexStore};
use crate::operations::copy_with_metadata;
use crate::plugin::Classification;
use crate::registry;
use crossbeam_channel::{Receiver, Sender};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Events emitted by a backup run, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupEvent {
    /// Percentage of counted files copied so far, 0-100, never decreasing.
    Progress(u8),
    /// A human-readable log line.
    Log(String),
    /// Fired exactly once, after the index save was attempted.
    Completed(BackupSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    /// Plugin files found during the count phase
    pub total: usize,
    pub copied: usize,
    /// Files whose destination already existed
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub index_saved: bool,
}

impl BackupSummary {
    pub fn processed(&self) -> usize {
        self.copied + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Copied,
    Skipped,
    Failed,
}

/// Sends events, ignoring a receiver that has gone away.
struct Emitter<'a> {
    tx: &'a Sender<BackupEvent>,
}

impl Emitter<'_> {
    fn log(&self, message: String) {
        let _ = self.tx.send(BackupEvent::Log(message));
    }

    fn progress(&self, percent: u8) {
        let _ = self.tx.send(BackupEvent::Progress(percent));
    }

    fn completed(&self, summary: BackupSummary) {
        let _ = self.tx.send(BackupEvent::Completed(summary));
    }
}

fn percent(copied: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (copied.saturating_mul(100) / total).min(100) as u8
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

pub struct BackupEngine {
    source_roots: Vec<PathBuf>,
    backup_root: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl BackupEngine {
    /// Relative paths are resolved against the current directory so that
    /// recorded paths are absolute.
    pub fn new(source_roots: Vec<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        BackupEngine {
            source_roots: source_roots.into_iter().map(absolutize).collect(),
            backup_root: absolutize(backup_root.into()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run one backup to completion or cancellation.
    ///
    /// Per-file failures and index problems are reported as log events;
    /// the run itself always completes.
    pub fn run(&self, events: &Sender<BackupEvent>) -> BackupSummary {
        let emit = Emitter { tx: events };
        let store = IndexStore::new(&self.backup_root);
        let mut summary = BackupSummary::default();

        info!(
            backup_root = %self.backup_root.display(),
            sources = self.source_roots.len(),
            "Starting backup run"
        );

        let mut index = match store.try_load() {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Index unreadable, starting with an empty one");
                emit.log(format!("⚠️ Index unreadable, starting fresh: {}", e));
                Index::new()
            }
        };

        summary.total = registry::count_plugins(&self.source_roots);
        info!(total = summary.total, "Counted plugin files");

        if summary.total == 0 {
            emit.log("⚠️ No VST plugins found.".to_string());
            emit.progress(100);
            emit.completed(summary.clone());
            return summary;
        }

        let mut cancelled = false;
        'roots: for root in &self.source_roots {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }
            if !root.exists() {
                debug!(root = %root.display(), "Source root missing, skipping");
                continue;
            }

            for source in registry::discover(root) {
                if self.is_cancelled() {
                    cancelled = true;
                    break 'roots;
                }

                match self.process_file(&source, &mut index, &emit) {
                    FileOutcome::Copied => summary.copied += 1,
                    FileOutcome::Skipped => summary.skipped += 1,
                    FileOutcome::Failed => summary.failed += 1,
                }
                emit.progress(percent(summary.copied, summary.total));
            }
        }

        if cancelled {
            summary.cancelled = true;
            info!(processed = summary.processed(), "Backup cancelled");
            emit.log("❌ Backup cancelled.".to_string());
        }

        match store.save(&index) {
            Ok(()) => summary.index_saved = true,
            Err(e) => {
                warn!(error = %e, "Failed to save index");
                emit.log(format!("⚠️ Index save error: {}", e));
            }
        }

        info!(
            copied = summary.copied,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Backup run finished"
        );
        emit.progress(100);
        emit.completed(summary.clone());
        summary
    }

    fn process_file(&self, source: &Path, index: &mut Index, emit: &Emitter<'_>) -> FileOutcome {
        let Some(class) = Classification::of(source) else {
            warn!(path = %source.display(), "Skipping path without a file name");
            return FileOutcome::Failed;
        };

        let dest = class.destination(&self.backup_root);
        if let Some(target_dir) = dest.parent() {
            if let Err(e) = fs::create_dir_all(target_dir) {
                return copy_failed(&class.name, source, &e, emit);
            }
        }

        if dest.exists() {
            debug!(plugin = %class.name, dest = %dest.display(), "Destination exists, skipping");
            emit.log(format!("🔁 Exists: {}", class.name));
            return FileOutcome::Skipped;
        }

        match copy_with_metadata(source, &dest) {
            Ok(_) => {
                info!(
                    plugin = %class.name,
                    plugin_type = %class.plugin_type,
                    arch = %class.arch,
                    vendor = %class.vendor,
                    "Copied plugin"
                );
                emit.log(format!("✅ Copied: {}", class.name));
                let key = class.key();
                index.insert(key, class.into_record(source.to_path_buf(), dest));
                FileOutcome::Copied
            }
            Err(e) => copy_failed(&class.name, source, &e, emit),
        }
    }
}

fn copy_failed(name: &str, source: &Path, err: &io::Error, emit: &Emitter<'_>) -> FileOutcome {
    warn!(plugin = %name, source = %source.display(), error = %err, "Copy failed");
    emit.log(format!("❌ Error copying {}: {}", name, err));
    FileOutcome::Failed
}

/// A backup running on a dedicated thread.
pub struct BackupHandle {
    events: Receiver<BackupEvent>,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<BackupSummary>,
}

impl BackupHandle {
    /// Start a backup run in the background.
    ///
    /// Only one run per backup root should be active at a time; callers are
    /// expected to disable starting another until this one completes.
    pub fn spawn(source_roots: Vec<PathBuf>, backup_root: impl Into<PathBuf>) -> Result<Self> {
        let engine = BackupEngine::new(source_roots, backup_root);
        let cancel = engine.cancel_flag();
        let (tx, rx) = crossbeam_channel::unbounded();

        let worker = thread::Builder::new()
            .name("plugvault-backup".to_string())
            .spawn(move || engine.run(&tx))?;

        Ok(BackupHandle {
            events: rx,
            cancel,
            worker,
        })
    }

    pub fn events(&self) -> &Receiver<BackupEvent> {
        &self.events
    }

    /// Request cancellation. Takes effect before the next file; repeated
    /// calls, or calls after completion, do nothing.
    pub fn cancel(&self) {
        if !self.cancel.swap(true, Ordering::SeqCst) {
            info!("Cancellation requested");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the run to finish and return its summary.
    pub fn join(self) -> Result<BackupSummary> {
        self.worker.join().map_err(|_| {
            VaultError::Io(io::Error::new(io::ErrorKind::Other, "backup worker panicked"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::INDEX_FILE_NAME;
    use crate::plugin::{Arch, PluginKey, PluginType};
    use tempfile::TempDir;

    fn touch(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn run_collect(engine: &BackupEngine) -> (BackupSummary, Vec<BackupEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let summary = engine.run(&tx);
        drop(tx);
        (summary, rx.iter().collect())
    }

    /// Run on a scoped worker over a rendezvous channel, so `observe` sees
    /// each event before the engine can move past it.
    fn run_observed(
        engine: &BackupEngine,
        mut observe: impl FnMut(&BackupEvent),
    ) -> (BackupSummary, Vec<BackupEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(0);
        thread::scope(|scope| {
            let worker = scope.spawn(move || engine.run(&tx));
            let mut events = Vec::new();
            for event in rx.iter() {
                observe(&event);
                events.push(event);
            }
            (worker.join().unwrap(), events)
        })
    }

    fn completed_count(events: &[BackupEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, BackupEvent::Completed(_)))
            .count()
    }

    fn logs(events: &[BackupEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                BackupEvent::Log(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    fn progress(events: &[BackupEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                BackupEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(5, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_program_files_x86_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("Program Files (x86)").join("Vendor");
        let source = src_root.join("VSTPlugins").join("Synth.dll");
        touch(&source, b"synth");
        let backup_root = temp_dir.path().join("backup");

        let engine = BackupEngine::new(vec![src_root], &backup_root);
        let (summary, events) = run_collect(&engine);

        assert_eq!(summary.total, 1);
        assert_eq!(summary.copied, 1);
        assert!(summary.index_saved);

        let dest = backup_root.join("VST2/32_bit/VSTPlugins/Synth.dll");
        assert_eq!(fs::read(&dest).unwrap(), b"synth");

        let index = IndexStore::new(&backup_root).try_load().unwrap();
        let key = PluginKey::new("Synth.dll", PluginType::VST2, Arch::Bit32, "VSTPlugins");
        let record = index.get(&key).unwrap();
        assert_eq!(record.arch, Arch::Bit32);
        assert_eq!(record.plugin_type, PluginType::VST2);
        assert_eq!(record.vendor, "VSTPlugins");
        assert_eq!(record.original_path, source);
        assert_eq!(record.backup_path, dest);

        assert_eq!(logs(&events), vec!["✅ Copied: Synth.dll"]);
        assert!(matches!(events.last(), Some(BackupEvent::Completed(_))));
    }

    #[test]
    fn test_second_run_skips_and_keeps_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        touch(&src_root.join("Acme/Comp.vst3"), b"comp");
        let backup_root = temp_dir.path().join("backup");

        let engine = BackupEngine::new(vec![src_root.clone()], &backup_root);
        run_collect(&engine);
        let first = IndexStore::new(&backup_root).try_load().unwrap();

        let (summary, events) = run_collect(&engine);
        let second = IndexStore::new(&backup_root).try_load().unwrap();

        assert_eq!(summary.copied, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(first, second);
        assert_eq!(logs(&events), vec!["🔁 Exists: Comp.vst3", "🔁 Exists: Synth.dll"]);
        // Only skips: progress stays at 0 until the forced final 100.
        assert_eq!(progress(&events), vec![0, 0, 100]);
    }

    #[test]
    fn test_same_key_from_two_roots_keeps_first() {
        let temp_dir = TempDir::new().unwrap();
        let root_a = temp_dir.path().join("a");
        let root_b = temp_dir.path().join("b");
        touch(&root_a.join("Acme/Synth.dll"), b"first");
        touch(&root_b.join("Acme/Synth.dll"), b"second");
        let backup_root = temp_dir.path().join("backup");

        let engine = BackupEngine::new(vec![root_a.clone(), root_b], &backup_root);
        let (summary, events) = run_collect(&engine);

        assert_eq!(summary.copied, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(
            fs::read(backup_root.join("VST2/64_bit/Acme/Synth.dll")).unwrap(),
            b"first"
        );

        let index = IndexStore::new(&backup_root).try_load().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get_index(0).unwrap().1.original_path,
            root_a.join("Acme/Synth.dll")
        );
        assert_eq!(progress(&events), vec![50, 50, 100]);
    }

    #[test]
    fn test_no_plugins_found() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("readme.txt"), b"hello");
        let backup_root = temp_dir.path().join("backup");

        let engine = BackupEngine::new(
            vec![temp_dir.path().join("missing"), src_root],
            &backup_root,
        );
        let (summary, events) = run_collect(&engine);

        assert_eq!(summary.total, 0);
        assert_eq!(summary.processed(), 0);
        assert!(!backup_root.join(INDEX_FILE_NAME).exists());
        assert_eq!(
            events,
            vec![
                BackupEvent::Log("⚠️ No VST plugins found.".to_string()),
                BackupEvent::Progress(100),
                BackupEvent::Completed(summary),
            ]
        );
    }

    #[test]
    fn test_cancel_before_start_saves_existing_index() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        let backup_root = temp_dir.path().join("backup");

        let engine = BackupEngine::new(vec![src_root], &backup_root);
        engine.cancel_flag().store(true, Ordering::SeqCst);
        let (summary, events) = run_collect(&engine);

        assert!(summary.cancelled);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.processed(), 0);
        assert!(summary.index_saved);
        assert!(logs(&events).contains(&"❌ Backup cancelled."));
        assert_eq!(progress(&events), vec![100]);
        assert_eq!(completed_count(&events), 1);
    }

    #[test]
    fn test_cancel_mid_run_saves_partial_index() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        for name in ["A.dll", "B.dll", "C.dll"] {
            touch(&src_root.join("Acme").join(name), b"x");
        }
        let backup_root = temp_dir.path().join("backup");

        let cancel = Arc::new(AtomicBool::new(false));
        let engine = BackupEngine::new(vec![src_root], &backup_root)
            .with_cancel_flag(Arc::clone(&cancel));

        let (summary, events) = run_observed(&engine, |event| {
            if let BackupEvent::Log(line) = event {
                if line.starts_with("✅ Copied") {
                    cancel.store(true, Ordering::SeqCst);
                }
            }
        });

        assert!(summary.cancelled);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.copied, 1);
        assert_eq!(summary.processed(), 1);
        assert!(summary.index_saved);
        assert_eq!(logs(&events), vec!["✅ Copied: A.dll", "❌ Backup cancelled."]);
        assert_eq!(progress(&events), vec![33, 100]);
        assert_eq!(completed_count(&events), 1);
        assert!(matches!(events.last(), Some(BackupEvent::Completed(_))));

        let index = IndexStore::new(&backup_root).try_load().unwrap();
        assert_eq!(index.len(), 1);
        assert!(index
            .get(&PluginKey::new("A.dll", PluginType::VST2, Arch::Bit64, "Acme"))
            .is_some());
        assert!(!backup_root.join("VST2/64_bit/Acme/B.dll").exists());
    }

    #[test]
    fn test_cancel_after_last_file_is_not_a_cancelled_run() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        let backup_root = temp_dir.path().join("backup");

        let cancel = Arc::new(AtomicBool::new(false));
        let engine = BackupEngine::new(vec![src_root], &backup_root)
            .with_cancel_flag(Arc::clone(&cancel));

        // The only file is done; the flag is raised before the engine reaches
        // the end of the run.
        let (summary, events) = run_observed(&engine, |event| {
            if matches!(event, BackupEvent::Log(_)) {
                cancel.store(true, Ordering::SeqCst);
            }
        });

        assert!(!summary.cancelled);
        assert_eq!(summary.copied, 1);
        assert_eq!(logs(&events), vec!["✅ Copied: Synth.dll"]);
        assert_eq!(completed_count(&events), 1);
    }

    #[test]
    fn test_index_save_failure_is_logged_and_run_completes() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        let backup_root = temp_dir.path().join("backup");
        // A directory where the index file should go.
        fs::create_dir_all(backup_root.join(INDEX_FILE_NAME)).unwrap();

        let engine = BackupEngine::new(vec![src_root], &backup_root);
        let (summary, events) = run_collect(&engine);

        assert_eq!(summary.copied, 1);
        assert!(!summary.index_saved);
        assert!(logs(&events)
            .iter()
            .any(|line| line.starts_with("⚠️ Index save error: ")));
        assert!(backup_root.join("VST2/64_bit/Acme/Synth.dll").is_file());
        assert!(!backup_root.join("backup_index.json.tmp").exists());
        assert_eq!(progress(&events).last(), Some(&100));
        assert_eq!(completed_count(&events), 1);
        assert!(matches!(
            events.last(),
            Some(BackupEvent::Completed(s)) if !s.index_saved
        ));
    }

    #[test]
    fn test_copy_failure_is_logged_and_run_continues() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Comp.vst3"), b"comp");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        let backup_root = temp_dir.path().join("backup");
        // A file where the VST2 tree should be makes every VST2 copy fail.
        touch(&backup_root.join("VST2"), b"in the way");

        let engine = BackupEngine::new(vec![src_root], &backup_root);
        let (summary, events) = run_collect(&engine);

        assert_eq!(summary.copied, 1);
        assert_eq!(summary.failed, 1);
        let lines = logs(&events);
        assert_eq!(lines[0], "✅ Copied: Comp.vst3");
        assert!(lines[1].starts_with("❌ Error copying Synth.dll: "));

        let index = IndexStore::new(&backup_root).try_load().unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_corrupt_index_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        let backup_root = temp_dir.path().join("backup");
        touch(&backup_root.join(INDEX_FILE_NAME), b"][");

        let engine = BackupEngine::new(vec![src_root], &backup_root);
        let (summary, events) = run_collect(&engine);

        assert_eq!(summary.copied, 1);
        assert!(logs(&events)[0].starts_with("⚠️ Index unreadable, starting fresh"));
        assert_eq!(IndexStore::new(&backup_root).try_load().unwrap().len(), 1);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        for i in 0..7 {
            touch(&src_root.join(format!("V{}/P{}.dll", i % 3, i)), b"x");
        }
        let backup_root = temp_dir.path().join("backup");

        let (_, events) = run_collect(&BackupEngine::new(vec![src_root], &backup_root));
        let values = progress(&events);

        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&100));
        assert_eq!(values.len(), 8);
    }

    #[test]
    fn test_handle_runs_in_background() {
        let temp_dir = TempDir::new().unwrap();
        let src_root = temp_dir.path().join("plugins");
        touch(&src_root.join("Acme/Synth.dll"), b"synth");
        let backup_root = temp_dir.path().join("backup");

        let handle = BackupHandle::spawn(vec![src_root], &backup_root).unwrap();
        let mut completed = None;
        for event in handle.events().iter() {
            if let BackupEvent::Completed(summary) = event {
                completed = Some(summary);
                break;
            }
        }
        handle.cancel();
        let summary = handle.join().unwrap();

        assert_eq!(completed, Some(summary.clone()));
        assert_eq!(summary.copied, 1);
        assert!(!summary.cancelled);
    }
}

//! Plugin source locations and discovery.
//!
//! # Platform-Specific Behavior
//!
//! ## Windows
//! - VST2 plugins are `.dll` files under the various `VSTPlugins` folders
//! - VST3 plugins live under `Common Files\VST3`; bundles are directories whose
//!   binaries are `.vst3` files deeper in the tree
//! - Both `Program Files` and `Program Files (x86)` are scanned, which is what
//!   makes the path-based architecture split meaningful
//!
//! ## macOS
//! - Scans both system `/Library` and user `~/Library` plug-in folders
//!
//! Discovery walks every root depth-first. Within a directory, files come first
//! and then subdirectories, each sorted by name, so two walks over an unchanged
//! tree visit files in the same order.

use crate::plugin::is_plugin_file_name;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Returns the standard plugin directories for the current platform,
/// without duplicates and in a stable order.
pub fn default_source_roots() -> Vec<PathBuf> {
    #[allow(unused_mut)]
    let mut roots: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "windows")]
    {
        for dir in [
            r"C:\Program Files (x86)\Audio Plugins",
            r"C:\Program Files\Audio Plugins",
            r"C:\Program Files (x86)\VSTPlugins",
            r"C:\Program Files\VSTPlugins",
            r"C:\Program Files\Steinberg\VSTPlugins",
            r"C:\Program Files (x86)\Steinberg\VSTPlugins",
            r"C:\Program Files\Common Files\VST3",
            r"C:\Program Files (x86)\Common Files\VST3",
        ] {
            roots.push(PathBuf::from(dir));
        }
    }

    #[cfg(target_os = "macos")]
    {
        roots.push(PathBuf::from("/Library/Audio/Plug-Ins/VST"));
        roots.push(PathBuf::from("/Library/Audio/Plug-Ins/VST3"));
        if let Some(base) = directories::BaseDirs::new() {
            roots.push(base.home_dir().join("Library/Audio/Plug-Ins/VST"));
            roots.push(base.home_dir().join("Library/Audio/Plug-Ins/VST3"));
        }
    }

    dedup_preserving_order(roots)
}

pub(crate) fn dedup_preserving_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// Files before directories, then by name.
fn walk_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn is_plugin_entry(entry: &DirEntry) -> bool {
    !entry.file_type().is_dir()
        && is_plugin_file_name(&entry.file_name().to_string_lossy())
        && entry.path().is_file()
}

/// Recursively yields every plugin file under `root` in walk order.
///
/// Unreadable directories are skipped. A missing root yields nothing.
pub fn discover(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .sort_by(walk_order)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(is_plugin_entry)
        .map(DirEntry::into_path)
}

/// Source roots that currently exist; missing ones are skipped silently.
pub fn existing_roots(roots: &[PathBuf]) -> impl Iterator<Item = &Path> {
    roots.iter().map(PathBuf::as_path).filter(|p| p.exists())
}

/// Number of plugin files across all existing roots.
pub fn count_plugins(roots: &[PathBuf]) -> usize {
    existing_roots(roots).map(|root| discover(root).count()).sum()
}

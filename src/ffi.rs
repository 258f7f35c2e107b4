//! FFI (Foreign Function Interface) bindings for native front ends.
//!
//! This module exposes backup runs, the backup index, restore and export
//! through C-compatible functions callable from Swift (macOS) and C# (Windows).
//!
//! # Memory Management
//!
//! - Rust allocates memory and returns pointers to Swift/C#
//! - The calling code MUST call the corresponding `_free` functions to prevent leaks
//! - Strings are null-terminated UTF-8
//!
//! # Running a backup
//!
//! ```csharp
//! IntPtr run = plugvault_backup_start(roots, roots.Length, backupDir);
//! // on a UI timer:
//! IntPtr ev;
//! while ((ev = plugvault_backup_next_event(run)) != IntPtr.Zero) {
//!     // kind 0 = progress, 1 = log, 2 = completed
//!     plugvault_free_event(ev);
//! }
//! // when done (or to abort):
//! plugvault_backup_free(run);
//! ```

use crate::engine::{BackupEvent, BackupHandle};
use crate::index::Index;
use crate::operations::{export_index, load_backup_index, restore_plugin};
use crate::plugin::{PluginKey, PluginRecord};
use crate::registry::default_source_roots;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::ptr;
use std::slice;
use tracing::error;

// ============================================================================
// C-Compatible Types
// ============================================================================

/// Opaque handle to a running (or finished) backup
pub struct CBackupRun {
    handle: Option<BackupHandle>,
}

/// Event kinds reported in `CBackupEvent::kind`
pub const EVENT_PROGRESS: c_int = 0;
pub const EVENT_LOG: c_int = 1;
pub const EVENT_COMPLETED: c_int = 2;

/// C-compatible backup event
#[repr(C)]
pub struct CBackupEvent {
    pub kind: c_int,
    /// Percentage for progress events, 100 for completion
    pub progress: c_int,
    /// Log line for log events, null otherwise
    pub message: *mut c_char,
    /// Summary counters, only set on completion
    pub total: c_int,
    pub copied: c_int,
    pub skipped: c_int,
    pub failed: c_int,
    pub cancelled: c_int,
    pub index_saved: c_int,
}

/// Opaque snapshot of a backup index
pub struct CPluginIndex {
    index: Index,
}

/// C-compatible plugin record
#[repr(C)]
pub struct CPluginRecord {
    pub key: *mut c_char,
    pub name: *mut c_char,
    pub plugin_type: *mut c_char,
    pub arch: *mut c_char,
    pub vendor: *mut c_char,
    pub original_path: *mut c_char,
    pub backup_path: *mut c_char,
    pub backup_date: *mut c_char,
}

/// C-compatible path list
pub struct CPathList {
    paths: Vec<PathBuf>,
}

// ============================================================================
// Backup Runs
// ============================================================================

/// Start a backup of `source_count` source directories into `backup_root`.
/// Returns an opaque run handle, or null on invalid arguments.
/// Caller MUST call plugvault_backup_free() when done.
#[no_mangle]
pub extern "C" fn plugvault_backup_start(
    source_roots: *const *const c_char,
    source_count: c_int,
    backup_root: *const c_char,
) -> *mut CBackupRun {
    let backup_root = match c_char_to_path(backup_root) {
        Some(p) => p,
        None => return ptr::null_mut(),
    };

    let mut roots = Vec::new();
    if !source_roots.is_null() && source_count > 0 {
        let raw = unsafe { slice::from_raw_parts(source_roots, source_count as usize) };
        for &root in raw {
            match c_char_to_path(root) {
                Some(p) => roots.push(p),
                None => return ptr::null_mut(),
            }
        }
    }

    match BackupHandle::spawn(roots, backup_root) {
        Ok(handle) => Box::into_raw(Box::new(CBackupRun {
            handle: Some(handle),
        })),
        Err(e) => {
            error!(error = %e, "Failed to start backup");
            ptr::null_mut()
        }
    }
}

/// Take the next pending event without blocking.
/// Returns null if no event is pending.
/// Caller MUST call plugvault_free_event() on every non-null result.
#[no_mangle]
pub extern "C" fn plugvault_backup_next_event(run: *mut CBackupRun) -> *mut CBackupEvent {
    if run.is_null() {
        return ptr::null_mut();
    }

    let run = unsafe { &*run };
    let handle = match run.handle.as_ref() {
        Some(h) => h,
        None => return ptr::null_mut(),
    };

    match handle.events().try_recv() {
        Ok(event) => Box::into_raw(Box::new(event_to_c(event))),
        Err(_) => ptr::null_mut(),
    }
}

/// Request cancellation of a running backup. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn plugvault_backup_cancel(run: *mut CBackupRun) {
    if run.is_null() {
        return;
    }
    let run = unsafe { &*run };
    if let Some(handle) = run.handle.as_ref() {
        handle.cancel();
    }
}

/// Returns 1 once the background run has finished, 0 otherwise.
/// Pending events may still be queued after this returns 1.
#[no_mangle]
pub extern "C" fn plugvault_backup_is_finished(run: *const CBackupRun) -> c_int {
    if run.is_null() {
        return 1;
    }
    let run = unsafe { &*run };
    match run.handle.as_ref() {
        Some(handle) => handle.is_finished() as c_int,
        None => 1,
    }
}

/// Free a run handle. A run still in progress is cancelled and waited for.
#[no_mangle]
pub extern "C" fn plugvault_backup_free(run: *mut CBackupRun) {
    if run.is_null() {
        return;
    }
    let mut run = unsafe { Box::from_raw(run) };
    if let Some(handle) = run.handle.take() {
        if !handle.is_finished() {
            handle.cancel();
        }
        if let Err(e) = handle.join() {
            error!(error = %e, "Backup worker did not finish cleanly");
        }
    }
}

/// Free an event returned by plugvault_backup_next_event().
#[no_mangle]
pub extern "C" fn plugvault_free_event(event: *mut CBackupEvent) {
    if !event.is_null() {
        unsafe {
            let e = Box::from_raw(event);
            free_c_char(e.message);
        }
    }
}

// ============================================================================
// Backup Index
// ============================================================================

/// Load the index of a backup directory. A missing or corrupt index yields
/// an empty snapshot. Returns null only on invalid arguments.
/// Caller MUST call plugvault_free_index() when done.
#[no_mangle]
pub extern "C" fn plugvault_index_load(backup_root: *const c_char) -> *mut CPluginIndex {
    let backup_root = match c_char_to_path(backup_root) {
        Some(p) => p,
        None => return ptr::null_mut(),
    };

    let index = load_backup_index(&backup_root);
    Box::into_raw(Box::new(CPluginIndex { index }))
}

/// Get the number of records in an index snapshot.
#[no_mangle]
pub extern "C" fn plugvault_index_count(index: *const CPluginIndex) -> c_int {
    if index.is_null() {
        return 0;
    }
    let snapshot = unsafe { &*index };
    snapshot.index.len() as c_int
}

/// Get the record at `position`, in index order.
/// Caller MUST call plugvault_free_record() when done.
#[no_mangle]
pub extern "C" fn plugvault_index_get(index: *const CPluginIndex, position: c_int) -> *mut CPluginRecord {
    let (key, record) = match entry_at(index, position) {
        Some(entry) => entry,
        None => return ptr::null_mut(),
    };

    Box::into_raw(Box::new(CPluginRecord {
        key: string_to_c_char(key.as_str()),
        name: string_to_c_char(&record.name),
        plugin_type: string_to_c_char(record.plugin_type.as_str()),
        arch: string_to_c_char(record.arch.as_str()),
        vendor: string_to_c_char(&record.vendor),
        original_path: string_to_c_char(&record.original_path.to_string_lossy()),
        backup_path: string_to_c_char(&record.backup_path.to_string_lossy()),
        backup_date: string_to_c_char(&record.backup_date),
    }))
}

/// Free a record returned by plugvault_index_get().
#[no_mangle]
pub extern "C" fn plugvault_free_record(record: *mut CPluginRecord) {
    if !record.is_null() {
        unsafe {
            let r = Box::from_raw(record);
            free_c_char(r.key);
            free_c_char(r.name);
            free_c_char(r.plugin_type);
            free_c_char(r.arch);
            free_c_char(r.vendor);
            free_c_char(r.original_path);
            free_c_char(r.backup_path);
            free_c_char(r.backup_date);
        }
    }
}

/// Free an index returned by plugvault_index_load().
#[no_mangle]
pub extern "C" fn plugvault_free_index(index: *mut CPluginIndex) {
    if !index.is_null() {
        unsafe {
            let _ = Box::from_raw(index);
        }
    }
}

// ============================================================================
// Restore / Export
// ============================================================================

/// Restore the record at `position` into `dest_dir`.
/// Returns the restored file path on success, or null on error.
/// Caller MUST call plugvault_free_string() when done.
#[no_mangle]
pub extern "C" fn plugvault_restore_plugin(
    index: *const CPluginIndex,
    position: c_int,
    dest_dir: *const c_char,
) -> *mut c_char {
    let (_, record) = match entry_at(index, position) {
        Some(entry) => entry,
        None => return ptr::null_mut(),
    };
    let dest_dir = match c_char_to_path(dest_dir) {
        Some(p) => p,
        None => return ptr::null_mut(),
    };

    match restore_plugin(record, &dest_dir) {
        Ok(path) => string_to_c_char(&path.to_string_lossy()),
        Err(e) => {
            error!(plugin = %record.name, error = %e, "Error restoring plugin");
            ptr::null_mut()
        }
    }
}

/// Export an index snapshot to `path`.
/// Returns 0 on success, 1 on error.
#[no_mangle]
pub extern "C" fn plugvault_export_index(index: *const CPluginIndex, path: *const c_char) -> c_int {
    if index.is_null() {
        return 1;
    }
    let path = match c_char_to_path(path) {
        Some(p) => p,
        None => return 1,
    };

    let snapshot = unsafe { &*index };
    match export_index(&snapshot.index, &path) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Error exporting index");
            1
        }
    }
}

// ============================================================================
// Source Roots
// ============================================================================

/// The platform's default plugin directories.
/// Caller MUST call plugvault_free_path_list() when done.
#[no_mangle]
pub extern "C" fn plugvault_default_source_roots() -> *mut CPathList {
    Box::into_raw(Box::new(CPathList {
        paths: default_source_roots(),
    }))
}

/// Get the number of paths in a path list.
#[no_mangle]
pub extern "C" fn plugvault_path_list_count(list: *const CPathList) -> c_int {
    if list.is_null() {
        return 0;
    }
    let list = unsafe { &*list };
    list.paths.len() as c_int
}

/// Get a path at a specific index.
/// Caller MUST call plugvault_free_string() when done.
#[no_mangle]
pub extern "C" fn plugvault_path_list_get(list: *const CPathList, index: c_int) -> *mut c_char {
    if list.is_null() || index < 0 {
        return ptr::null_mut();
    }
    let list = unsafe { &*list };
    match list.paths.get(index as usize) {
        Some(p) => string_to_c_char(&p.to_string_lossy()),
        None => ptr::null_mut(),
    }
}

/// Free a path list returned by plugvault_default_source_roots().
#[no_mangle]
pub extern "C" fn plugvault_free_path_list(list: *mut CPathList) {
    if !list.is_null() {
        unsafe {
            let _ = Box::from_raw(list);
        }
    }
}

// ============================================================================
// String Management
// ============================================================================

/// Free a string returned by FFI functions.
#[no_mangle]
pub extern "C" fn plugvault_free_string(s: *mut c_char) {
    free_c_char(s);
}

// ============================================================================
// Helper Functions
// ============================================================================

fn entry_at<'a>(index: *const CPluginIndex, position: c_int) -> Option<(&'a PluginKey, &'a PluginRecord)> {
    if index.is_null() || position < 0 {
        return None;
    }
    let snapshot: &'a CPluginIndex = unsafe { &*index };
    snapshot.index.get_index(position as usize)
}

fn event_to_c(event: BackupEvent) -> CBackupEvent {
    let mut c_event = CBackupEvent {
        kind: EVENT_PROGRESS,
        progress: 0,
        message: ptr::null_mut(),
        total: 0,
        copied: 0,
        skipped: 0,
        failed: 0,
        cancelled: 0,
        index_saved: 0,
    };

    match event {
        BackupEvent::Progress(p) => c_event.progress = p as c_int,
        BackupEvent::Log(line) => {
            c_event.kind = EVENT_LOG;
            c_event.message = string_to_c_char(&line);
        }
        BackupEvent::Completed(summary) => {
            c_event.kind = EVENT_COMPLETED;
            c_event.progress = 100;
            c_event.total = summary.total as c_int;
            c_event.copied = summary.copied as c_int;
            c_event.skipped = summary.skipped as c_int;
            c_event.failed = summary.failed as c_int;
            c_event.cancelled = summary.cancelled as c_int;
            c_event.index_saved = summary.index_saved as c_int;
        }
    }
    c_event
}

fn c_char_to_path(s: *const c_char) -> Option<PathBuf> {
    if s.is_null() {
        return None;
    }
    let s = unsafe { CStr::from_ptr(s) }.to_str().ok()?;
    if s.is_empty() {
        return None;
    }
    Some(Path::new(s).to_path_buf())
}

fn string_to_c_char(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn free_c_char(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            let _ = CString::from_raw(s);
        }
    }
}

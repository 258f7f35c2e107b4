//! Plugin management operations that run outside a backup: restore and export.
//!
//! These only read an index; nothing here mutates `backup_index.json`.

use crate::error::{Result, VaultError};
use crate::index::{Index, IndexStore};
use crate::plugin::PluginRecord;
use filetime::FileTime;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Load the index of a backup root for display, treating corruption as empty.
pub fn load_backup_index(backup_root: &Path) -> Index {
    IndexStore::new(backup_root).load()
}

/// Copy a backed-up plugin into `dest_dir`, keeping its file name.
///
/// An existing file with the same name is overwritten, unless it is the
/// backup itself. The copy is checked against the backup by MD5 digest
/// before returning.
pub fn restore_plugin(record: &PluginRecord, dest_dir: &Path) -> Result<PathBuf> {
    if !dest_dir.is_dir() {
        return Err(VaultError::invalid_path(dest_dir, "restore destination is not a directory"));
    }

    let dest = dest_dir.join(&record.name);
    if is_same_file(&record.backup_path, &dest) {
        return Err(VaultError::invalid_path(dest, "restore destination is the backup file itself"));
    }

    if let Err(e) = copy_with_metadata(&record.backup_path, &dest) {
        error!(plugin = %record.name, error = %e, "Restore failed");
        return Err(e.into());
    }

    if file_digest(&record.backup_path)? != file_digest(&dest)? {
        error!(plugin = %record.name, path = %dest.display(), "Restored copy does not match backup");
        return Err(VaultError::VerificationFailed { path: dest });
    }

    info!(plugin = %record.name, path = %dest.display(), "Restored plugin");
    Ok(dest)
}

/// Write `index` to a caller-chosen file in the persisted index format.
pub fn export_index(index: &Index, path: &Path) -> Result<()> {
    index.write_to(path)?;
    info!(path = %path.display(), records = index.len(), "Exported index");
    Ok(())
}

/// Copy file content and permissions, then carry over access and modification
/// times. A partially written destination is removed on failure.
pub(crate) fn copy_with_metadata(source: &Path, dest: &Path) -> io::Result<u64> {
    let result = fs::copy(source, dest).and_then(|bytes| {
        let meta = fs::metadata(source)?;
        filetime::set_file_times(
            dest,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        )?;
        Ok(bytes)
    });

    if result.is_err() && dest.exists() {
        let _ = fs::remove_file(dest);
    }
    if let Ok(bytes) = &result {
        debug!(source = %source.display(), dest = %dest.display(), bytes, "Copied file");
    }
    result
}

/// Both paths exist and resolve to the same file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn file_digest(path: &Path) -> Result<md5::Digest> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    io::copy(&mut file, &mut context)?;
    Ok(context.compute())
}

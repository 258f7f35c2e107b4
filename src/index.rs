//! Backup index and its on-disk store.
//!
//! Each backup root holds a single `backup_index.json`: a JSON object mapping
//! plugin keys to [`PluginRecord`]s, indented with four spaces so it can be
//! read by hand and passed around as an export.
//!
//! Writes are atomic (write to a sibling `.tmp`, then rename) so a crash
//! during save leaves either the old index or the new one, never a torn file.

use crate::error::{Result, VaultError};
use crate::plugin::{PluginKey, PluginRecord};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the index inside a backup root
pub const INDEX_FILE_NAME: &str = "backup_index.json";

/// Mapping from [`PluginKey`] to [`PluginRecord`], iterated in insertion order.
///
/// Replacing an existing key keeps its position. Equality ignores order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: IndexMap<PluginKey, PluginRecord>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &PluginKey) -> Option<&PluginRecord> {
        self.entries.get(key)
    }

    /// Insert or replace the record for `key`, returning the previous one.
    pub fn insert(&mut self, key: PluginKey, record: PluginRecord) -> Option<PluginRecord> {
        self.entries.insert(key, record)
    }

    /// Entry at `position` in insertion order.
    pub fn get_index(&self, position: usize) -> Option<(&PluginKey, &PluginRecord)> {
        self.entries.get_index(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PluginKey, &PluginRecord)> {
        self.entries.iter()
    }

    /// Entries whose plugin name contains `term`, ignoring case.
    /// An empty term matches everything.
    pub fn search(&self, term: &str) -> Vec<(&PluginKey, &PluginRecord)> {
        let term = term.to_lowercase();
        self.entries
            .iter()
            .filter(|(_, record)| record.name.to_lowercase().contains(&term))
            .collect()
    }

    /// Read an index document from an arbitrary path, such as an export.
    pub fn load_from(path: &Path) -> Result<Index> {
        if !path.exists() {
            return Err(VaultError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("index file not found: {}", path.display()),
            )));
        }
        read_index_file(path)
    }

    /// Write this index to an arbitrary path in the persisted format.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = to_pretty_json(self)?;
        write_atomic(path, &bytes)
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = (&'a PluginKey, &'a PluginRecord);
    type IntoIter = indexmap::map::Iter<'a, PluginKey, PluginRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Owner of the `backup_index.json` inside one backup root.
#[derive(Debug, Clone)]
pub struct IndexStore {
    backup_root: PathBuf,
}

impl IndexStore {
    pub fn new(backup_root: impl AsRef<Path>) -> Self {
        IndexStore {
            backup_root: backup_root.as_ref().to_path_buf(),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.backup_root.join(INDEX_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.index_path().exists()
    }

    /// Load the index, falling back to an empty one if it is missing or unreadable.
    ///
    /// A corrupt index only loses metadata; the backed-up files stay on disk,
    /// so this never fails.
    pub fn load(&self) -> Index {
        match self.try_load() {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %self.index_path().display(), error = %e, "Ignoring unreadable index");
                Index::new()
            }
        }
    }

    /// Load the index. A missing file is an empty index; an unreadable one is an error.
    pub fn try_load(&self) -> Result<Index> {
        let path = self.index_path();
        if !path.exists() {
            debug!(path = %path.display(), "No index yet, starting empty");
            return Ok(Index::new());
        }
        read_index_file(&path)
    }

    /// Persist the full index atomically. Creates the backup root if needed.
    pub fn save(&self, index: &Index) -> Result<()> {
        let path = self.index_path();
        info!(path = %path.display(), records = index.len(), "Saving index");
        index.write_to(&path)
    }
}

fn read_index_file(path: &Path) -> Result<Index> {
    let corrupted = |reason: String| VaultError::IndexCorrupted {
        path: path.to_path_buf(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| corrupted(e.to_string()))?;
    let index: Index = serde_json::from_str(&content).map_err(|e| corrupted(e.to_string()))?;

    debug!(path = %path.display(), records = index.len(), "Loaded index");
    Ok(index)
}

fn to_pretty_json(index: &Index) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    index.serialize(&mut serializer)?;
    Ok(buf)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

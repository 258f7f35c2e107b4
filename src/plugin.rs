//! Plugin data types and the path-based classification rules.
//!
//! A discovered file is described entirely by its path: the extension picks
//! the [`PluginType`], a `Program Files (x86)` segment anywhere in the path
//! picks [`Arch::Bit32`], and the immediate parent directory is the vendor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File name suffixes that identify plugin binaries. Matched case-sensitively.
pub const PLUGIN_EXTENSIONS: [&str; 2] = [".dll", ".vst3"];

/// Path segment marking the 32-bit program files convention on Windows.
pub const ARCH_32_MARKER: &str = "Program Files (x86)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginType {
    VST2,
    VST3,
}

impl PluginType {
    /// `.vst3` files are VST3; every other matching file is VST2.
    pub fn from_file_name(name: &str) -> Self {
        if name.ends_with(".vst3") {
            PluginType::VST3
        } else {
            PluginType::VST2
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::VST2 => "VST2",
            PluginType::VST3 => "VST3",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "32_bit")]
    Bit32,
    #[serde(rename = "64_bit")]
    Bit64,
}

impl Arch {
    /// Substring heuristic on the full source path. Binaries are never inspected.
    pub fn from_path(path: &Path) -> Self {
        if path.to_string_lossy().contains(ARCH_32_MARKER) {
            Arch::Bit32
        } else {
            Arch::Bit64
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Bit32 => "32_bit",
            Arch::Bit64 => "64_bit",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identifier `{name}_{type}_{arch}_{vendor}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginKey(String);

impl PluginKey {
    pub fn new(name: &str, plugin_type: PluginType, arch: Arch, vendor: &str) -> Self {
        PluginKey(format!("{}_{}_{}_{}", name, plugin_type, arch, vendor))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PluginKey {
    fn from(key: &str) -> Self {
        PluginKey(key.to_string())
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One backed-up plugin as stored in `backup_index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub arch: Arch,
    pub vendor: String,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    /// Kept as a string so indexes written without an offset still load.
    pub backup_date: String,
}

/// Everything the engine derives from a source path before touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub name: String,
    pub plugin_type: PluginType,
    pub arch: Arch,
    pub vendor: String,
}

impl Classification {
    /// Classify a source file. Returns `None` when the path has no file name.
    pub fn of(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let vendor = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Some(Classification {
            plugin_type: PluginType::from_file_name(&name),
            arch: Arch::from_path(path),
            name,
            vendor,
        })
    }

    pub fn key(&self) -> PluginKey {
        PluginKey::new(&self.name, self.plugin_type, self.arch, &self.vendor)
    }

    /// `backup_root/type/arch/vendor`
    pub fn target_dir(&self, backup_root: &Path) -> PathBuf {
        backup_root
            .join(self.plugin_type.as_str())
            .join(self.arch.as_str())
            .join(&self.vendor)
    }

    pub fn destination(&self, backup_root: &Path) -> PathBuf {
        self.target_dir(backup_root).join(&self.name)
    }

    pub fn into_record(self, original_path: PathBuf, backup_path: PathBuf) -> PluginRecord {
        PluginRecord {
            name: self.name,
            plugin_type: self.plugin_type,
            arch: self.arch,
            vendor: self.vendor,
            original_path,
            backup_path,
            backup_date: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// True if the file name ends in one of the plugin suffixes.
pub fn is_plugin_file_name(name: &str) -> bool {
    PLUGIN_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

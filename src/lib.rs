//! PlugVault Core Library
//!
//! Backup and restore core for VST2 and VST3 plugin collections.
//!
//! # Architecture
//!
//! This library is designed to be consumed via FFI by native UI frontends,
//! and directly by the bundled `plugvault` command-line tool:
//! - **macOS**: SwiftUI app using static lib via Swift ↔ Rust FFI
//! - **Windows**: WPF app using DLL via C# ↔ Rust P/Invoke
//!
//! # Core Features
//!
//! ## Plugin Discovery (`registry` module)
//! - `default_source_roots()` - Standard plugin directories for the platform
//! - `discover()` - Deterministic recursive walk yielding `.dll` / `.vst3` files
//!
//! ## Backup Runs (`engine` module)
//! - `BackupEngine` - Counts, copies into `<type>/<arch>/<vendor>/`, saves the index
//! - `BackupHandle` - Same run on a background thread with progress, log and
//!   completion events plus cooperative cancellation
//!
//! ## Backup Index (`index` module)
//! - `Index` - Key-ordered record map persisted as `backup_index.json`
//! - `IndexStore` - Atomic load/save of the index inside a backup root
//!
//! ## Restore / Export (`operations` module)
//! - `restore_plugin()` - Copy a backed-up file back out, verified by digest
//! - `export_index()` - Write the index to an arbitrary file
//!
//! ## Data Structures (`plugin` module)
//! - `PluginType`, `Arch` - Classification derived from file name and path
//! - `PluginKey` - `{name}_{type}_{arch}_{vendor}` identity
//! - `PluginRecord` - One index entry

pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod index;
pub mod operations;
pub mod plugin;
pub mod registry;

pub use config::Config;
pub use engine::{BackupEngine, BackupEvent, BackupHandle, BackupSummary};
pub use error::{Result, VaultError};
pub use index::{Index, IndexStore};
pub use plugin::{Arch, Classification, PluginKey, PluginRecord, PluginType};

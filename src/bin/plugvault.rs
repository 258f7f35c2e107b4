//! # PlugVault CLI
//!
//! Command-line front end for the backup core.
//!
//! ## Commands
//!
//! - `plugvault backup` - Back up every plugin under the configured source roots
//! - `plugvault list` - Show the backup index, optionally filtered by name
//! - `plugvault restore <KEY> <DEST>` - Copy one backed-up plugin into a folder
//! - `plugvault export <FILE>` - Write the backup index to a file
//! - `plugvault paths` - Show or edit the configured source roots
//!
//! ## Example Usage
//!
//! ```bash
//! plugvault backup --backup-dir D:\PluginBackups
//! plugvault list --search synth
//! plugvault restore "Synth.dll_VST2_32_bit_VSTPlugins" C:\Restored
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use plugvault_core::operations::{export_index, load_backup_index, restore_plugin};
use plugvault_core::registry::default_source_roots;
use plugvault_core::{BackupEvent, BackupHandle, BackupSummary, Config, PluginKey};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PlugVault - back up and restore VST plugin collections
#[derive(Parser)]
#[command(name = "plugvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up all plugins found under the source roots
    Backup {
        /// Source directory to scan (repeatable; replaces the configured roots)
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,

        /// Backup destination (defaults to the configured backup_root)
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,
    },

    /// List backed-up plugins
    List {
        /// Case-insensitive plugin name filter
        #[arg(short, long)]
        search: Option<String>,

        /// Backup directory (defaults to the configured backup_root)
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,
    },

    /// Restore one plugin into a destination folder
    Restore {
        /// Index key, as shown by `list`
        key: String,

        /// Destination folder
        dest: PathBuf,

        /// Backup directory (defaults to the configured backup_root)
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,
    },

    /// Export the backup index to a JSON file
    Export {
        /// Output file
        file: PathBuf,

        /// Backup directory (defaults to the configured backup_root)
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,
    },

    /// Show or edit the source roots
    Paths {
        #[command(subcommand)]
        action: Option<PathsAction>,
    },
}

#[derive(Subcommand)]
enum PathsAction {
    /// Print the configured source roots
    List,
    /// Append a source root
    Add { dir: PathBuf },
    /// Remove the most recently added source root
    RemoveLast,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Setup logging
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    match cli.command {
        Commands::Backup { sources, backup_dir } => {
            let roots = if sources.is_empty() {
                config.source_roots()
            } else {
                sources
            };
            let backup_dir = resolve_backup_dir(&config, backup_dir)?;
            run_backup(roots, backup_dir, cli.quiet)
        }
        Commands::List { search, backup_dir } => {
            let backup_dir = resolve_backup_dir(&config, backup_dir)?;
            list(&backup_dir, search.as_deref())
        }
        Commands::Restore {
            key,
            dest,
            backup_dir,
        } => {
            let backup_dir = resolve_backup_dir(&config, backup_dir)?;
            restore(&backup_dir, &key, &dest)
        }
        Commands::Export { file, backup_dir } => {
            let backup_dir = resolve_backup_dir(&config, backup_dir)?;
            let index = load_backup_index(&backup_dir);
            export_index(&index, &file)
                .with_context(|| format!("Failed to export index to {}", file.display()))?;
            println!("Exported {} plugins to {}", index.len(), file.display());
            Ok(())
        }
        Commands::Paths { action } => paths(config, cli.config.as_deref(), action),
    }
}

fn resolve_backup_dir(config: &Config, explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit.or_else(|| config.backup.backup_root.clone()) {
        Some(dir) => Ok(dir),
        None => bail!("No backup folder selected; pass --backup-dir or set backup.backup_root"),
    }
}

fn run_backup(roots: Vec<PathBuf>, backup_dir: PathBuf, quiet: bool) -> anyhow::Result<()> {
    info!(backup_dir = %backup_dir.display(), roots = roots.len(), "Starting backup");

    let handle = BackupHandle::spawn(roots, backup_dir).context("Failed to start backup")?;
    let mut last_progress = None;
    let mut completed: Option<BackupSummary> = None;

    for event in handle.events().iter() {
        match event {
            BackupEvent::Progress(p) => {
                if !quiet && last_progress != Some(p) {
                    println!("[{:>3}%]", p);
                }
                last_progress = Some(p);
            }
            BackupEvent::Log(line) => {
                if !quiet {
                    println!("{}", line);
                }
            }
            BackupEvent::Completed(summary) => {
                completed = Some(summary);
                break;
            }
        }
    }

    let summary = match completed {
        Some(summary) => summary,
        None => handle.join()?,
    };

    println!(
        "Backup finished: {} copied, {} already present, {} failed (of {})",
        summary.copied, summary.skipped, summary.failed, summary.total
    );
    if !summary.index_saved && summary.total > 0 {
        bail!("Backup index could not be saved");
    }
    Ok(())
}

fn list(backup_dir: &Path, search: Option<&str>) -> anyhow::Result<()> {
    let index = load_backup_index(backup_dir);
    let entries = match search {
        Some(term) => index.search(term),
        None => index.iter().collect(),
    };

    if entries.is_empty() {
        println!("No plugins in backup.");
        return Ok(());
    }

    for (key, record) in &entries {
        println!(
            "{}\n    {} | {} | {} | {}\n    backed up {}",
            key,
            record.name,
            record.plugin_type,
            record.arch,
            record.vendor,
            record.backup_date
        );
    }
    println!("{} of {} plugins", entries.len(), index.len());
    Ok(())
}

fn restore(backup_dir: &Path, key: &str, dest: &Path) -> anyhow::Result<()> {
    let index = load_backup_index(backup_dir);
    let record = index
        .get(&PluginKey::from(key))
        .with_context(|| format!("No plugin with key '{}' in {}", key, backup_dir.display()))?;

    let restored = restore_plugin(record, dest)
        .with_context(|| format!("Failed to restore {}", record.name))?;
    println!("Restored {}", restored.display());
    Ok(())
}

fn paths(mut config: Config, config_path: Option<&Path>, action: Option<PathsAction>) -> anyhow::Result<()> {
    let save = |config: &Config| match config_path {
        Some(path) => config.save_to(path),
        None => config.save(),
    };

    match action.unwrap_or(PathsAction::List) {
        PathsAction::List => {
            let defaults = default_source_roots();
            for root in config.source_roots() {
                let marker = if defaults.contains(&root) { " (default)" } else { "" };
                let state = if root.exists() { "" } else { " [missing]" };
                println!("{}{}{}", root.display(), marker, state);
            }
        }
        PathsAction::Add { dir } => {
            if config.add_source_root(dir.clone()) {
                save(&config)?;
                println!("Added {}", dir.display());
            } else {
                println!("Already configured: {}", dir.display());
            }
        }
        PathsAction::RemoveLast => match config.remove_last_source_root() {
            Some(removed) => {
                save(&config)?;
                println!("Removed {}", removed.display());
            }
            None => println!("Default paths cannot be removed."),
        },
    }
    Ok(())
}

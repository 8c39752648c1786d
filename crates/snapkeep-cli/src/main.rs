//! # Snapkeep CLI
//!
//! Command-line interface for the snapkeep content-aware incremental
//! backup engine.
//!
//! ## Example usage
//!
//! ```bash
//! # First run, no journal: mirrors /src into /backups/20260101
//! snapkeep /src /backups
//!
//! # Subsequent run, reusing unchanged files/directories via the USN journal
//! snapkeep /src /backups --use-journal --name 20260102
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snapkeep_backend_ntfs::NtfsAdapter;
use snapkeep_core::{SessionConfig, SnapshotSession};

/// snapkeep - content-aware incremental backup engine
#[derive(Parser)]
#[command(name = "snapkeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory tree to back up
    source: PathBuf,

    /// Target store: holds snapshots plus the `previous`/`journal`/`manifest` state files
    target: PathBuf,

    /// Name for this snapshot (default: today's date, YYYYMMDD)
    #[arg(long)]
    name: Option<String>,

    /// Consult the volume's USN change journal to reuse unchanged files and
    /// directories from the previous snapshot instead of re-copying them
    #[arg(long)]
    use_journal: bool,

    /// Disable directory-level reuse even when the journal says a directory
    /// is unaffected; forces a full recursive descend-and-copy/dedup instead
    /// of a directory symlink. Has no effect without `--use-journal`.
    #[arg(long)]
    no_dir_reuse: bool,

    /// Path (file or directory) to exclude from the backup; may be repeated
    #[arg(long = "exclude")]
    exclusions: Vec<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    let name = cli
        .name
        .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d").to_string());

    let mut config = SessionConfig::new(derive_volume(&cli.source), name);
    config.use_journal = cli.use_journal;
    config.enable_dir_reuse = !cli.no_dir_reuse;
    config.exclusions = cli.exclusions.into_iter().collect();

    let adapter = NtfsAdapter::new();
    let mut session = SnapshotSession::new(cli.source, cli.target, config, &adapter);

    let snapshot_dir = session.run().context("snapshot run failed")?;

    println!("Backed up to {}", snapshot_dir.display());
    Ok(())
}

/// Derive the volume identifier the adapter's `open`/`query_journal` use
/// from the source path: the drive letter on Windows (`C:\Users\...` ->
/// `"C:"`), or the path itself elsewhere, where the adapter ignores it.
fn derive_volume(source: &std::path::Path) -> String {
    let s = source.to_string_lossy();
    if s.len() >= 2 && s.as_bytes()[1] == b':' {
        s[..2].to_string()
    } else {
        s.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_drive_letter_on_windows_style_paths() {
        assert_eq!(derive_volume(std::path::Path::new("C:\\Users\\bob")), "C:");
    }

    #[test]
    fn falls_back_to_whole_path_without_a_drive_letter() {
        assert_eq!(derive_volume(std::path::Path::new("/home/bob")), "/home/bob");
    }
}

//! Error types for the snapshot engine.
//!
//! This module defines a single well-structured error type using `thiserror`,
//! with one variant per failure category the engine's error handling design
//! distinguishes. Higher-level code (the CLI) wraps these in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `SnapkeepError`.
pub type Result<T> = std::result::Result<T, SnapkeepError>;

/// Categorised failures produced while building or replaying a snapshot.
///
/// Each variant corresponds to a row of the error-handling table: callers
/// decide disposition (abort, warn-and-continue, or recover) based on the
/// variant, not on string matching.
#[derive(Error, Debug)]
pub enum SnapkeepError {
    /// `target/name` already exists.
    #[error("snapshot '{name}' already exists under {target}")]
    NameCollision { target: PathBuf, name: String },

    /// `query_journal` found no active journal on first attempt.
    #[error("USN journal is not active on {volume}")]
    JournalNotActive { volume: String },

    /// `journal_id` mismatch or `first_usn > last_usn`.
    #[error("USN journal rotated or has a gap on {volume}")]
    JournalRotated { volume: String },

    /// Enumerating a source directory's children failed.
    #[error("failed to enumerate {path}: {reason}")]
    EnumerationFailure { path: PathBuf, reason: String },

    /// Hard-link or directory-symlink creation failed.
    #[error("failed to link {src} -> {dst}: {reason}")]
    LinkFailure {
        src: PathBuf,
        dst: PathBuf,
        reason: String,
    },

    /// The destination of a link already exists.
    #[error("link target already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// A manifest candidate could not be stat'd.
    #[error("manifest candidate could not be stat'd: {path}: {reason}")]
    ManifestMiss { path: PathBuf, reason: String },

    /// A manifest candidate's on-disk size does not match the recorded hash.
    #[error("manifest candidate {path} has size {found}, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// A USN record's file name could not be decoded.
    #[error("could not decode USN record name: {reason}")]
    NameEncoding { reason: String },

    /// Reading the source or writing the destination during a copy failed.
    #[error("failed to copy {path}: {reason}")]
    CopyFailure { path: PathBuf, reason: String },

    /// One of `previous`/`journal`/`manifest` exists but could not be loaded.
    #[error("failed to load state from {path}: {reason}")]
    StateLoadFailure { path: PathBuf, reason: String },

    /// A volume-adapter failure that does not fit a more specific category.
    #[error("volume adapter error: {0}")]
    Adapter(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapkeepError {
    /// True for error kinds whose disposition is to abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SnapkeepError::NameCollision { .. }
                | SnapkeepError::CopyFailure { .. }
                | SnapkeepError::StateLoadFailure { .. }
        )
    }

    /// True when the session should retry after calling `create_journal`.
    pub fn requires_journal_creation(&self) -> bool {
        matches!(self, SnapkeepError::JournalNotActive { .. })
    }

    /// True when the session should fall back to a full MFT replay.
    pub fn requires_full_replay(&self) -> bool {
        matches!(self, SnapkeepError::JournalRotated { .. })
    }
}

impl From<bincode::Error> for SnapkeepError {
    fn from(err: bincode::Error) -> Self {
        SnapkeepError::StateLoadFailure {
            path: PathBuf::new(),
            reason: err.to_string(),
        }
    }
}

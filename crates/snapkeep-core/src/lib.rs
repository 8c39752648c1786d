//! # Snapkeep Core
//!
//! Content-aware incremental snapshot engine, driven by a volume's native
//! change journal where one is available. This crate is platform-agnostic:
//! everything that touches the OS goes through the [`adapter::VolumeAdapter`]
//! trait, implemented elsewhere (e.g. `snapkeep-backend-ntfs`).
//!
//! ## Architecture
//!
//! - **Adapter** (`adapter`): the seam between engine and OS
//! - **Types** (`types`): FRNs and projected change records
//! - **Journal** (`journal`): change-journal replay and `affected(path)` queries
//! - **FRN map** (`frnmap`): FRN → path reconstruction
//! - **Manifest** (`manifest`): content-hash dedup via hard links
//! - **Builder** (`builder`): walks the source tree, materialising each item
//! - **Session** (`session`): ties the above together into one run

pub mod adapter;
pub mod builder;
pub mod error;
pub mod frnmap;
pub mod journal;
pub mod manifest;
pub mod normalise;
pub mod session;
pub mod types;

pub use adapter::{VolumeAdapter, VolumeHandle};
pub use builder::{CopyConfig, SnapshotBuilder};
pub use error::{Result, SnapkeepError};
pub use frnmap::FrnMap;
pub use journal::{JournalReplayer, JournalState};
pub use manifest::ManifestIndex;
pub use session::{SessionConfig, SnapshotSession};
pub use types::{ChangeRecord, Frn, JournalQuery, ATTR_DIRECTORY};

//! # Snapkeep NTFS backend
//!
//! The Windows/NTFS implementation of [`snapkeep_core::VolumeAdapter`]. It uses:
//!
//! - **MFT (Master File Table)** enumeration for the full-replay path
//! - **USN Change Journal** for incremental replay
//!
//! ## Architecture
//!
//! All Windows API calls and unsafe code are concentrated in a few modules:
//!
//! - `mft.rs`: MFT enumeration (`FSCTL_ENUM_USN_DATA`)
//! - `usn.rs`: USN journal query/create/read (`FSCTL_*_USN_JOURNAL`)
//! - `winapi_utils.rs`: low-level handle and string helpers
//! - `backend.rs`: glue implementing `VolumeAdapter` over the above
//!
//! ## Permissions
//!
//! Reading the MFT and USN journal requires elevated privileges:
//! - The process should be run as Administrator, OR
//! - The user should have "Perform Volume Maintenance Tasks" privilege
//!
//! On platforms other than Windows, or without elevation, `hardlink` and
//! `dirsymlink` still work (they are plain filesystem operations); only the
//! journal-specific methods report unsupported, which disables
//! journal-based reuse and falls back to manifest-only incremental backups.

#[cfg(windows)]
mod mft;
#[cfg(windows)]
mod usn;
#[cfg(windows)]
mod winapi_utils;

#[cfg(windows)]
mod backend;
#[cfg(windows)]
pub use backend::NtfsAdapter;

#[cfg(not(windows))]
mod stub;
#[cfg(not(windows))]
pub use stub::NtfsAdapter;

/// Error types specific to the NTFS backend.
pub mod error;
pub use error::NtfsError;

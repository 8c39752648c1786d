//! NTFS implementation of [`snapkeep_core::VolumeAdapter`].
//!
//! Combines MFT enumeration (full replay) and USN journal access
//! (incremental replay) behind the trait the snapshot engine consumes.
//! Hard links and directory symlinks are plain NTFS filesystem operations
//! and don't require the elevated privileges MFT/journal access does.

use crate::error::NtfsError;
use crate::mft;
use crate::usn;
use crate::winapi_utils::{normalize_volume_path, open_volume, SafeHandle};
use snapkeep_core::{
    ChangeRecord, JournalQuery, Result, SnapkeepError, VolumeAdapter, VolumeHandle,
};
use std::path::Path;
use tracing::info;
use windows::Win32::Foundation::ERROR_ALREADY_EXISTS;

/// NTFS volume adapter for Windows.
///
/// Full functionality (MFT enumeration, USN journal) requires elevated
/// privileges: run as Administrator, or hold the "Perform Volume
/// Maintenance Tasks" privilege. Without elevation, `query_journal` and
/// `enumerate_mft` fail and the session falls back to a manifest-only
/// incremental backup.
#[derive(Debug, Default)]
pub struct NtfsAdapter;

impl NtfsAdapter {
    pub fn new() -> Self {
        NtfsAdapter
    }
}

impl VolumeAdapter for NtfsAdapter {
    fn open(&self, volume: &str) -> Result<VolumeHandle> {
        let device_path = normalize_volume_path(volume);
        let handle = open_volume(&device_path).map_err(SnapkeepError::from)?;
        info!(volume, device = %device_path, "opened volume");
        Ok(VolumeHandle::new(handle))
    }

    fn close(&self, _handle: VolumeHandle) -> Result<()> {
        // `SafeHandle`'s `Drop` impl closes the underlying HANDLE; dropping
        // the boxed handle here is sufficient.
        Ok(())
    }

    fn query_journal(&self, handle: &VolumeHandle) -> Result<JournalQuery> {
        let safe = downcast(handle)?;
        usn::query_journal(safe, "volume").map_err(Into::into)
    }

    fn create_journal(&self, handle: &VolumeHandle) -> Result<()> {
        let safe = downcast(handle)?;
        usn::create_journal(safe, "volume").map_err(Into::into)
    }

    fn enumerate_mft(&self, handle: &VolumeHandle, upper_usn: u64) -> Result<Vec<ChangeRecord>> {
        let safe = downcast(handle)?;
        mft::enumerate_mft(safe, upper_usn).map_err(Into::into)
    }

    fn read_journal(
        &self,
        handle: &VolumeHandle,
        journal_id: u64,
        from_usn: u64,
    ) -> Result<Vec<ChangeRecord>> {
        let safe = downcast(handle)?;
        usn::read_journal(safe, journal_id, from_usn).map_err(Into::into)
    }

    fn hardlink(&self, src: &Path, dst: &Path) -> Result<()> {
        std::fs::hard_link(src, dst).map_err(|e| map_link_error(e, src, dst))
    }

    fn dirsymlink(&self, src: &Path, dst: &Path) -> Result<()> {
        std::os::windows::fs::symlink_dir(src, dst).map_err(|e| map_link_error(e, src, dst))
    }
}

fn downcast(handle: &VolumeHandle) -> Result<&SafeHandle> {
    handle.downcast_ref::<SafeHandle>().ok_or_else(|| {
        SnapkeepError::Adapter("volume handle was not opened by NtfsAdapter".into())
    })
}

fn map_link_error(e: std::io::Error, src: &Path, dst: &Path) -> SnapkeepError {
    if e.kind() == std::io::ErrorKind::AlreadyExists
        || e.raw_os_error() == Some(ERROR_ALREADY_EXISTS.0 as i32)
    {
        SnapkeepError::AlreadyExists {
            path: dst.to_path_buf(),
        }
    } else {
        SnapkeepError::LinkFailure {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

//! Volume adapter for platforms without an NTFS USN change journal.
//!
//! Journal-specific operations report `JournalNotActive`/unsupported, which
//! disables the journal-reuse path in `SnapshotSession`; `hardlink` and
//! `dirsymlink` remain real filesystem operations so manifest-only
//! incremental backups keep working on any platform (§9, "Platform
//! specifics").

use snapkeep_core::{
    ChangeRecord, JournalQuery, Result, SnapkeepError, VolumeAdapter, VolumeHandle,
};
use std::path::Path;

#[derive(Debug, Default)]
pub struct NtfsAdapter;

impl NtfsAdapter {
    pub fn new() -> Self {
        NtfsAdapter
    }
}

impl VolumeAdapter for NtfsAdapter {
    fn open(&self, _volume: &str) -> Result<VolumeHandle> {
        Ok(VolumeHandle::new(()))
    }

    fn close(&self, _handle: VolumeHandle) -> Result<()> {
        Ok(())
    }

    fn query_journal(&self, _handle: &VolumeHandle) -> Result<JournalQuery> {
        Err(SnapkeepError::JournalNotActive {
            volume: "unsupported on this platform".into(),
        })
    }

    fn create_journal(&self, _handle: &VolumeHandle) -> Result<()> {
        Err(SnapkeepError::Adapter(
            "USN change journal is only available on Windows/NTFS".into(),
        ))
    }

    fn enumerate_mft(&self, _handle: &VolumeHandle, _upper_usn: u64) -> Result<Vec<ChangeRecord>> {
        Err(SnapkeepError::Adapter(
            "MFT enumeration is only available on Windows/NTFS".into(),
        ))
    }

    fn read_journal(
        &self,
        _handle: &VolumeHandle,
        _journal_id: u64,
        _from_usn: u64,
    ) -> Result<Vec<ChangeRecord>> {
        Err(SnapkeepError::Adapter(
            "USN change journal is only available on Windows/NTFS".into(),
        ))
    }

    fn hardlink(&self, src: &Path, dst: &Path) -> Result<()> {
        std::fs::hard_link(src, dst).map_err(|e| map_link_error(e, src, dst))
    }

    fn dirsymlink(&self, src: &Path, dst: &Path) -> Result<()> {
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(src, dst);
        #[cfg(not(unix))]
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "directory symlinks are not supported on this platform",
        ));
        result.map_err(|e| map_link_error(e, src, dst))
    }
}

fn map_link_error(e: std::io::Error, src: &Path, dst: &Path) -> SnapkeepError {
    if e.kind() == std::io::ErrorKind::AlreadyExists {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn journal_methods_report_unsupported() {
        let adapter = NtfsAdapter::new();
        let handle = adapter.open("/dev/sda1").unwrap();
        assert!(matches!(
            adapter.query_journal(&handle),
            Err(SnapkeepError::JournalNotActive { .. })
        ));
    }

    #[test]
    fn hardlink_still_works_without_a_journal() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"hi").unwrap();

        let adapter = NtfsAdapter::new();
        adapter.hardlink(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"hi");
    }
}

//! The volume adapter trait: the one seam between the engine and the OS.
//!
//! Everything the journal replayer and snapshot builder know about a volume's
//! change journal and link primitives goes through this trait. Platform
//! crates (such as `snapkeep-backend-ntfs`) implement it; the core crate
//! never calls a raw OS API directly.

use crate::error::Result;
use crate::types::{ChangeRecord, JournalQuery};
use std::any::Any;
use std::path::Path;

/// An open volume handle, opaque to the core.
///
/// Adapters stash whatever platform-specific state they need (a `HANDLE`, a
/// device path, ...) behind this box; the core only ever passes it back to
/// the same adapter that produced it.
pub struct VolumeHandle(Box<dyn Any + Send>);

impl VolumeHandle {
    pub fn new<T: Send + 'static>(inner: T) -> Self {
        VolumeHandle(Box::new(inner))
    }

    /// Downcast back to the adapter's own handle type.
    ///
    /// Adapters call this on handles they receive; a mismatch indicates a
    /// handle from a different adapter was passed in, which is a caller bug.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

/// The raw interface a volume exposes to the replayer and builder.
///
/// A volume without a native change journal (or running on a platform this
/// crate has no backend for) still implements this trait: `query_journal`,
/// `create_journal`, `enumerate_mft`, and `read_journal` simply return
/// errors, disabling the journal-reuse path while `hardlink`/`dirsymlink`
/// keep manifest-only incremental backups working.
pub trait VolumeAdapter {
    /// Open a handle to the named volume (e.g. a drive letter or device path).
    fn open(&self, volume: &str) -> Result<VolumeHandle>;

    /// Release a volume handle.
    fn close(&self, handle: VolumeHandle) -> Result<()>;

    /// Query the current journal position.
    ///
    /// Returns `SnapkeepError::JournalNotActive` when no journal exists; the
    /// replayer responds by calling [`create_journal`](Self::create_journal)
    /// and retrying once.
    fn query_journal(&self, handle: &VolumeHandle) -> Result<JournalQuery>;

    /// Create (or recreate) the change journal on this volume.
    fn create_journal(&self, handle: &VolumeHandle) -> Result<()>;

    /// Enumerate every extant file/directory record with USN `< upper_usn`,
    /// in FRN order. Used for a full replay after journal rotation or on
    /// first run.
    fn enumerate_mft(&self, handle: &VolumeHandle, upper_usn: u64) -> Result<Vec<ChangeRecord>>;

    /// Read journal records in strictly increasing USN order, starting at or
    /// after `from_usn`, for the given `journal_id`.
    fn read_journal(
        &self,
        handle: &VolumeHandle,
        journal_id: u64,
        from_usn: u64,
    ) -> Result<Vec<ChangeRecord>>;

    /// Hard-link `src` to `dst`. Must fail with
    /// `SnapkeepError::AlreadyExists` when `dst` already exists, distinct
    /// from other failure reasons.
    fn hardlink(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Create a directory symbolic link at `dst` pointing at `src`. On
    /// platforms without native directory symlinks this is emulated via
    /// reparse points; callers must not care which. Must fail with
    /// `SnapkeepError::AlreadyExists` when `dst` already exists.
    fn dirsymlink(&self, src: &Path, dst: &Path) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::SnapkeepError;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;

    /// An in-memory stand-in for a real journal, used by core's own tests.
    ///
    /// It implements `VolumeAdapter` without touching any OS change-journal
    /// API: `enumerate_mft`/`read_journal` just return canned records the
    /// test pushed in, and `hardlink`/`dirsymlink` shell out to `std::fs` so
    /// the builder's link-creation paths are exercised for real.
    pub struct FakeAdapter {
        pub journal: RefCell<Option<JournalQuery>>,
        pub mft_records: Vec<ChangeRecord>,
        pub journal_records: HashMap<u64, Vec<ChangeRecord>>,
    }

    impl FakeAdapter {
        pub fn new() -> Self {
            FakeAdapter {
                journal: RefCell::new(None),
                mft_records: Vec::new(),
                journal_records: HashMap::new(),
            }
        }

        pub fn with_journal(mut self, q: JournalQuery) -> Self {
            self.journal = RefCell::new(Some(q));
            self
        }

        pub fn with_mft_records(mut self, records: Vec<ChangeRecord>) -> Self {
            self.mft_records = records;
            self
        }

        pub fn with_journal_records(mut self, journal_id: u64, records: Vec<ChangeRecord>) -> Self {
            self.journal_records.insert(journal_id, records);
            self
        }
    }

    impl VolumeAdapter for FakeAdapter {
        fn open(&self, _volume: &str) -> Result<VolumeHandle> {
            Ok(VolumeHandle::new(()))
        }

        fn close(&self, _handle: VolumeHandle) -> Result<()> {
            Ok(())
        }

        fn query_journal(&self, _handle: &VolumeHandle) -> Result<JournalQuery> {
            self.journal
                .borrow()
                .ok_or_else(|| SnapkeepError::JournalNotActive {
                    volume: "FAKE".into(),
                })
        }

        fn create_journal(&self, _handle: &VolumeHandle) -> Result<()> {
            *self.journal.borrow_mut() = Some(JournalQuery {
                journal_id: 1,
                first_usn: 0,
                next_usn: 0,
            });
            Ok(())
        }

        fn enumerate_mft(&self, _handle: &VolumeHandle, upper_usn: u64) -> Result<Vec<ChangeRecord>> {
            Ok(self
                .mft_records
                .iter()
                .filter(|r| r.usn < upper_usn)
                .cloned()
                .collect())
        }

        fn read_journal(
            &self,
            _handle: &VolumeHandle,
            journal_id: u64,
            from_usn: u64,
        ) -> Result<Vec<ChangeRecord>> {
            Ok(self
                .journal_records
                .get(&journal_id)
                .into_iter()
                .flatten()
                .filter(|r| r.usn >= from_usn)
                .cloned()
                .collect())
        }

        fn hardlink(&self, src: &Path, dst: &Path) -> Result<()> {
            if dst.exists() {
                return Err(SnapkeepError::AlreadyExists {
                    path: dst.to_path_buf(),
                });
            }
            fs::hard_link(src, dst).map_err(|e| SnapkeepError::LinkFailure {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                reason: e.to_string(),
            })
        }

        fn dirsymlink(&self, src: &Path, dst: &Path) -> Result<()> {
            if dst.exists() {
                return Err(SnapkeepError::AlreadyExists {
                    path: dst.to_path_buf(),
                });
            }
            #[cfg(unix)]
            let result = std::os::unix::fs::symlink(src, dst);
            #[cfg(windows)]
            let result = std::os::windows::fs::symlink_dir(src, dst);
            result.map_err(|e| SnapkeepError::LinkFailure {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }
}

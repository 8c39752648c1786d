//! Core data types shared across the snapshot engine.
//!
//! These types are platform-agnostic: nothing here assumes NTFS, Windows,
//! or any particular volume-adapter implementation. Adapter crates translate
//! their raw OS structures into these before handing records to the core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A volume-local file reference number, stable across renames.
///
/// On NTFS this is the MFT record's file reference number. `FRN_ROOT`
/// identifies the volume root so the FRN map's recursive walk has a known
/// base case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Frn(pub u64);

impl Frn {
    /// The conventional root FRN (5 on NTFS).
    pub const ROOT: Frn = Frn(5);

    pub fn new(id: u64) -> Self {
        Frn(id)
    }
}

impl fmt::Display for Frn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Bit set on [`ChangeRecord::attributes`] when the record describes a directory.
pub const ATTR_DIRECTORY: u32 = 0x10;

/// A single projected change-journal record.
///
/// The volume adapter is responsible for reducing whatever raw structure the
/// platform returns (an 11-field USN record, on NTFS) down to exactly these
/// five fields; nothing else in the record is ever consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// FRN of the file or directory this record describes.
    pub frn: Frn,
    /// FRN of its parent directory at the time of the record.
    pub parent_frn: Frn,
    /// Update sequence number of this record.
    pub usn: u64,
    /// Raw attribute bits; test with [`ATTR_DIRECTORY`].
    pub attributes: u32,
    /// The file or directory's own name (not a path).
    pub name: String,
}

impl ChangeRecord {
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }
}

/// Snapshot of a volume's journal position, as returned by `query_journal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalQuery {
    pub journal_id: u64,
    pub first_usn: u64,
    pub next_usn: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_record_reports_directory_bit() {
        let dir = ChangeRecord {
            frn: Frn(1),
            parent_frn: Frn::ROOT,
            usn: 10,
            attributes: ATTR_DIRECTORY,
            name: "sub".into(),
        };
        assert!(dir.is_directory());

        let file = ChangeRecord {
            attributes: 0x20,
            ..dir.clone()
        };
        assert!(!file.is_directory());
    }

    #[test]
    fn frn_display_is_hex() {
        assert_eq!(format!("{}", Frn(255)), "0xff");
    }
}

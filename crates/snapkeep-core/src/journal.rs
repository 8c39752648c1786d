//! Change-journal replay: translates raw volume records into the set of
//! paths that may have changed since the previous snapshot.

use crate::adapter::{VolumeAdapter, VolumeHandle};
use crate::error::Result;
use crate::frnmap::FrnMap;
use crate::normalise::{ancestors, normalise};
use crate::types::ChangeRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Persisted position in a volume's change journal, plus the FRN map needed
/// to reconstruct paths for records seen so far.
///
/// Version-tagged so a future format change can detect and migrate (or
/// reject) an older `journal` state file rather than misreading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalState {
    version: u32,
    pub journal_id: Option<u64>,
    pub last_usn: Option<u64>,
    pub frn_map: FrnMap,
}

impl JournalState {
    const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        JournalState {
            version: Self::CURRENT_VERSION,
            journal_id: None,
            last_usn: None,
            frn_map: FrnMap::new(),
        }
    }
}

impl Default for JournalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Replays a volume's change journal and answers `affected(path)` queries
/// against the resulting `changed_paths`/`affected_dirs` sets.
pub struct JournalReplayer {
    state: JournalState,
    changed_paths: HashSet<String>,
    affected_dirs: HashSet<String>,
}

impl JournalReplayer {
    pub fn new(state: JournalState) -> Self {
        JournalReplayer {
            state,
            changed_paths: HashSet::new(),
            affected_dirs: HashSet::new(),
        }
    }

    /// Run the replay procedure against `volume`, updating internal state
    /// and the changed/affected sets.
    pub fn process(&mut self, adapter: &dyn VolumeAdapter, volume: &str) -> Result<()> {
        let handle = adapter.open(volume)?;
        let result = self.process_inner(adapter, &handle, volume);
        adapter.close(handle)?;
        result
    }

    fn process_inner(
        &mut self,
        adapter: &dyn VolumeAdapter,
        handle: &VolumeHandle,
        volume: &str,
    ) -> Result<()> {
        let query = match adapter.query_journal(handle) {
            Ok(q) => q,
            Err(e) if e.requires_journal_creation() => {
                adapter.create_journal(handle)?;
                adapter.query_journal(handle)?
            }
            Err(e) => return Err(e),
        };

        let full_replay = self.state.journal_id != Some(query.journal_id)
            || self
                .state
                .last_usn
                .map(|last| query.first_usn > last)
                .unwrap_or(true);

        if full_replay {
            debug!(volume, journal_id = query.journal_id, "full MFT replay");
            self.state.journal_id = Some(query.journal_id);
            self.state.last_usn = Some(query.first_usn);

            let records = adapter.enumerate_mft(handle, query.next_usn)?;
            for record in records {
                self.process_record(&record);
            }

            let requery = adapter.query_journal(handle)?;
            self.incremental_replay(adapter, handle, requery.journal_id)?;
        } else {
            self.incremental_replay(adapter, handle, query.journal_id)?;
        }

        Ok(())
    }

    fn incremental_replay(
        &mut self,
        adapter: &dyn VolumeAdapter,
        handle: &VolumeHandle,
        journal_id: u64,
    ) -> Result<()> {
        let from_usn = self.state.last_usn.unwrap_or(0);
        let records = adapter.read_journal(handle, journal_id, from_usn)?;
        for record in records {
            if record.usn > from_usn || self.state.last_usn.is_none() {
                self.process_record(&record);
            }
        }
        Ok(())
    }

    fn process_record(&mut self, record: &ChangeRecord) {
        if record.is_directory() {
            self.state
                .frn_map
                .set(record.frn, record.parent_frn, record.name.clone());
        }

        let parent_path = self.state.frn_map.build_path(record.parent_frn);
        let raw_path = if parent_path.is_empty() {
            record.name.clone()
        } else {
            format!("{}/{}", parent_path, record.name)
        };

        if record.name.chars().any(|c| c == '\u{fffd}') {
            warn!(path = %raw_path, "skipping USN record with undecodable name");
            return;
        }

        let path = normalise(&raw_path);
        for ancestor in ancestors(&path) {
            self.affected_dirs.insert(ancestor);
        }
        self.changed_paths.insert(path);

        if record.usn > self.state.last_usn.unwrap_or(0) {
            self.state.last_usn = Some(record.usn);
        }
    }

    /// True iff `path` (any form; normalised internally) may have changed.
    ///
    /// Checks `affected_dirs` at the exact node only, but walks every
    /// ancestor (including the path itself) against `changed_paths` — a
    /// directory rename invalidates everything underneath, but a single
    /// file's own change only invalidates that file and requires its parent
    /// chain to be checked too.
    pub fn affected(&self, path: &str) -> bool {
        let normalised = normalise(path);

        if self.affected_dirs.contains(&normalised) {
            return true;
        }

        if self.changed_paths.contains(&normalised) {
            return true;
        }

        ancestors(&normalised)
            .iter()
            .any(|a| self.changed_paths.contains(a))
    }

    pub fn into_state(self) -> JournalState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::FakeAdapter;
    use crate::types::{Frn, JournalQuery, ATTR_DIRECTORY};

    fn record(frn: u64, parent: u64, usn: u64, dir: bool, name: &str) -> ChangeRecord {
        ChangeRecord {
            frn: Frn(frn),
            parent_frn: Frn(parent),
            usn,
            attributes: if dir { ATTR_DIRECTORY } else { 0 },
            name: name.into(),
        }
    }

    #[test]
    fn first_run_with_no_journal_creates_one() {
        let adapter = FakeAdapter::new();
        let mut replayer = JournalReplayer::new(JournalState::new());
        replayer.process(&adapter, "C:").unwrap();
        assert_eq!(replayer.state.journal_id, Some(1));
    }

    #[test]
    fn full_replay_marks_enumerated_paths_changed() {
        let adapter = FakeAdapter::new()
            .with_journal(JournalQuery {
                journal_id: 7,
                first_usn: 0,
                next_usn: 100,
            })
            .with_mft_records(vec![
                record(1, 5, 10, true, "sub"),
                record(2, 1, 20, false, "file.txt"),
            ]);

        let mut replayer = JournalReplayer::new(JournalState::new());
        replayer.process(&adapter, "C:").unwrap();

        assert!(replayer.affected("sub/file.txt"));
        assert!(replayer.affected("sub"));
    }

    #[test]
    fn affected_checks_ancestors_of_changed_paths() {
        let adapter = FakeAdapter::new()
            .with_journal(JournalQuery {
                journal_id: 1,
                first_usn: 0,
                next_usn: 10,
            })
            .with_mft_records(vec![record(1, 5, 5, false, "deep.txt")]);

        let mut replayer = JournalReplayer::new(JournalState::new());
        replayer.process(&adapter, "C:").unwrap();

        // the file's own parent chain must be considered affected too
        assert!(replayer.affected("deep.txt"));
        assert!(!replayer.affected("unrelated.txt"));
    }

    #[test]
    fn journal_rotation_triggers_full_replay() {
        let mut state = JournalState::new();
        state.journal_id = Some(1);
        state.last_usn = Some(500);

        let adapter = FakeAdapter::new()
            .with_journal(JournalQuery {
                journal_id: 2, // rotated: different journal_id
                first_usn: 0,
                next_usn: 50,
            })
            .with_mft_records(vec![record(9, 5, 10, false, "rescanned.txt")]);

        let mut replayer = JournalReplayer::new(state);
        replayer.process(&adapter, "C:").unwrap();

        assert_eq!(replayer.state.journal_id, Some(2));
        assert!(replayer.affected("rescanned.txt"));
    }

    #[test]
    fn last_usn_is_monotonic_across_runs() {
        let adapter = FakeAdapter::new()
            .with_journal(JournalQuery {
                journal_id: 1,
                first_usn: 0,
                next_usn: 5,
            })
            .with_mft_records(vec![record(1, 5, 5, false, "a.txt")])
            .with_journal_records(1, vec![record(2, 5, 20, false, "b.txt")]);

        let mut replayer = JournalReplayer::new(JournalState::new());
        replayer.process(&adapter, "C:").unwrap();
        let first_usn = replayer.state.last_usn.unwrap();

        let state_after_first = replayer.into_state();
        let mut replayer2 = JournalReplayer::new(state_after_first);
        replayer2.process(&adapter, "C:").unwrap();
        let second_usn = replayer2.state.last_usn.unwrap();

        assert!(second_usn >= first_usn);
    }
}

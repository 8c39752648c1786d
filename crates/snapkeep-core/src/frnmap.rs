//! FRN → (parent FRN, name) directory map.
//!
//! Entries are recorded only for directories; `build_path` walks parent
//! links iteratively (not recursively, per the design notes) so a malformed
//! or cyclic state file cannot exhaust the stack.

use crate::types::Frn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recursion/iteration depth cap for `build_path`, guarding against cycles
/// introduced by a corrupted state file.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrnMap {
    entries: HashMap<Frn, (Frn, String)>,
}

impl FrnMap {
    pub fn new() -> Self {
        FrnMap::default()
    }

    /// Record (or overwrite) a directory's parent and name.
    pub fn set(&mut self, frn: Frn, parent_frn: Frn, name: String) {
        self.entries.insert(frn, (parent_frn, name));
    }

    /// Reconstruct a path by walking parent links up from `frn`.
    ///
    /// Each missing lookup terminates the walk and contributes nothing
    /// further; the path is not normalised. Exceeding [`MAX_DEPTH`] is
    /// treated the same as a missing entry: the walk stops and whatever was
    /// accumulated so far is returned, rather than faulting.
    pub fn build_path(&self, frn: Frn) -> String {
        let mut segments = Vec::new();
        let mut current = frn;
        let mut depth = 0;

        while depth < MAX_DEPTH {
            match self.entries.get(&current) {
                Some((parent, name)) => {
                    segments.push(name.clone());
                    if *parent == current {
                        break;
                    }
                    current = *parent;
                    depth += 1;
                }
                None => break,
            }
        }

        segments.reverse();
        segments.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_chain() -> FrnMap {
        let mut m = FrnMap::new();
        m.set(Frn(1), Frn::ROOT, "usr".into());
        m.set(Frn(2), Frn(1), "local".into());
        m.set(Frn(3), Frn(2), "bin".into());
        m
    }

    #[test]
    fn builds_full_chain() {
        let m = build_chain();
        assert_eq!(m.build_path(Frn(3)), "usr/local/bin");
    }

    #[test]
    fn missing_entry_yields_empty_string() {
        let m = FrnMap::new();
        assert_eq!(m.build_path(Frn(99)), "");
    }

    #[test]
    fn missing_ancestor_truncates_rather_than_fails() {
        let mut m = FrnMap::new();
        m.set(Frn(3), Frn(2), "bin".into()); // parent (2) never set
        assert_eq!(m.build_path(Frn(3)), "bin");
    }

    #[test]
    fn self_referential_cycle_terminates() {
        let mut m = FrnMap::new();
        m.set(Frn(1), Frn(1), "loop".into());
        assert_eq!(m.build_path(Frn(1)), "loop");
    }

    #[test]
    fn deep_cycle_is_bounded_not_fatal() {
        let mut m = FrnMap::new();
        // a cycle of two nodes referencing each other
        m.set(Frn(1), Frn(2), "a".into());
        m.set(Frn(2), Frn(1), "b".into());
        // must terminate rather than loop forever or overflow the stack
        let path = m.build_path(Frn(1));
        assert!(!path.is_empty());
    }

    #[test]
    fn set_overwrites_existing_entry() {
        let mut m = FrnMap::new();
        m.set(Frn(1), Frn::ROOT, "old".into());
        m.set(Frn(1), Frn::ROOT, "new".into());
        assert_eq!(m.build_path(Frn(1)), "new");
    }
}

//! Content-hash manifest: `hash -> LIFO stack of snapshot-relative paths`,
//! used to deduplicate identical file content within and across snapshots
//! via hard links.

use crate::adapter::VolumeAdapter;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestIndex {
    version: u32,
    entries: HashMap<String, Vec<String>>,
}

impl ManifestIndex {
    const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        ManifestIndex {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }

    /// Attempt to satisfy a file's content via a hard link to an existing
    /// snapshot-relative path recorded under `hash`, hard-linking
    /// `target_root.join(candidate)` to `target_root.join(rel_path)` on a
    /// match. Returns `true` iff a link was made.
    ///
    /// `size == 0` always returns `false`: zero-byte files are cheap enough
    /// to copy directly and are never recorded in the manifest.
    pub fn reuse(
        &mut self,
        hash: &str,
        size: u64,
        rel_path: &str,
        target_root: &Path,
        adapter: &dyn VolumeAdapter,
    ) -> Result<bool> {
        if size == 0 {
            return Ok(false);
        }

        let Some(candidates) = self.entries.get_mut(hash) else {
            self.entries.insert(hash.to_string(), vec![rel_path.to_string()]);
            return Ok(false);
        };

        let mut set_aside = Vec::new();
        let mut matched = None;

        while let Some(candidate) = candidates.pop() {
            let candidate_path = target_root.join(&candidate);
            match std::fs::metadata(&candidate_path) {
                Ok(meta) if meta.len() == size => {
                    matched = Some(candidate);
                    break;
                }
                Ok(meta) => {
                    warn!(
                        candidate = %candidate,
                        expected = size,
                        found = meta.len(),
                        "manifest candidate size mismatch"
                    );
                    set_aside.push(candidate);
                }
                Err(e) => {
                    warn!(candidate = %candidate, error = %e, "manifest candidate could not be stat'd");
                }
            }
        }

        // mismatched candidates go back to the front so the most-recently
        // validated match stays closest to the tail for the next lookup.
        for candidate in set_aside.into_iter().rev() {
            candidates.insert(0, candidate);
        }

        match matched {
            Some(candidate) => {
                let src = target_root.join(&candidate);
                let dst = target_root.join(rel_path);
                adapter.hardlink(&src, &dst)?;
                candidates.push(candidate);
                candidates.push(rel_path.to_string());
                Ok(true)
            }
            None => {
                candidates.push(rel_path.to_string());
                Ok(false)
            }
        }
    }
}

impl Default for ManifestIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::FakeAdapter;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn zero_size_is_never_reused() {
        let dir = TempDir::new().unwrap();
        let adapter = FakeAdapter::new();
        let mut manifest = ManifestIndex::new();
        assert!(!manifest
            .reuse("deadbeef", 0, "empty", dir.path(), &adapter)
            .unwrap());
        assert!(manifest.entries.get("deadbeef").is_none());
    }

    #[test]
    fn first_sighting_of_a_hash_records_without_reuse() {
        let dir = TempDir::new().unwrap();
        let adapter = FakeAdapter::new();
        let mut manifest = ManifestIndex::new();
        let reused = manifest
            .reuse("abc123", 5, "a.txt", dir.path(), &adapter)
            .unwrap();
        assert!(!reused);
        assert_eq!(manifest.entries["abc123"], vec!["a.txt".to_string()]);
    }

    #[test]
    fn second_sighting_links_to_first() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", b"hello");
        let adapter = FakeAdapter::new();
        let mut manifest = ManifestIndex::new();

        manifest
            .reuse("abc123", 5, "a.txt", dir.path(), &adapter)
            .unwrap();
        let reused = manifest
            .reuse("abc123", 5, "b.txt", dir.path(), &adapter)
            .unwrap();

        assert!(reused);
        assert!(dir.path().join("b.txt").exists());
        assert_eq!(
            manifest.entries["abc123"],
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }

    #[test]
    fn size_mismatched_candidate_is_kept_but_not_matched() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", b"hello"); // 5 bytes, manifest will say wrong size
        let adapter = FakeAdapter::new();
        let mut manifest = ManifestIndex::new();
        manifest
            .reuse("abc123", 999, "a.txt", dir.path(), &adapter)
            .unwrap();

        // a.txt is on disk but its size doesn't match the recorded hash's
        // expected size, so no link should have been made, and the
        // candidate should remain recorded for future lookups under the
        // correct size.
        assert!(!dir.path().join("b.txt").exists());
        assert!(manifest.entries["abc123"].contains(&"a.txt".to_string()));
    }

    #[test]
    fn missing_candidate_is_dropped_with_warning() {
        let dir = TempDir::new().unwrap();
        // a.txt recorded but never actually written to disk
        let adapter = FakeAdapter::new();
        let mut manifest = ManifestIndex::new();
        manifest.entries.insert("abc123".to_string(), vec!["a.txt".to_string()]);

        let reused = manifest
            .reuse("abc123", 5, "b.txt", dir.path(), &adapter)
            .unwrap();

        assert!(!reused);
        assert!(!manifest.entries["abc123"].contains(&"a.txt".to_string()));
        assert!(manifest.entries["abc123"].contains(&"b.txt".to_string()));
    }

    #[test]
    fn each_path_appears_exactly_once_per_hash() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", b"hello");
        let adapter = FakeAdapter::new();
        let mut manifest = ManifestIndex::new();

        manifest
            .reuse("abc123", 5, "a.txt", dir.path(), &adapter)
            .unwrap();
        manifest
            .reuse("abc123", 5, "b.txt", dir.path(), &adapter)
            .unwrap();

        let occurrences = manifest.entries["abc123"]
            .iter()
            .filter(|p| p.as_str() == "a.txt")
            .count();
        assert_eq!(occurrences, 1);
    }
}

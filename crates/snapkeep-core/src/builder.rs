//! Snapshot builder: walks the source tree and realises each item as a
//! link (to the previous snapshot or to already-written content in the
//! current one) or a copy from source.

use crate::adapter::VolumeAdapter;
use crate::error::{Result, SnapkeepError};
use crate::journal::JournalReplayer;
use crate::manifest::ManifestIndex;
use md5::{Digest, Md5};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tunables for the buffered hash-then-copy path, per §4.5.
#[derive(Debug, Clone, Copy)]
pub struct CopyConfig {
    pub chunk_size: usize,
    pub chunk_cap: usize,
}

impl CopyConfig {
    pub fn max_buffered_bytes(&self) -> usize {
        self.chunk_size * self.chunk_cap
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        CopyConfig {
            chunk_size: 1024 * 1024,
            chunk_cap: 512,
        }
    }
}

/// Everything `backup_item` needs to classify and materialise one item.
pub struct SnapshotBuilder<'a> {
    source_root: PathBuf,
    target_root: PathBuf,
    snapshot_name: String,
    previous_name: Option<String>,
    exclusions: &'a HashSet<String>,
    journal: Option<&'a JournalReplayer>,
    manifest: &'a mut ManifestIndex,
    adapter: &'a dyn VolumeAdapter,
    enable_dir_reuse: bool,
    copy_config: CopyConfig,
}

impl<'a> SnapshotBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_root: PathBuf,
        target_root: PathBuf,
        snapshot_name: String,
        previous_name: Option<String>,
        exclusions: &'a HashSet<String>,
        journal: Option<&'a JournalReplayer>,
        manifest: &'a mut ManifestIndex,
        adapter: &'a dyn VolumeAdapter,
        enable_dir_reuse: bool,
    ) -> Self {
        SnapshotBuilder {
            source_root,
            target_root,
            snapshot_name,
            previous_name,
            exclusions,
            journal,
            manifest,
            adapter,
            enable_dir_reuse,
            copy_config: CopyConfig::default(),
        }
    }

    pub fn with_copy_config(mut self, config: CopyConfig) -> Self {
        self.copy_config = config;
        self
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.target_root.join(&self.snapshot_name)
    }

    fn previous_dir(&self) -> Option<PathBuf> {
        self.previous_name
            .as_ref()
            .map(|name| self.target_root.join(name))
    }

    fn source_path(&self, rel_path: &str) -> PathBuf {
        if rel_path.is_empty() {
            self.source_root.clone()
        } else {
            self.source_root.join(rel_path)
        }
    }

    fn target_path(&self, rel_path: &str) -> PathBuf {
        if rel_path.is_empty() {
            self.snapshot_dir()
        } else {
            self.snapshot_dir().join(rel_path)
        }
    }

    fn excluded(&self, rel_path: &str) -> bool {
        let source_path = self.source_path(rel_path);
        self.exclusions
            .iter()
            .any(|excluded| source_path == Path::new(excluded))
    }

    /// Classify and materialise `rel_path` (the empty string means the
    /// source root itself). Recurses into directories.
    pub fn backup_item(&mut self, rel_path: &str) -> Result<()> {
        if self.excluded(rel_path) {
            info!(path = rel_path, "excluded, skipping");
            return Ok(());
        }

        let source_path = self.source_path(rel_path);
        let metadata = match std::fs::symlink_metadata(&source_path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %source_path.display(), error = %e, "could not stat source item");
                return Ok(());
            }
        };
        let is_dir = metadata.is_dir();

        if self.reusable(rel_path, is_dir) {
            match self.reuse_link(rel_path, is_dir) {
                Ok(()) => {
                    info!(path = rel_path, "reused from previous snapshot");
                    return Ok(());
                }
                Err(e) if !is_dir => {
                    warn!(path = rel_path, error = %e, "link reuse failed, falling back to copy");
                }
                Err(e) => return Err(e),
            }
        }

        if is_dir {
            let target_path = self.target_path(rel_path);
            std::fs::create_dir_all(&target_path).map_err(|e| SnapkeepError::CopyFailure {
                path: target_path.clone(),
                reason: e.to_string(),
            })?;

            for child in self.get_children(rel_path) {
                let child_rel = if rel_path.is_empty() {
                    child
                } else {
                    format!("{rel_path}/{child}")
                };
                self.backup_item(&child_rel)?;
            }
        } else {
            self.copy_or_dedup(rel_path)?;
        }

        info!(path = rel_path, "backed up");
        Ok(())
    }

    fn reusable(&self, rel_path: &str, is_dir: bool) -> bool {
        let Some(journal) = self.journal else {
            return false;
        };
        if self.previous_dir().is_none() {
            return false;
        }
        if is_dir && !self.enable_dir_reuse {
            return false;
        }
        let source_path = self.source_path(rel_path);
        !journal.affected(&source_path.to_string_lossy())
    }

    fn reuse_link(&self, rel_path: &str, is_dir: bool) -> Result<()> {
        let previous_dir = self
            .previous_dir()
            .expect("reusable() guarantees a previous snapshot");
        let src = if rel_path.is_empty() {
            previous_dir
        } else {
            previous_dir.join(rel_path)
        };
        let dst = self.target_path(rel_path);

        if is_dir {
            self.adapter.dirsymlink(&src, &dst)
        } else {
            self.adapter.hardlink(&src, &dst)
        }
    }

    fn get_children(&self, rel_path: &str) -> Vec<String> {
        let source_path = self.source_path(rel_path);
        match std::fs::read_dir(&source_path) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                warn!(path = %source_path.display(), error = %e, "failed to enumerate directory");
                Vec::new()
            }
        }
    }

    fn copy_or_dedup(&mut self, rel_path: &str) -> Result<()> {
        let source_path = self.source_path(rel_path);
        let target_path = self.target_path(rel_path);

        let mut file = File::open(&source_path).map_err(|e| SnapkeepError::CopyFailure {
            path: source_path.clone(),
            reason: e.to_string(),
        })?;

        let max_buffered = self.copy_config.max_buffered_bytes();
        let mut buffer = Vec::with_capacity(self.copy_config.chunk_size.min(max_buffered));
        let mut hasher = Md5::new();
        let mut total_size: u64 = 0;
        let mut fully_buffered = true;
        let mut chunk = vec![0u8; self.copy_config.chunk_size];

        loop {
            let read = file.read(&mut chunk).map_err(|e| SnapkeepError::CopyFailure {
                path: source_path.clone(),
                reason: e.to_string(),
            })?;
            if read == 0 {
                break;
            }
            hasher.update(&chunk[..read]);
            total_size += read as u64;

            if fully_buffered {
                if buffer.len() + read <= max_buffered {
                    buffer.extend_from_slice(&chunk[..read]);
                } else {
                    fully_buffered = false;
                    buffer.clear();
                }
            }
        }

        let hash = hex_encode(&hasher.finalize());

        // manifest entries are recorded relative to the target root (the
        // directory holding every named snapshot), not this snapshot's own
        // subdirectory, so that content can be reused by hard link across
        // snapshot generations rather than only within one.
        let manifest_rel_path = format!("{}/{}", self.snapshot_name, rel_path);

        if total_size > 0 {
            let reused = self.manifest.reuse(
                &hash,
                total_size,
                &manifest_rel_path,
                &self.target_root,
                self.adapter,
            )?;
            if reused {
                return Ok(());
            }
        }

        if fully_buffered {
            std::fs::write(&target_path, &buffer).map_err(|e| SnapkeepError::CopyFailure {
                path: target_path.clone(),
                reason: e.to_string(),
            })?;
        } else {
            let mut source = File::open(&source_path).map_err(|e| SnapkeepError::CopyFailure {
                path: source_path.clone(),
                reason: e.to_string(),
            })?;
            let mut dest = File::create(&target_path).map_err(|e| SnapkeepError::CopyFailure {
                path: target_path.clone(),
                reason: e.to_string(),
            })?;
            std::io::copy(&mut source, &mut dest).map_err(|e| SnapkeepError::CopyFailure {
                path: target_path.clone(),
                reason: e.to_string(),
            })?;
            dest.flush().map_err(|e| SnapkeepError::CopyFailure {
                path: target_path.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::FakeAdapter;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let target = dir.path().join("tgt");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        (dir, source, target)
    }

    #[test]
    fn first_run_mirrors_the_source_tree() {
        let (_dir, source, target) = setup();
        fs::write(source.join("a.txt"), b"hello").unwrap();
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("sub/b.txt"), b"world").unwrap();

        let exclusions = HashSet::new();
        let mut manifest = ManifestIndex::new();
        let adapter = FakeAdapter::new();
        let mut builder = SnapshotBuilder::new(
            source.clone(),
            target.clone(),
            "snap1".into(),
            None,
            &exclusions,
            None,
            &mut manifest,
            &adapter,
            true,
        );

        builder.backup_item("").unwrap();

        assert_eq!(
            fs::read(target.join("snap1/a.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(
            fs::read(target.join("snap1/sub/b.txt")).unwrap(),
            b"world"
        );
    }

    #[test]
    fn identical_content_is_hardlinked_within_snapshot() {
        let (_dir, source, target) = setup();
        fs::write(source.join("a.txt"), b"hello").unwrap();
        fs::write(source.join("c.txt"), b"hello").unwrap();

        let exclusions = HashSet::new();
        let mut manifest = ManifestIndex::new();
        let adapter = FakeAdapter::new();
        let mut builder = SnapshotBuilder::new(
            source.clone(),
            target.clone(),
            "snap1".into(),
            None,
            &exclusions,
            None,
            &mut manifest,
            &adapter,
            true,
        );
        builder.backup_item("").unwrap();

        let a_meta = fs::metadata(target.join("snap1/a.txt")).unwrap();
        let c_meta = fs::metadata(target.join("snap1/c.txt")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            assert_eq!(a_meta.ino(), c_meta.ino());
        }
        #[cfg(not(unix))]
        {
            let _ = (a_meta, c_meta);
        }
    }

    #[test]
    fn zero_byte_file_is_copied_and_not_deduped() {
        let (_dir, source, target) = setup();
        fs::write(source.join("empty"), b"").unwrap();

        let exclusions = HashSet::new();
        let mut manifest = ManifestIndex::new();
        let adapter = FakeAdapter::new();
        let mut builder = SnapshotBuilder::new(
            source.clone(),
            target.clone(),
            "snap1".into(),
            None,
            &exclusions,
            None,
            &mut manifest,
            &adapter,
            true,
        );
        builder.backup_item("").unwrap();

        assert_eq!(fs::read(target.join("snap1/empty")).unwrap(), b"");
    }

    #[test]
    fn excluded_path_is_skipped() {
        let (_dir, source, target) = setup();
        fs::create_dir_all(source.join("tmp")).unwrap();
        fs::write(source.join("tmp/file"), b"x").unwrap();
        fs::write(source.join("keep.txt"), b"y").unwrap();

        let mut exclusions = HashSet::new();
        exclusions.insert(source.join("tmp").to_string_lossy().into_owned());

        let mut manifest = ManifestIndex::new();
        let adapter = FakeAdapter::new();
        let mut builder = SnapshotBuilder::new(
            source.clone(),
            target.clone(),
            "snap1".into(),
            None,
            &exclusions,
            None,
            &mut manifest,
            &adapter,
            true,
        );
        builder.backup_item("").unwrap();

        assert!(!target.join("snap1/tmp").exists());
        assert!(target.join("snap1/keep.txt").exists());
    }
}

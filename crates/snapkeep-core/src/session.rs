//! Top-level snapshot session: wires exclusions, journal state, and the
//! manifest together and drives one run of the builder.

use crate::adapter::VolumeAdapter;
use crate::builder::{CopyConfig, SnapshotBuilder};
use crate::error::{Result, SnapkeepError};
use crate::journal::{JournalReplayer, JournalState};
use crate::manifest::ManifestIndex;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

const JOURNAL_STATE_FILE: &str = ".snapkeep-journal";
const MANIFEST_FILE: &str = ".snapkeep-manifest";
const PREVIOUS_LINK_FILE: &str = ".snapkeep-previous";
const EXCLUSIONS_FILE: &str = ".snapkeep-exclusions";

/// Tunables for a single snapshot run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Volume identifier (e.g. a drive letter) passed to the adapter when a
    /// journal is in use. Ignored when `use_journal` is false.
    pub volume: String,
    pub use_journal: bool,
    pub enable_dir_reuse: bool,
    pub snapshot_name: String,
    pub exclusions: HashSet<PathBuf>,
    pub copy: CopyConfig,
}

impl SessionConfig {
    pub fn new(volume: impl Into<String>, snapshot_name: impl Into<String>) -> Self {
        SessionConfig {
            volume: volume.into(),
            use_journal: true,
            enable_dir_reuse: true,
            snapshot_name: snapshot_name.into(),
            exclusions: HashSet::new(),
            copy: CopyConfig::default(),
        }
    }
}

/// Drives one incremental snapshot run from `source` into `target`.
pub struct SnapshotSession<'a> {
    source: PathBuf,
    target: PathBuf,
    config: SessionConfig,
    adapter: &'a dyn VolumeAdapter,
}

impl<'a> SnapshotSession<'a> {
    pub fn new(
        source: PathBuf,
        target: PathBuf,
        config: SessionConfig,
        adapter: &'a dyn VolumeAdapter,
    ) -> Self {
        SnapshotSession {
            source,
            target,
            config,
            adapter,
        }
    }

    /// Run the full nine-step procedure: create the snapshot directory,
    /// load prior state, replay the journal (if enabled), build the tree,
    /// then persist state back for next time.
    pub fn run(&mut self) -> Result<PathBuf> {
        let snapshot_dir = self.target.join(&self.config.snapshot_name);
        if snapshot_dir.exists() {
            return Err(SnapkeepError::NameCollision {
                target: self.target.clone(),
                name: self.config.snapshot_name.clone(),
            });
        }
        std::fs::create_dir_all(&self.target)?;

        let previous_name = self.load_previous_name();

        let mut exclusions: HashSet<String> = self
            .config
            .exclusions
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        exclusions.extend(self.load_exclusions_file());
        exclusions.insert(self.target.to_string_lossy().into_owned());

        let replayer = if self.config.use_journal {
            let state = self.load_journal_state();
            let mut replayer = JournalReplayer::new(state);
            match replayer.process(self.adapter, &self.config.volume) {
                Ok(()) => Some(replayer),
                Err(e) => {
                    warn!(error = %e, "journal replay failed, disabling reuse for this run");
                    None
                }
            }
        } else {
            None
        };

        let mut manifest = self.load_manifest();

        {
            let mut builder = SnapshotBuilder::new(
                self.source.clone(),
                self.target.clone(),
                self.config.snapshot_name.clone(),
                previous_name.clone(),
                &exclusions,
                replayer.as_ref(),
                &mut manifest,
                self.adapter,
                self.config.enable_dir_reuse,
            )
            .with_copy_config(self.config.copy);

            builder.backup_item("")?;
        }

        self.save_manifest(&manifest)?;
        if let Some(replayer) = replayer {
            self.save_journal_state(&replayer.into_state())?;
        }
        self.save_previous_name(&self.config.snapshot_name)?;

        info!(
            snapshot = %self.config.snapshot_name,
            previous = ?previous_name,
            "snapshot complete"
        );
        Ok(snapshot_dir)
    }

    fn state_path(&self, file: &str) -> PathBuf {
        self.target.join(file)
    }

    fn load_previous_name(&self) -> Option<String> {
        let path = self.state_path(PREVIOUS_LINK_FILE);
        match std::fs::read_to_string(&path) {
            Ok(name) => {
                let name = name.trim().to_string();
                if name.is_empty() || !self.target.join(&name).exists() {
                    None
                } else {
                    Some(name)
                }
            }
            Err(_) => None,
        }
    }

    /// Load the target's `exclusions` file: one path per line, blank lines
    /// skipped. Absent file means no additional exclusions.
    fn load_exclusions_file(&self) -> HashSet<String> {
        let path = self.state_path(EXCLUSIONS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => HashSet::new(),
        }
    }

    fn save_previous_name(&self, name: &str) -> Result<()> {
        let path = self.state_path(PREVIOUS_LINK_FILE);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, name)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_journal_state(&self) -> JournalState {
        let path = self.state_path(JOURNAL_STATE_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "could not parse journal state, starting fresh");
                JournalState::new()
            }),
            Err(_) => JournalState::new(),
        }
    }

    fn save_journal_state(&self, state: &JournalState) -> Result<()> {
        let path = self.state_path(JOURNAL_STATE_FILE);
        let bytes = bincode::serialize(state)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_manifest(&self) -> ManifestIndex {
        let path = self.state_path(MANIFEST_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "could not parse manifest, starting fresh");
                ManifestIndex::new()
            }),
            Err(_) => ManifestIndex::new(),
        }
    }

    fn save_manifest(&self, manifest: &ManifestIndex) -> Result<()> {
        let path = self.state_path(MANIFEST_FILE);
        let bytes = bincode::serialize(manifest)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

//! Checkpoint persistence and restoration
//!
//! A checkpoint is a step-indexed snapshot of the model parameters plus the
//! training counters, stored under a working directory. The latest snapshot
//! is discoverable through a pointer record in the same directory.
//!
//! The pointer stores a path, but only its base name is trusted on
//! restore: the recorded directory prefix is rewritten to the current
//! working directory, so a run produced on one machine can be resumed from
//! a relocated copy of its directory. Restoration failures of any kind
//! (missing directory, corrupt files, incompatible parameters) abandon the
//! restore and the engine cold-starts; resuming is best-effort, never
//! fatal.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tch::nn;

use crate::train::state::TrainState;

/// Name of the pointer record inside the working directory
const POINTER_FILE: &str = "checkpoint.json";

/// Pointer record naming the latest checkpoint
#[derive(Debug, Serialize, Deserialize)]
struct PointerRecord {
    /// Path of the latest checkpoint's base name (without extension); the
    /// directory prefix may belong to another machine.
    latest: String,
}

/// Saves and restores training snapshots under a working directory
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager over `dir`, creating the directory if needed
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating checkpoint directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// The working directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist model parameters and training state, keyed by step count
    ///
    /// Writes `ckpt-<steps>.ot` (parameters), `ckpt-<steps>.json` (state),
    /// then updates the pointer record.
    pub fn save(&self, vs: &nn::VarStore, state: &TrainState) -> Result<()> {
        let stem = self.dir.join(format!("ckpt-{}", state.num_steps));

        vs.save(stem.with_extension("ot"))
            .with_context(|| format!("saving parameters to {}", stem.display()))?;
        fs::write(stem.with_extension("json"), serde_json::to_string_pretty(state)?)?;

        let pointer = PointerRecord { latest: stem.to_string_lossy().into_owned() };
        fs::write(self.dir.join(POINTER_FILE), serde_json::to_string_pretty(&pointer)?)?;

        tracing::info!(
            "saved checkpoint: {} episodes, {} steps",
            state.num_episodes,
            state.num_steps
        );
        Ok(())
    }

    /// Restore the latest checkpoint into `vs`, if one is usable
    ///
    /// Returns the restored training state, or `None` when there is no
    /// checkpoint or loading failed for any reason.
    pub fn restore(&self, vs: &mut nn::VarStore) -> Option<TrainState> {
        match self.try_restore(vs) {
            Ok(restored) => restored,
            Err(e) => {
                tracing::info!("checkpoint restore skipped, starting fresh: {e:#}");
                None
            }
        }
    }

    fn try_restore(&self, vs: &mut nn::VarStore) -> Result<Option<TrainState>> {
        let pointer_path = self.dir.join(POINTER_FILE);
        if !pointer_path.exists() {
            return Ok(None);
        }

        let pointer: PointerRecord = serde_json::from_str(&fs::read_to_string(&pointer_path)?)?;

        // Re-root: keep only the recorded base name and resolve it against
        // this manager's directory, so relocated run directories resume.
        let base = Path::new(&pointer.latest)
            .file_name()
            .context("pointer record names no file")?;
        let stem = self.dir.join(base);

        let state: TrainState =
            serde_json::from_str(&fs::read_to_string(stem.with_extension("json"))?)?;
        vs.load(stem.with_extension("ot"))
            .with_context(|| format!("loading parameters from {}", stem.display()))?;

        Ok(Some(state))
    }
}

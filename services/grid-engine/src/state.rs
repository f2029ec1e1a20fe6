//! State files for observability
//!
//! `state/now.json` is overwritten after every cycle and manual execution.
//! Each analysed strategy pair is journaled under `journal/decisions/`.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::engine::{ActiveStrategy, EngineSnapshot};

pub struct StateManager {
    state_dir: PathBuf,
    journal_dir: PathBuf,
}

impl StateManager {
    pub fn new(workspace_dir: impl AsRef<Path>) -> Self {
        let base = workspace_dir.as_ref();
        Self {
            state_dir: base.join("state"),
            journal_dir: base.join("journal").join("decisions"),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        fs::create_dir_all(&self.journal_dir).await?;
        Ok(())
    }

    pub fn now_path(&self) -> PathBuf {
        self.state_dir.join("now.json")
    }

    pub async fn write_now(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.now_path(), json).await?;
        debug!("Wrote state/now.json");
        Ok(())
    }

    /// One file per cycle; a later write for the same cycle (after
    /// execution) replaces the earlier one
    pub async fn write_decision(&self, strategy: &ActiveStrategy) -> anyhow::Result<PathBuf> {
        let path = self.journal_dir.join(format!("{}.json", strategy.cycle_id));
        let json = serde_json::to_string_pretty(strategy)?;
        fs::write(&path, json).await?;
        debug!("Journaled decision {}", strategy.cycle_id);
        Ok(path)
    }
}

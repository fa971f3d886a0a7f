use crate::error::{CorpusError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory holding every version of the store.
    pub root: PathBuf,
    /// Number of most-recent versions kept on disk.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Checkpoint on every n-th `add_documents` call.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
}
fn default_retention() -> usize { 5 }
fn default_checkpoint_interval() -> usize { 1 }

impl CorpusConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into(), retention: default_retention(), checkpoint_interval: default_checkpoint_interval() }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention < 1 {
            return Err(CorpusError::InvalidConfiguration(format!("retention must be at least 1, got {}", self.retention)));
        }
        if self.checkpoint_interval < 1 {
            return Err(CorpusError::InvalidConfiguration(format!(
                "checkpoint_interval must be at least 1, got {}",
                self.checkpoint_interval
            )));
        }
        if self.root.as_os_str().is_empty() {
            return Err(CorpusError::InvalidConfiguration("store root path is empty".into()));
        }
        if let Ok(meta) = std::fs::metadata(&self.root) {
            if !meta.is_dir() {
                return Err(CorpusError::InvalidConfiguration(format!("{} is not a directory", self.root.display())));
            }
            if meta.permissions().readonly() {
                return Err(CorpusError::InvalidConfiguration(format!("{} is not writable", self.root.display())));
            }
        }
        Ok(())
    }
}

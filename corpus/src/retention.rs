use crate::error::PruneWarning;
use crate::persist::{list_versions, StorePaths};
use crate::Version;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Keeps at most `window` most-recent versions on disk.
#[derive(Clone)]
pub struct RetentionManager {
    paths: StorePaths,
    window: usize,
    remove: fn(&Path) -> io::Result<()>,
}

impl RetentionManager {
    pub fn new(paths: StorePaths, window: usize) -> Self {
        Self { paths, window: window.max(1), remove: remove_version_dir }
    }

    /// Replace how version directories are removed, so tests can make removal fail.
    #[cfg(test)]
    pub(crate) fn with_remover(mut self, remove: fn(&Path) -> io::Result<()>) -> Self {
        self.remove = remove;
        self
    }

    pub fn window(&self) -> usize { self.window }

    /// Remove every version `v <= current - window`. Failures are returned as
    /// warnings and never affect `current` or anything newer.
    pub fn prune(&self, current: Version) -> Vec<PruneWarning> {
        let cutoff = current.saturating_sub(self.window as Version);
        if cutoff == 0 {
            return Vec::new();
        }
        let versions = match list_versions(&self.paths.root) {
            Ok(v) => v,
            Err(source) => {
                tracing::warn!(error = %source, "prune skipped");
                return vec![PruneWarning::List { source }];
            }
        };

        let mut warnings = Vec::new();
        for version in versions.into_iter().take_while(|&v| v <= cutoff) {
            match (self.remove)(&self.paths.version_dir(version)) {
                Ok(()) => tracing::debug!(version, "pruned version"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    tracing::warn!(version, error = %source, "could not prune version");
                    warnings.push(PruneWarning::Remove { version, source });
                }
            }
        }
        warnings
    }
}

impl fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionManager").field("root", &self.paths.root).field("window", &self.window).finish()
    }
}

fn remove_version_dir(dir: &Path) -> io::Result<()> { fs::remove_dir_all(dir) }

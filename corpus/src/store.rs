use crate::checkpoint::CheckpointWriter;
use crate::config::CorpusConfig;
use crate::error::{CorpusError, PruneWarning, Result};
use crate::matrix::{CorpusMatrix, MatrixSegment};
use crate::persist::{list_staging, StorePaths};
use crate::recovery::{recover, Recovered};
use crate::retention::RetentionManager;
use crate::vocab::{Vocabulary, VocabularySnapshot};
use crate::Version;
use std::fs;
use std::path::Path;

/// Outcome of one `add_documents` or `commit` call.
#[derive(Debug)]
pub struct Commit {
    /// Latest durable version after the call.
    pub version: Version,
    /// Documents absorbed by this call.
    pub documents: usize,
    /// Whether this call published a new version.
    pub checkpointed: bool,
    pub warnings: Vec<PruneWarning>,
}

/// A durable, incrementally growing corpus.
///
/// Single writer: callers must not mutate one store root from two instances
/// at once. Published versions are immutable and safe to read concurrently.
pub struct OnlineCorpus {
    config: CorpusConfig,
    writer: CheckpointWriter,
    retention: RetentionManager,
    vocab: VocabularySnapshot,
    pending: MatrixSegment,
    calls_since_checkpoint: usize,
}

impl OnlineCorpus {
    /// Validate `config`, clean up after crashed writers and recover the latest version.
    pub fn open(config: CorpusConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.root).map_err(|e| {
            CorpusError::InvalidConfiguration(format!("cannot create store root {}: {e}", config.root.display()))
        })?;
        match list_staging(&config.root) {
            Ok(stale) => {
                for dir in stale {
                    tracing::warn!(path = %dir.display(), "removing unpublished staging directory");
                    if let Err(e) = fs::remove_dir_all(&dir) {
                        tracing::warn!(path = %dir.display(), error = %e, "could not remove staging directory");
                    }
                }
            }
            Err(e) => tracing::warn!(root = %config.root.display(), error = %e, "could not scan for staging directories"),
        }

        let Recovered { version, vocabulary, matrix } = recover(&config.root)?;
        let paths = StorePaths::new(&config.root);
        tracing::info!(root = %config.root.display(), version, retention = config.retention, "corpus opened");
        Ok(Self {
            writer: CheckpointWriter::new(paths.clone(), version, matrix),
            retention: RetentionManager::new(paths, config.retention),
            vocab: vocabulary.into(),
            pending: MatrixSegment::new(),
            calls_since_checkpoint: 0,
            config,
        })
    }

    /// Absorb a batch of tokenized documents.
    ///
    /// All-or-nothing: on error the vocabulary and matrix are exactly as they
    /// were before the call.
    pub fn add_documents<I, D, S>(&mut self, documents: I) -> Result<Commit>
    where
        I: IntoIterator<Item = D>,
        D: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocabulary::clone(&self.vocab);
        let mut batch = MatrixSegment::new();
        for doc in documents {
            batch.append(vocab.add(doc));
        }
        let documents = batch.len();

        if self.calls_since_checkpoint + 1 < self.config.checkpoint_interval {
            self.vocab = vocab.into();
            self.pending.extend(batch);
            self.calls_since_checkpoint += 1;
            tracing::debug!(documents, pending = self.pending.len(), "documents buffered");
            return Ok(Commit { version: self.version(), documents, checkpointed: false, warnings: Vec::new() });
        }

        let version = self.writer.checkpoint(&vocab, self.pending.iter().chain(batch.iter()))?;
        self.vocab = vocab.into();
        self.pending.clear();
        self.calls_since_checkpoint = 0;
        tracing::info!(version, documents, total = self.vocab.num_docs(), "checkpoint published");
        let warnings = self.retention.prune(version);
        Ok(Commit { version, documents, checkpointed: true, warnings })
    }

    /// Checkpoint buffered documents now. A no-op when nothing is buffered.
    pub fn commit(&mut self) -> Result<Commit> {
        if self.pending.is_empty() {
            return Ok(Commit { version: self.version(), documents: 0, checkpointed: false, warnings: Vec::new() });
        }
        let documents = self.pending.len();
        let version = self.writer.checkpoint(&self.vocab, self.pending.iter())?;
        self.pending.clear();
        self.calls_since_checkpoint = 0;
        tracing::info!(version, documents, "pending documents committed");
        let warnings = self.retention.prune(version);
        Ok(Commit { version, documents, checkpointed: true, warnings })
    }

    /// Latest published version; 0 before the first checkpoint.
    pub fn version(&self) -> Version { self.writer.version() }
    pub fn vocabulary(&self) -> VocabularySnapshot { self.vocab.clone() }
    /// Every absorbed document, published or buffered, in ingestion order.
    pub fn matrix(&self) -> CorpusMatrix<'_> { CorpusMatrix::new(self.writer.latest(), self.pending.as_slice()) }
    pub fn pending(&self) -> usize { self.pending.len() }
    pub fn root(&self) -> &Path { &self.config.root }
    pub fn config(&self) -> &CorpusConfig { &self.config }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::list_versions;
    use crate::recovery::Checkpoint;
    use std::io;
    use tempfile::tempdir;

    #[test]
    fn buffered_documents_are_readable_before_commit() {
        let dir = tempdir().unwrap();
        let mut store = OnlineCorpus::open(CorpusConfig::new(dir.path()).with_checkpoint_interval(3)).unwrap();

        let c = store.add_documents([["a", "b"]]).unwrap();
        assert!(!c.checkpointed);
        assert_eq!(c.version, 0);
        store.add_documents([["b"]]).unwrap();
        assert_eq!(store.pending(), 2);
        assert_eq!(store.matrix().to_vec().unwrap(), vec![vec![(0, 1), (1, 1)], vec![(1, 1)]]);
        assert!(list_versions(dir.path()).unwrap().is_empty());

        let c = store.add_documents([["c"]]).unwrap();
        assert!(c.checkpointed);
        assert_eq!(c.version, 1);
        assert_eq!(store.pending(), 0);
        assert_eq!(store.matrix().len(), 3);
    }

    #[test]
    fn commit_flushes_pending() {
        let dir = tempdir().unwrap();
        let mut store = OnlineCorpus::open(CorpusConfig::new(dir.path()).with_checkpoint_interval(10)).unwrap();
        assert!(!store.commit().unwrap().checkpointed);
        store.add_documents([["x"], ["y"]]).unwrap();
        let c = store.commit().unwrap();
        assert!(c.checkpointed);
        assert_eq!((c.version, c.documents), (1, 2));
        drop(store);

        let reopened = OnlineCorpus::open(CorpusConfig::new(dir.path())).unwrap();
        assert_eq!(reopened.version(), 1);
        assert_eq!(reopened.vocabulary().num_docs(), 2);
    }

    #[test]
    fn failed_checkpoint_absorbs_nothing() {
        let dir = tempdir().unwrap();
        let mut store = OnlineCorpus::open(CorpusConfig::new(dir.path())).unwrap();
        store.add_documents([["hello"]]).unwrap();
        fs::create_dir(StorePaths::new(dir.path()).version_dir(2)).unwrap();

        let err = store.add_documents([["world"]]).unwrap_err();
        assert!(matches!(err, CorpusError::CheckpointWriteFailed { version: 2, .. }));
        assert_eq!(store.version(), 1);
        assert_eq!(store.vocabulary().num_docs(), 1);
        assert_eq!(store.vocabulary().id("world"), None);
        assert_eq!(store.matrix().len(), 1);
    }

    #[test]
    fn prune_failure_does_not_fail_the_batch() {
        let dir = tempdir().unwrap();
        let mut store = OnlineCorpus::open(CorpusConfig::new(dir.path()).with_retention(1)).unwrap();
        store.add_documents([["hello"]]).unwrap();
        store.retention = RetentionManager::new(StorePaths::new(dir.path()), 1)
            .with_remover(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "held open")));

        let c = store.add_documents([["world"]]).unwrap();
        assert!(c.checkpointed);
        assert_eq!(c.version, 2);
        assert_eq!(c.warnings.len(), 1);
        assert!(matches!(c.warnings[0], PruneWarning::Remove { version: 1, .. }));

        assert_eq!(store.version(), 2);
        assert_eq!(list_versions(dir.path()).unwrap(), vec![1, 2]);
        let latest = Checkpoint::open(dir.path(), 2).unwrap();
        assert_eq!(latest.vocabulary().num_docs(), 2);
        assert_eq!(latest.matrix().len(), 2);
    }

    #[test]
    fn staging_named_file_is_left_alone() {
        let dir = tempdir().unwrap();
        let stray = dir.path().join(".staging-notes");
        fs::write(&stray, b"not ours").unwrap();
        fs::create_dir(StorePaths::new(dir.path()).staging_dir(4)).unwrap();

        let store = OnlineCorpus::open(CorpusConfig::new(dir.path())).unwrap();
        assert_eq!(store.version(), 0);
        assert!(stray.is_file());
        assert!(!StorePaths::new(dir.path()).staging_dir(4).exists());
    }
}

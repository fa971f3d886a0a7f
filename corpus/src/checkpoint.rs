//! Crash-safe checkpoint writer.
//!
//! A checkpoint is written in full to `.staging-corpus_<N>` beneath the store
//! root, every file is fsynced, and the staging directory is then renamed to
//! `corpus_<N>`. Readers only ever look at `corpus_<N>` names, so a version is
//! either absent or complete.

use crate::error::{CorpusError, Result};
use crate::matrix::{write_frame, MatrixFile};
use crate::persist::{save_vocabulary, sync_dir, StorePaths, MATRIX_FILE, MATRIX_MAGIC, VOCAB_FILE};
use crate::vocab::Vocabulary;
use crate::{DocVector, TermId, Version};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

pub struct CheckpointWriter {
    paths: StorePaths,
    current: Version,
    latest: Option<MatrixFile>,
}

impl CheckpointWriter {
    /// Resume writing after `current`, whose matrix file is `latest`.
    pub fn new(paths: StorePaths, current: Version, latest: Option<MatrixFile>) -> Self {
        Self { paths, current, latest }
    }

    pub fn version(&self) -> Version { self.current }
    pub fn latest(&self) -> Option<&MatrixFile> { self.latest.as_ref() }
    pub fn paths(&self) -> &StorePaths { &self.paths }

    /// Write and publish version `current + 1`. On error nothing is published
    /// and the writer's version is unchanged.
    pub fn checkpoint<'v, I>(&mut self, vocab: &Vocabulary, new_vectors: I) -> Result<Version>
    where
        I: IntoIterator<Item = &'v DocVector>,
    {
        let staged = self.stage(vocab, new_vectors)?;
        let (version, matrix) = staged.publish()?;
        self.current = version;
        self.latest = Some(matrix);
        Ok(version)
    }

    /// Write the next version into its staging directory without publishing it.
    pub fn stage<'v, I>(&self, vocab: &Vocabulary, new_vectors: I) -> Result<StagedCheckpoint>
    where
        I: IntoIterator<Item = &'v DocVector>,
    {
        let version = self.current + 1;
        let staging = self.paths.staging_dir(version);
        let mut staged = StagedCheckpoint {
            version,
            staging,
            target: self.paths.version_dir(version),
            root: self.paths.root.clone(),
            len: 0,
            max_term: None,
            published: false,
        };
        match self.write_staging(&mut staged, vocab, new_vectors) {
            Ok(()) => {
                tracing::debug!(version, documents = staged.len, "checkpoint staged");
                Ok(staged)
            }
            Err(source) => Err(CorpusError::CheckpointWriteFailed { version, source }),
        }
    }

    fn write_staging<'v, I>(&self, staged: &mut StagedCheckpoint, vocab: &Vocabulary, new_vectors: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'v DocVector>,
    {
        if staged.staging.exists() {
            tracing::warn!(path = %staged.staging.display(), "removing stale staging directory");
            fs::remove_dir_all(&staged.staging)?;
        }
        fs::create_dir(&staged.staging)?;
        save_vocabulary(&staged.staging.join(VOCAB_FILE), vocab)?;

        let matrix_path = staged.staging.join(MATRIX_FILE);
        let file = match &self.latest {
            Some(prev) => {
                fs::copy(prev.path(), &matrix_path)?;
                staged.len = prev.len();
                staged.max_term = prev.max_term();
                OpenOptions::new().append(true).open(&matrix_path)?
            }
            None => {
                let mut f = File::create(&matrix_path)?;
                f.write_all(&MATRIX_MAGIC)?;
                f
            }
        };
        let mut out = BufWriter::new(file);
        for vector in new_vectors {
            write_frame(&mut out, vector)?;
            staged.len += 1;
            if let Some(&(id, _)) = vector.last() {
                staged.max_term = Some(staged.max_term.map_or(id, |m: TermId| m.max(id)));
            }
        }
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        sync_dir(&staged.staging)
    }
}

/// A fully written checkpoint that is not yet visible to readers. Dropping it
/// without publishing removes the staging directory.
#[derive(Debug)]
pub struct StagedCheckpoint {
    version: Version,
    staging: PathBuf,
    target: PathBuf,
    root: PathBuf,
    len: u64,
    max_term: Option<TermId>,
    published: bool,
}

impl StagedCheckpoint {
    pub fn version(&self) -> Version { self.version }

    /// Atomically rename the staging directory to its version name.
    pub fn publish(mut self) -> Result<(Version, MatrixFile)> {
        let version = self.version;
        if self.target.exists() {
            return Err(CorpusError::CheckpointWriteFailed {
                version,
                source: io::Error::new(io::ErrorKind::AlreadyExists, format!("{} already exists", self.target.display())),
            });
        }
        fs::rename(&self.staging, &self.target).map_err(|source| CorpusError::CheckpointWriteFailed { version, source })?;
        self.published = true;
        if let Err(e) = sync_dir(&self.root) {
            tracing::warn!(version, error = %e, "could not sync store root after publish");
        }
        let matrix = MatrixFile::published(self.target.join(MATRIX_FILE), self.len, self.max_term);
        Ok((version, matrix))
    }
}

impl Drop for StagedCheckpoint {
    fn drop(&mut self) {
        if !self.published {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                tracing::warn!(version = self.version, error = %e, "could not remove unpublished staging directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{list_versions, load_vocabulary};
    use tempfile::tempdir;

    fn vocab_with(docs: &[&[&str]]) -> (Vocabulary, Vec<DocVector>) {
        let mut vocab = Vocabulary::new();
        let vectors = docs.iter().map(|d| vocab.add(d.iter())).collect();
        (vocab, vectors)
    }

    #[test]
    fn publishes_versions_in_sequence() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        let mut writer = CheckpointWriter::new(paths.clone(), 0, None);

        let (vocab, first) = vocab_with(&[&["hello", "world"]]);
        assert_eq!(writer.checkpoint(&vocab, &first).unwrap(), 1);
        let (vocab, second) = vocab_with(&[&["hello", "world"], &["hello"], &["world", "world"]]);
        assert_eq!(writer.checkpoint(&vocab, &second[1..]).unwrap(), 2);

        assert_eq!(list_versions(dir.path()).unwrap(), vec![1, 2]);
        assert_eq!(writer.latest().unwrap().len(), 3);
        let reread = MatrixFile::open(&paths.matrix(2)).unwrap();
        assert_eq!(&reread, writer.latest().unwrap());
        let all: Vec<DocVector> = reread.iter().unwrap().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(all, second);
        assert_eq!(MatrixFile::open(&paths.matrix(1)).unwrap().len(), 1);
        assert_eq!(load_vocabulary(&paths.vocabulary(2)).unwrap(), vocab);
    }

    #[test]
    fn unpublished_stage_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        let writer = CheckpointWriter::new(paths.clone(), 0, None);
        let (vocab, vectors) = vocab_with(&[&["a"]]);

        let staged = writer.stage(&vocab, &vectors).unwrap();
        assert_eq!(staged.version(), 1);
        assert!(paths.staging_dir(1).exists());
        assert!(list_versions(dir.path()).unwrap().is_empty());
        drop(staged);

        assert!(!paths.staging_dir(1).exists());
        assert!(!paths.version_dir(1).exists());
        assert_eq!(writer.version(), 0);
    }

    #[test]
    fn failed_publish_keeps_version() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        let mut writer = CheckpointWriter::new(paths.clone(), 0, None);
        let (vocab, vectors) = vocab_with(&[&["a"]]);
        fs::create_dir(paths.version_dir(1)).unwrap();

        let err = writer.checkpoint(&vocab, &vectors).unwrap_err();
        assert!(matches!(err, CorpusError::CheckpointWriteFailed { version: 1, .. }));
        assert_eq!(writer.version(), 0);
        assert!(writer.latest().is_none());
        assert!(!paths.staging_dir(1).exists());
    }

    #[test]
    fn unwritable_staging_fails_cleanly() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let mut writer = CheckpointWriter::new(StorePaths::new(&missing), 3, None);
        let (vocab, vectors) = vocab_with(&[&["a"]]);
        let err = writer.checkpoint(&vocab, &vectors).unwrap_err();
        assert!(matches!(err, CorpusError::CheckpointWriteFailed { version: 4, .. }));
        assert_eq!(writer.version(), 3);
    }
}

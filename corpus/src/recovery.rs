use crate::error::{CorpusError, Result};
use crate::matrix::{CorpusMatrix, MatrixFile};
use crate::persist::{list_versions, load_vocabulary, StorePaths};
use crate::vocab::Vocabulary;
use crate::Version;
use std::path::Path;

/// One published version, loaded read-only.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    version: Version,
    vocabulary: Vocabulary,
    matrix: MatrixFile,
}

impl Checkpoint {
    /// Load `version` from `root`. Point-in-time reads use this directly.
    pub fn open(root: &Path, version: Version) -> Result<Self> {
        let paths = StorePaths::new(root);
        if !paths.version_dir(version).is_dir() {
            return Err(CorpusError::VersionNotFound(version));
        }
        let vocabulary = load_vocabulary(&paths.vocabulary(version)).map_err(|e| e.corrupt(version))?;
        let matrix = MatrixFile::open(&paths.matrix(version)).map_err(|e| e.corrupt(version))?;

        if matrix.len() != vocabulary.num_docs() {
            return Err(CorpusError::CorruptCheckpoint {
                version,
                reason: format!("matrix holds {} documents, vocabulary counts {}", matrix.len(), vocabulary.num_docs()),
            });
        }
        if let Some(max) = matrix.max_term() {
            if max as usize >= vocabulary.len() {
                return Err(CorpusError::CorruptCheckpoint {
                    version,
                    reason: format!("matrix references term {max} but vocabulary has {} tokens", vocabulary.len()),
                });
            }
        }
        Ok(Self { version, vocabulary, matrix })
    }

    pub fn version(&self) -> Version { self.version }
    pub fn vocabulary(&self) -> &Vocabulary { &self.vocabulary }
    pub fn matrix(&self) -> CorpusMatrix<'_> { CorpusMatrix::new(Some(&self.matrix), &[]) }
    pub fn matrix_file(&self) -> &MatrixFile { &self.matrix }
}

/// State reconstructed at startup.
#[derive(Debug, Clone, Default)]
pub struct Recovered {
    pub version: Version,
    pub vocabulary: Vocabulary,
    pub matrix: Option<MatrixFile>,
}

impl Recovered {
    pub fn matrix(&self) -> CorpusMatrix<'_> { CorpusMatrix::new(self.matrix.as_ref(), &[]) }
}

impl From<Checkpoint> for Recovered {
    fn from(c: Checkpoint) -> Self {
        Self { version: c.version, vocabulary: c.vocabulary, matrix: Some(c.matrix) }
    }
}

/// Load the highest published version beneath `root`, or an empty state at
/// version 0. A corrupt latest version is an error; older versions are never
/// tried in its place.
pub fn recover(root: &Path) -> Result<Recovered> {
    let Some(&latest) = list_versions(root)?.last() else {
        tracing::info!(root = %root.display(), "no checkpoints found, starting empty");
        return Ok(Recovered::default());
    };
    let checkpoint = Checkpoint::open(root, latest)?;
    tracing::info!(
        version = latest,
        documents = checkpoint.matrix.len(),
        tokens = checkpoint.vocabulary.len(),
        "recovered checkpoint"
    );
    Ok(checkpoint.into())
}

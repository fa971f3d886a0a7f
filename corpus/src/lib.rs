//! Durable, incrementally growing vocabulary and document-term corpus.
//!
//! Every call to [`OnlineCorpus::add_documents`] vectorizes a batch of token
//! sequences against the vocabulary and checkpoints the result as a new,
//! immutable version directory beneath the store root. Old versions are pruned
//! once they fall outside the retention window.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod matrix;
pub mod persist;
pub mod recovery;
pub mod retention;
pub mod stats;
pub mod store;
pub mod tokenizer;
pub mod vocab;

pub type TermId = u32;
pub type Version = u64;

/// Sparse bag-of-words: `(term id, count)` pairs sorted by term id.
pub type DocVector = Vec<(TermId, u32)>;

pub use checkpoint::CheckpointWriter;
pub use config::CorpusConfig;
pub use error::{CorpusError, FormatError, PruneWarning, Result};
pub use matrix::{CorpusMatrix, MatrixFile, MatrixSegment};
pub use persist::{list_versions, StorePaths};
pub use recovery::{recover, Checkpoint, Recovered};
pub use retention::RetentionManager;
pub use stats::{CorpusStatistics, WordStatistics};
pub use store::{Commit, OnlineCorpus};
pub use vocab::{Vocabulary, VocabularySnapshot};

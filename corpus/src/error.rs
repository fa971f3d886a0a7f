use crate::Version;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CorpusError>;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Staging or publishing version `version` failed. Nothing was published.
    #[error("failed to write checkpoint for version {version}")]
    CheckpointWriteFailed {
        version: Version,
        #[source]
        source: io::Error,
    },

    #[error("checkpoint {version} is corrupt: {reason}")]
    CorruptCheckpoint { version: Version, reason: String },

    #[error("version {0} does not exist")]
    VersionNotFound(Version),

    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Decoding failures for vocabulary and matrix artifacts.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid magic bytes: expected {expected:?}, got {actual:?}")]
    BadMagic { expected: [u8; 4], actual: [u8; 4] },

    #[error("crc mismatch: stored={stored:#010x}, computed={computed:#010x}")]
    Checksum { stored: u32, computed: u32 },

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("decode failed: {0}")]
    Decode(#[from] bincode::Error),

    #[error("{0}")]
    Invalid(String),
}

impl FormatError {
    pub(crate) fn corrupt(self, version: Version) -> CorpusError {
        CorpusError::CorruptCheckpoint { version, reason: self.to_string() }
    }
}

/// Non-fatal failure while pruning old versions.
#[derive(Debug, Error)]
pub enum PruneWarning {
    #[error("could not list store root for pruning: {source}")]
    List {
        #[source]
        source: io::Error,
    },

    #[error("could not remove version {version}: {source}")]
    Remove {
        version: Version,
        #[source]
        source: io::Error,
    },
}

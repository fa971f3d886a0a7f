use crate::error::FormatError;
use crate::vocab::{Vocabulary, VocabularyRecord};
use crate::Version;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const VERSION_PREFIX: &str = "corpus_";
pub const STAGING_PREFIX: &str = ".staging-";
pub const VOCAB_FILE: &str = "vocab.bin";
pub const MATRIX_FILE: &str = "matrix.bin";

pub(crate) const VOCAB_MAGIC: [u8; 4] = *b"OCVB";
pub(crate) const MATRIX_MAGIC: [u8; 4] = *b"OCMX";

/// Naming convention for everything the store keeps beneath its root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn version_dir(&self, version: Version) -> PathBuf { self.root.join(format!("{VERSION_PREFIX}{version}")) }
    pub fn staging_dir(&self, version: Version) -> PathBuf { self.root.join(format!("{STAGING_PREFIX}{VERSION_PREFIX}{version}")) }
    pub fn vocabulary(&self, version: Version) -> PathBuf { self.version_dir(version).join(VOCAB_FILE) }
    pub fn matrix(&self, version: Version) -> PathBuf { self.version_dir(version).join(MATRIX_FILE) }
}

/// Parse `corpus_<N>` with N >= 1 written exactly as `version_dir` writes it:
/// ascii digits, no sign, no leading zero.
pub fn parse_version_dir(name: &str) -> Option<Version> {
    let digits = name.strip_prefix(VERSION_PREFIX)?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&v| v > 0)
}

/// Published versions beneath `root`, ascending. A missing root has no versions.
pub fn list_versions(root: &Path) -> io::Result<Vec<Version>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() { continue; }
        if let Some(v) = entry.file_name().to_str().and_then(parse_version_dir) {
            versions.push(v);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// Leftover staging directories from writers that never published.
pub fn list_staging(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() { continue; }
        if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            found.push(entry.path());
        }
    }
    Ok(found)
}

/// Write `magic | crc32 | bincode(vocabulary)` and fsync.
pub fn save_vocabulary(path: &Path, vocab: &Vocabulary) -> io::Result<()> {
    let payload = bincode::serialize(&vocab.to_record())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = File::create(path)?;
    f.write_all(&VOCAB_MAGIC)?;
    f.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    f.write_all(&payload)?;
    f.sync_all()?;
    Ok(())
}

pub fn load_vocabulary(path: &Path) -> Result<Vocabulary, FormatError> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    if buf.len() < 8 {
        return Err(FormatError::Truncated("vocabulary header"));
    }
    check_magic(&buf[..4], VOCAB_MAGIC)?;
    let stored = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let payload = &buf[8..];
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(FormatError::Checksum { stored, computed });
    }
    let record: VocabularyRecord = bincode::deserialize(payload)?;
    Vocabulary::from_record(record)
}

pub(crate) fn check_magic(bytes: &[u8], expected: [u8; 4]) -> Result<(), FormatError> {
    let mut actual = [0u8; 4];
    actual.copy_from_slice(&bytes[..4]);
    if actual != expected {
        return Err(FormatError::BadMagic { expected, actual });
    }
    Ok(())
}

/// fsync a directory so a rename inside it survives power loss.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

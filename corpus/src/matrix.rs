//! Document-term matrix storage.
//!
//! A matrix file is the 4-byte magic followed by one frame per document:
//! `len: u32 LE | crc32: u32 LE | bincode(Vec<(u32, u32)>)`. Frames are
//! self-delimiting, so the file for version N+1 is the file for version N with
//! the new batch's frames appended.

use crate::error::FormatError;
use crate::persist::{check_magic, MATRIX_MAGIC};
use crate::{DocVector, TermId};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

pub(crate) fn write_frame<W: Write>(w: &mut W, vector: &DocVector) -> io::Result<()> {
    let payload = bincode::serialize(vector).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "document vector too large"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    w.write_all(&payload)
}

/// Vectors produced since the last durable checkpoint, in ingestion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixSegment {
    vectors: Vec<DocVector>,
}

impl MatrixSegment {
    pub fn new() -> Self { Self::default() }
    pub fn append(&mut self, vector: DocVector) { self.vectors.push(vector); }
    pub fn extend(&mut self, other: MatrixSegment) { self.vectors.extend(other.vectors); }
    pub fn clear(&mut self) { self.vectors.clear(); }
    pub fn len(&self) -> usize { self.vectors.len() }
    pub fn is_empty(&self) -> bool { self.vectors.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, DocVector> { self.vectors.iter() }
    pub fn as_slice(&self) -> &[DocVector] { &self.vectors }
}

/// Streaming reader over the frames of one matrix file.
pub struct MatrixReader {
    reader: BufReader<File>,
    remaining: u64,
    done: bool,
}

impl MatrixReader {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(truncated("matrix header"))?;
        check_magic(&magic, MATRIX_MAGIC)?;
        Ok(Self { reader, remaining: size.saturating_sub(4), done: false })
    }

    fn read_header(&mut self) -> Result<Option<[u8; 8]>, FormatError> {
        let mut header = [0u8; 8];
        let mut filled = 0;
        while filled < header.len() {
            match self.reader.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            8 => Ok(Some(header)),
            _ => Err(FormatError::Truncated("matrix frame header")),
        }
    }

    fn read_frame(&mut self) -> Result<Option<DocVector>, FormatError> {
        let Some(header) = self.read_header()? else { return Ok(None) };
        self.remaining = self.remaining.saturating_sub(8);
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let stored = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if u64::from(len) > self.remaining {
            return Err(FormatError::Truncated("matrix frame"));
        }
        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload).map_err(truncated("matrix frame"))?;
        self.remaining -= u64::from(len);
        let computed = crc32fast::hash(&payload);
        if stored != computed {
            return Err(FormatError::Checksum { stored, computed });
        }
        Ok(Some(bincode::deserialize(&payload)?))
    }
}

impl Iterator for MatrixReader {
    type Item = Result<DocVector, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done { return None; }
        match self.read_frame() {
            Ok(Some(vector)) => Some(Ok(vector)),
            Ok(None) => { self.done = true; None }
            Err(e) => { self.done = true; Some(Err(e)) }
        }
    }
}

fn truncated(what: &'static str) -> impl Fn(io::Error) -> FormatError {
    move |e| match e.kind() {
        io::ErrorKind::UnexpectedEof => FormatError::Truncated(what),
        _ => FormatError::Io(e),
    }
}

/// A published, validated matrix file. Iteration re-opens the file, so it can
/// be repeated any number of times without holding the matrix in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixFile {
    path: PathBuf,
    len: u64,
    max_term: Option<TermId>,
}

impl MatrixFile {
    /// Open and verify every frame of the file.
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let mut len = 0u64;
        let mut max_term: Option<TermId> = None;
        for vector in MatrixReader::open(path)? {
            let vector = vector?;
            if let Some(&(id, _)) = vector.last() {
                max_term = Some(max_term.map_or(id, |m| m.max(id)));
            }
            len += 1;
        }
        Ok(Self { path: path.to_path_buf(), len, max_term })
    }

    pub(crate) fn published(path: PathBuf, len: u64, max_term: Option<TermId>) -> Self {
        Self { path, len, max_term }
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn len(&self) -> u64 { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn max_term(&self) -> Option<TermId> { self.max_term }
    pub fn iter(&self) -> Result<MatrixReader, FormatError> { MatrixReader::open(&self.path) }
}

/// The full corpus as seen by a reader: the latest published matrix file
/// followed by any vectors not yet checkpointed.
#[derive(Debug, Clone, Copy)]
pub struct CorpusMatrix<'a> {
    base: Option<&'a MatrixFile>,
    pending: &'a [DocVector],
}

impl<'a> CorpusMatrix<'a> {
    pub fn new(base: Option<&'a MatrixFile>, pending: &'a [DocVector]) -> Self { Self { base, pending } }

    pub fn len(&self) -> u64 { self.base.map_or(0, MatrixFile::len) + self.pending.len() as u64 }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Iterate every document in ingestion order. Restartable: each call starts over.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<DocVector, FormatError>> + 'a, FormatError> {
        let base = match self.base {
            Some(file) => Some(file.iter()?),
            None => None,
        };
        Ok(base.into_iter().flatten().chain(self.pending.iter().cloned().map(Ok)))
    }

    /// Load the whole matrix into memory.
    pub fn to_vec(&self) -> Result<Vec<DocVector>, FormatError> { self.iter()?.collect() }
}

//! Sequential decoder for `.gtemodel` artifacts.
//!
//! Mirrors [`ArtifactWriter`](crate::writer::ArtifactWriter): header, then
//! vocabulary, then tensors in layout order. Tensor shapes come from the
//! plan, never from the file.

use crate::config::ModelConfig;
use crate::format::MAGIC;
use crate::layout::{LayoutError, PlannedTensor};
use std::io::{self, Read};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Bad magic {0:?}, expected GTE1")]
    BadMagic([u8; 4]),

    #[error("Artifact truncated while reading {0}")]
    Truncated(String),

    #[error("Token {index} is not valid UTF-8")]
    InvalidToken { index: usize },

    #[error("Artifact has trailing bytes after the last tensor")]
    TrailingBytes,

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ReadError>;

/// Upper bound on up-front vocabulary allocation. Header values are untrusted,
/// so larger tables grow as tokens actually arrive.
const MAX_PREALLOC_TOKENS: usize = 1 << 16;

/// Elements decoded per read when streaming a tensor.
const READ_CHUNK_ELEMS: usize = 4096;

pub struct ArtifactReader<R: Read> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> ArtifactReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn take(&mut self, buf: &mut [u8], what: impl FnOnce() -> String) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.bytes_read += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(ReadError::Truncated(what()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the magic and hyperparameters.
    pub fn read_header(&mut self) -> Result<ModelConfig> {
        let mut magic = [0u8; 4];
        self.take(&mut magic, || "magic".to_string())?;
        if magic != MAGIC {
            return Err(ReadError::BadMagic(magic));
        }

        let mut fields = [0u32; 6];
        for field in fields.iter_mut() {
            let mut word = [0u8; 4];
            self.take(&mut word, || "header".to_string())?;
            *field = u32::from_le_bytes(word);
        }
        Ok(ModelConfig::from_header_fields(fields))
    }

    /// Read `config.vocab_size` length-prefixed tokens.
    pub fn read_vocabulary(&mut self, config: &ModelConfig) -> Result<Vec<String>> {
        let count = config.vocab_size as usize;
        let mut vocab = Vec::with_capacity(count.min(MAX_PREALLOC_TOKENS));
        for index in 0..count {
            let mut len = [0u8; 2];
            self.take(&mut len, || format!("length of token {index}"))?;

            let mut bytes = vec![0u8; u16::from_le_bytes(len) as usize];
            self.take(&mut bytes, || format!("token {index}"))?;

            let token =
                String::from_utf8(bytes).map_err(|_| ReadError::InvalidToken { index })?;
            vocab.push(token);
        }
        Ok(vocab)
    }

    /// Stream the next tensor's bytes through `f` in bounded chunks.
    fn read_chunks(&mut self, planned: &PlannedTensor, mut f: impl FnMut(&[u8])) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK_ELEMS * 4];
        let mut remaining = planned.element_count()?;
        while remaining > 0 {
            let elems = remaining.min(READ_CHUNK_ELEMS);
            let chunk = &mut buf[..elems * 4];
            self.take(chunk, || planned.name.clone())?;
            f(chunk);
            remaining -= elems;
        }
        Ok(())
    }

    /// Read the elements of the next tensor in the plan.
    ///
    /// Memory grows with the bytes actually present, so a header that
    /// promises more than the file holds fails with `Truncated`.
    pub fn read_tensor(&mut self, planned: &PlannedTensor) -> Result<Vec<f32>> {
        let mut data = Vec::with_capacity(planned.element_count()?.min(READ_CHUNK_ELEMS));
        self.read_chunks(planned, |chunk| {
            data.extend(
                chunk
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        })?;
        Ok(data)
    }

    /// Consume the next tensor without keeping its elements.
    pub fn skip_tensor(&mut self, planned: &PlannedTensor) -> Result<()> {
        self.read_chunks(planned, |_| {})
    }

    /// Confirm nothing follows the last tensor.
    pub fn finish(mut self) -> Result<u64> {
        let mut next = [0u8; 1];
        loop {
            match self.inner.read(&mut next) {
                Ok(0) => return Ok(self.bytes_read),
                Ok(_) => return Err(ReadError::TrailingBytes),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

//! Append-only encoder for `.gtemodel` artifacts.

use crate::config::ModelConfig;
use crate::format::{MAGIC, MAX_TOKEN_BYTES};
use crate::layout::PlannedTensor;
use crate::tensor::TensorHandle;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Token {index} is {len} bytes, over the {max}-byte limit of the length prefix")]
    TokenTooLong { index: usize, len: usize, max: usize },

    #[error("Tensor {name} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Expected tensor {expected}, got {actual}")]
    UnexpectedTensor { expected: String, actual: String },

    #[error("Cannot write {section} while at {stage:?}")]
    OutOfOrder {
        section: &'static str,
        stage: Stage,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, WriteError>;

/// Elements encoded per `write_all` when appending a tensor.
const TENSOR_CHUNK: usize = 1024;

/// Check that every token fits the u16 length prefix.
pub fn check_vocabulary(vocab: &[String]) -> Result<()> {
    match vocab
        .iter()
        .enumerate()
        .find(|(_, token)| token.len() > MAX_TOKEN_BYTES)
    {
        Some((index, token)) => Err(WriteError::TokenTooLong {
            index,
            len: token.len(),
            max: MAX_TOKEN_BYTES,
        }),
        None => Ok(()),
    }
}

/// Which section the writer accepts next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Header,
    Vocabulary,
    Tensors,
}

/// Streams an artifact into `W`: header, then vocabulary, then tensors.
///
/// Sections must be written in that order; anything else is rejected with
/// [`WriteError::OutOfOrder`]. Nothing is buffered beyond what `W` buffers,
/// and nothing already written is revisited.
pub struct ArtifactWriter<W: Write> {
    inner: W,
    stage: Stage,
    bytes_written: u64,
    tensors_written: usize,
}

impl<W: Write> ArtifactWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            stage: Stage::Header,
            bytes_written: 0,
            tensors_written: 0,
        }
    }

    /// Bytes appended so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Tensors appended so far.
    pub fn tensors_written(&self) -> usize {
        self.tensors_written
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn expect_stage(&self, stage: Stage, section: &'static str) -> Result<()> {
        if self.stage != stage {
            return Err(WriteError::OutOfOrder {
                section,
                stage: self.stage,
            });
        }
        Ok(())
    }

    /// Write the magic and the six hyperparameters.
    pub fn write_header(&mut self, config: &ModelConfig) -> Result<()> {
        self.expect_stage(Stage::Header, "header")?;
        self.put(&MAGIC)?;
        for value in config.header_fields() {
            self.put(&value.to_le_bytes())?;
        }
        self.stage = Stage::Vocabulary;
        Ok(())
    }

    /// Write every token as a u16 byte length followed by its UTF-8 bytes.
    ///
    /// All lengths are checked before the first byte goes out, so an
    /// oversized token never leaves half a table behind.
    pub fn write_vocabulary(&mut self, vocab: &[String]) -> Result<()> {
        self.expect_stage(Stage::Vocabulary, "vocabulary")?;
        check_vocabulary(vocab)?;

        for token in vocab {
            let len = token.len() as u16;
            self.put(&len.to_le_bytes())?;
            self.put(token.as_bytes())?;
        }
        self.stage = Stage::Tensors;
        Ok(())
    }

    /// Append one tensor's elements as little-endian f32.
    ///
    /// The fetched tensor must carry the planned name and shape; only the raw
    /// elements reach the artifact.
    pub fn write_tensor(&mut self, planned: &PlannedTensor, tensor: &TensorHandle) -> Result<()> {
        self.expect_stage(Stage::Tensors, "tensor")?;

        if tensor.name != planned.name {
            return Err(WriteError::UnexpectedTensor {
                expected: planned.name.clone(),
                actual: tensor.name.clone(),
            });
        }
        if tensor.shape != planned.shape {
            return Err(WriteError::ShapeMismatch {
                name: planned.name.clone(),
                expected: planned.shape.clone(),
                actual: tensor.shape.clone(),
            });
        }

        let mut buf = [0u8; TENSOR_CHUNK * 4];
        for chunk in tensor.data.chunks(TENSOR_CHUNK) {
            let bytes = &mut buf[..chunk.len() * 4];
            for (out, value) in bytes.chunks_exact_mut(4).zip(chunk) {
                out.copy_from_slice(&value.to_le_bytes());
            }
            self.put(bytes)?;
        }
        self.tensors_written += 1;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

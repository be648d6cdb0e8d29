use crate::config::ConfigError;
use crate::layout::LayoutError;
use crate::reader::ReadError;
use crate::tensor::TensorError;
use crate::vocab::VocabularyError;
use crate::writer::WriteError;
use thiserror::Error;

/// Any failure of a conversion. Every variant is fatal.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Verification failed: {0}")]
    Verify(#[from] ReadError),

    #[error("Failed to create {path}: {source}")]
    CreateOutput {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConvertError>;

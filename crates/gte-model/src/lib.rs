//! gte-model: Packs transformer-encoder weights into the `.gtemodel` format.
//!
//! This crate provides:
//! - Reading model hyperparameters and vocabulary
//! - The fixed tensor layout shared with `.gtemodel` readers
//! - A streaming artifact writer and a matching reader
//! - The conversion pipeline over a pluggable `TensorSource`

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod layout;
pub mod reader;
pub mod tensor;
pub mod vocab;
pub mod writer;

pub use config::{ConfigError, ModelConfig};
pub use convert::{ArtifactSummary, ConversionReport, convert, convert_with_source, verify_artifact};
pub use error::ConvertError;
pub use layout::{LayoutError, PlannedTensor, Section, expected_artifact_size, plan, plan_tensors};
pub use reader::{ArtifactReader, ReadError};
pub use tensor::{InMemoryTensorSource, SafetensorsSource, TensorError, TensorHandle, TensorSource};
pub use vocab::{VocabularyError, load_vocab};
pub use writer::{ArtifactWriter, WriteError, check_vocabulary};

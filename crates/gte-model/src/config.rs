//! Model hyperparameters read from a Hugging Face `config.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The six hyperparameters recorded in the artifact header.
///
/// Field order matches the header order. The serde names are the upstream
/// config names, so an unmodified `config.json` deserializes directly; any
/// other keys in the file are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: u32,
    pub hidden_size: u32,
    #[serde(rename = "num_hidden_layers")]
    pub num_layers: u32,
    #[serde(rename = "num_attention_heads")]
    pub num_heads: u32,
    pub intermediate_size: u32,
    #[serde(rename = "max_position_embeddings")]
    pub max_seq_length: u32,
}

impl ModelConfig {
    /// Parse a config from JSON text. All six fields are mandatory.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse `config.json` from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Header values in wire order.
    pub fn header_fields(&self) -> [u32; 6] {
        [
            self.vocab_size,
            self.hidden_size,
            self.num_layers,
            self.num_heads,
            self.intermediate_size,
            self.max_seq_length,
        ]
    }

    /// Inverse of [`header_fields`](Self::header_fields).
    pub fn from_header_fields(fields: [u32; 6]) -> Self {
        let [
            vocab_size,
            hidden_size,
            num_layers,
            num_heads,
            intermediate_size,
            max_seq_length,
        ] = fields;
        Self {
            vocab_size,
            hidden_size,
            num_layers,
            num_heads,
            intermediate_size,
            max_seq_length,
        }
    }

    /// Whether attention heads split the hidden size evenly.
    ///
    /// Runtimes need this to slice Q/K/V per head. The converter only warns
    /// about it.
    pub fn heads_divide_hidden(&self) -> bool {
        self.num_heads != 0 && self.hidden_size % self.num_heads == 0
    }
}

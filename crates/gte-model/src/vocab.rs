//! Vocabulary loading from a newline-delimited `vocab.txt`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("Failed to read vocabulary {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Vocabulary line {line} is not valid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("Vocab size mismatch: {actual} entries loaded, config expects {expected}")]
    CountMismatch { expected: u32, actual: usize },
}

/// Load tokens in file order; line index is the token id.
///
/// Only the `\n` terminator is removed. Token text keeps everything else,
/// including a `\r` left by CRLF files, and blank lines are kept as empty
/// tokens. A final line without a terminator is still a token.
pub fn load_vocab(path: &Path) -> Result<Vec<String>, VocabularyError> {
    let io_err = |source| VocabularyError::Io {
        path: path.display().to_string(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    BufReader::new(file)
        .split(b'\n')
        .enumerate()
        .map(|(line, bytes)| {
            let bytes = bytes.map_err(io_err)?;
            String::from_utf8(bytes).map_err(|_| VocabularyError::InvalidUtf8 { line })
        })
        .collect()
}

/// Check the loaded vocabulary against `vocab_size` from the config.
pub fn check_vocab_size(vocab: &[String], expected: u32) -> Result<(), VocabularyError> {
    if vocab.len() != expected as usize {
        return Err(VocabularyError::CountMismatch {
            expected,
            actual: vocab.len(),
        });
    }
    Ok(())
}

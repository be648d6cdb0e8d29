//! Wire constants of the `.gtemodel` format.
//!
//! ```text
//! offset  field               type
//! 0       magic               b"GTE1"
//! 4       vocab_size          u32 LE
//! 8       hidden_size         u32 LE
//! 12      num_layers          u32 LE
//! 16      num_heads           u32 LE
//! 20      intermediate_size   u32 LE
//! 24      max_seq_length      u32 LE
//! 28      vocabulary          vocab_size x (u16 LE length, UTF-8 bytes)
//! ...     tensors             f32 LE, layout order, no per-tensor metadata
//! ```
//!
//! There is no checksum and no end marker.

/// Magic bytes; also the format version.
pub const MAGIC: [u8; 4] = *b"GTE1";

/// Magic plus six u32 hyperparameters.
pub const HEADER_LEN: usize = MAGIC.len() + 6 * 4;

/// Width of the per-token length prefix.
pub const VOCAB_LEN_PREFIX: usize = 2;

/// Longest token the u16 length prefix can describe.
pub const MAX_TOKEN_BYTES: usize = u16::MAX as usize;

/// Conventional file extension.
pub const EXTENSION: &str = "gtemodel";

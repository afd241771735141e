// src/error.rs
// Library-level error taxonomy. The CLI binary wraps these in anyhow::Context
// at the I/O boundary rather than matching on variants directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcgTrieError {
    #[error("sequence of {len} bases exceeds the 31-base up2bit limit")]
    SequenceTooLong { len: usize },

    #[error("row store cannot grow past capacity (attempted row {attempted})")]
    CapacityExceeded { attempted: u64 },

    #[error("invalid base byte {byte:#04x} at position {position}, expected one of A/C/G/T")]
    InvalidBase { byte: u8, position: usize },

    #[error("corrupt trie file: {reason}")]
    CorruptFile { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

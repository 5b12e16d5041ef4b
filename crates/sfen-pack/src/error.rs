//! Error types for record encoding / decoding

use shakmaty::Color;

/// Codec-specific errors
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// King not found for a specific color
    #[error("King not found for {0:?}")]
    KingNotFound(Color),

    /// The position needs more than 256 bits
    #[error("Position does not fit into 256 bits ({0} bits needed)")]
    BitOverflow(usize),

    /// The decoded setup is not a legal chess position
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// move16 does not match any legal move of the position
    #[error("Move16 0x{0:04x} is not legal in the position")]
    IllegalMove(u16),

    /// Record is shorter than the fixed record size
    #[error("Truncated record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Malformed plain-text record
    #[error("Line {line}: {message}")]
    Plain { line: usize, message: String },

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

//! Error types for the compression codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HuffmanError {
    /// A container or table section ended early.
    #[error("truncated {section}: need {needed} bytes, have {available}")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    /// The two bytes after the table block are not the delimiter.
    #[error("delimiter not found after table block (found {found:02x?})")]
    MissingDelimiter { found: [u8; 2] },

    #[error("symbol {symbol:#04x} appears twice in the code table")]
    DuplicateSymbol { symbol: u8 },

    #[error("codeword {code} is assigned to more than one symbol")]
    DuplicateCode { code: String },

    #[error("code length {len} outside 1..={max}")]
    InvalidCodeLength { len: usize, max: u8 },

    /// The table block has bytes left over after its last record.
    #[error("{0} unexpected bytes after the code table")]
    TrailingTableBytes(usize),

    /// The input contains a symbol the table has no codeword for.
    #[error("no codeword for symbol {0:#04x}")]
    UnknownSymbol(u8),

    /// Accumulated bits grew longer than any codeword without a match.
    #[error("invalid code at bit position {position}")]
    InvalidCode { position: usize },

    /// The bitstream ran out before the recorded number of symbols.
    #[error("bitstream exhausted after {decoded} of {expected} symbols")]
    UnexpectedEnd { decoded: u64, expected: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HuffmanError>;

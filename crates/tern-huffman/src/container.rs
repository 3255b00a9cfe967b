//! Container framing for compressed files.
//!
//! ```text
//! +---------------------+
//! | table_len (4)       |  u32 BE, bytes in the table block
//! +---------------------+
//! | table block         |  see `table`
//! +---------------------+
//! | delimiter (2)       |  0x7F 0xFE
//! +---------------------+
//! | symbol_count (8)    |  u64 BE, symbols encoded in the payload
//! +---------------------+
//! | packed bits         |  LSB-first, zero padded
//! +---------------------+
//! ```
//!
//! The delimiter sits at the offset given by `table_len` and is checked
//! there, never searched for, so either block may contain the same bytes.

use crate::error::{HuffmanError, Result};

pub const DELIMITER: [u8; 2] = [0x7F, 0xFE];

/// Bytes of framing around the two blocks.
pub const FRAMING_OVERHEAD: usize = 4 + DELIMITER.len() + 8;

/// Borrowed view of a container's sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections<'a> {
    pub table: &'a [u8],
    pub symbol_count: u64,
    pub payload: &'a [u8],
}

/// Assemble a container from its parts.
pub fn frame(table: &[u8], symbol_count: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAMING_OVERHEAD + table.len() + payload.len());
    out.extend_from_slice(&(table.len() as u32).to_be_bytes());
    out.extend_from_slice(table);
    out.extend_from_slice(&DELIMITER);
    out.extend_from_slice(&symbol_count.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split a container into its table block and payload.
pub fn split(data: &[u8]) -> Result<Sections<'_>> {
    let table_len = u32::from_be_bytes(field(data, 0, "table length")?) as usize;
    let table_end = 4 + table_len;
    let table = data.get(4..table_end).ok_or(HuffmanError::Truncated {
        section: "table block",
        needed: table_end,
        available: data.len(),
    })?;

    let found: [u8; 2] = field(data, table_end, "delimiter")?;
    if found != DELIMITER {
        return Err(HuffmanError::MissingDelimiter { found });
    }

    let count_at = table_end + DELIMITER.len();
    let symbol_count = u64::from_be_bytes(field(data, count_at, "symbol count")?);

    Ok(Sections {
        table,
        symbol_count,
        payload: &data[count_at + 8..],
    })
}

fn field<const N: usize>(data: &[u8], at: usize, section: &'static str) -> Result<[u8; N]> {
    let bytes = data.get(at..at + N).ok_or(HuffmanError::Truncated {
        section,
        needed: at + N,
        available: data.len(),
    })?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

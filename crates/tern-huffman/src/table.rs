//! Code table serialization and the codeword lookup used for decoding.
//!
//! ```text
//! count u16 BE
//! count × ( key u8 · len u8 · codeword, MSB-first, ceil(len/8) bytes )
//! ```

use std::collections::HashMap;

use crate::code::{CodeTable, Codeword, MAX_CODE_LEN};
use crate::error::{HuffmanError, Result};

fn code_bytes(len: u8) -> usize {
    (len as usize).div_ceil(8)
}

/// Serialize `table` into a table block.
pub fn write_table(table: &CodeTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + table.len() * 4);
    out.extend_from_slice(&(table.len() as u16).to_be_bytes());

    for &(symbol, code) in table.entries() {
        out.push(symbol);
        out.push(code.len);
        let n = code_bytes(code.len);
        // left-align the codeword in n bytes
        let aligned = code.bits << (n * 8 - code.len as usize);
        out.extend_from_slice(&aligned.to_be_bytes()[16 - n..]);
    }
    out
}

/// Parse a table block. The whole slice must be consumed.
pub fn read_table(block: &[u8]) -> Result<CodeTable> {
    let mut pos = 0usize;
    let count = u16::from_be_bytes(take::<2>(block, &mut pos)?) as usize;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let [symbol, len] = take::<2>(block, &mut pos)?;
        if len == 0 || len > MAX_CODE_LEN {
            return Err(HuffmanError::InvalidCodeLength {
                len: len as usize,
                max: MAX_CODE_LEN,
            });
        }

        let n = code_bytes(len);
        let raw = take_slice(block, &mut pos, n)?;
        let mut buf = [0u8; 16];
        buf[16 - n..].copy_from_slice(raw);
        let bits = u128::from_be_bytes(buf) >> (n * 8 - len as usize);
        entries.push((symbol, Codeword::new(bits, len)));
    }

    if pos != block.len() {
        return Err(HuffmanError::TrailingTableBytes(block.len() - pos));
    }
    CodeTable::from_entries(entries)
}

fn take_slice<'a>(block: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = *pos + n;
    let slice = block.get(*pos..end).ok_or(HuffmanError::Truncated {
        section: "code table",
        needed: end,
        available: block.len(),
    })?;
    *pos = end;
    Ok(slice)
}

fn take<const N: usize>(block: &[u8], pos: &mut usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take_slice(block, pos, N)?);
    Ok(out)
}

/// Reverse map from codeword to symbol.
#[derive(Debug, Clone)]
pub struct CodeLookup {
    symbols: HashMap<Codeword, u8>,
    max_len: u8,
}

impl CodeLookup {
    pub fn new(table: &CodeTable) -> Result<Self> {
        let mut symbols = HashMap::with_capacity(table.len());
        for &(symbol, code) in table.entries() {
            if symbols.insert(code, symbol).is_some() {
                return Err(HuffmanError::DuplicateCode {
                    code: code.to_string(),
                });
            }
        }
        Ok(Self {
            symbols,
            max_len: table.max_len(),
        })
    }

    pub fn symbol(&self, code: &Codeword) -> Option<u8> {
        self.symbols.get(code).copied()
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }
}

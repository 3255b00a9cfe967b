//! tern-huffman: canonical Huffman compression for transfer payloads.
//!
//! - `code`: byte frequencies, code lengths, canonical codewords
//! - `bitio`: LSB-first bit packing
//! - `table`: code table serialization
//! - `container`: the on-disk container wrapping table and payload
//!
//! The decoder never recomputes the code from content; it reads the table
//! block back from the container.

pub mod bitio;
pub mod code;
pub mod container;
pub mod error;
pub mod table;

use std::fs;
use std::path::Path;

use tracing::debug;

pub use code::{CodeTable, Codeword, count_frequencies};
pub use error::{HuffmanError, Result};

use bitio::{BitReader, BitWriter};
use table::CodeLookup;

/// Output of [`encode`]: the code table and the packed bitstream.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub table: CodeTable,
    /// Number of symbols packed into `bitstream`.
    pub symbol_count: u64,
    pub bitstream: Vec<u8>,
}

impl Encoded {
    /// Frame as a container: table block, delimiter, symbol count, payload.
    pub fn to_container(&self) -> Vec<u8> {
        container::frame(&table::write_table(&self.table), self.symbol_count, &self.bitstream)
    }
}

/// Build a code for `data` and pack it.
pub fn encode(data: &[u8]) -> Result<Encoded> {
    let table = CodeTable::from_frequencies(&count_frequencies(data))?;
    let bitstream = pack(&table, data)?;
    Ok(Encoded {
        table,
        symbol_count: data.len() as u64,
        bitstream,
    })
}

/// Pack `data` with an existing table.
pub fn pack(table: &CodeTable, data: &[u8]) -> Result<Vec<u8>> {
    let mut writer = BitWriter::with_capacity(data.len() / 2);
    for &b in data {
        let code = table.code(b).ok_or(HuffmanError::UnknownSymbol(b))?;
        writer.write_bits(code.bits, code.len);
    }
    Ok(writer.finish())
}

/// Expand `symbol_count` symbols from a packed bitstream.
pub fn unpack(table: &CodeTable, symbol_count: u64, bitstream: &[u8]) -> Result<Vec<u8>> {
    let lookup = CodeLookup::new(table)?;
    let mut reader = BitReader::new(bitstream);
    let mut out = Vec::with_capacity(symbol_count.min(bitstream.len() as u64 * 8) as usize);

    let mut decoded = 0u64;
    let mut acc = Codeword::new(0, 0);
    while decoded < symbol_count {
        let Some(bit) = reader.read_bit() else {
            return Err(HuffmanError::UnexpectedEnd {
                decoded,
                expected: symbol_count,
            });
        };
        acc = Codeword::new((acc.bits << 1) | bit as u128, acc.len + 1);

        if let Some(symbol) = lookup.symbol(&acc) {
            out.push(symbol);
            decoded += 1;
            acc = Codeword::new(0, 0);
        } else if acc.len >= lookup.max_len() {
            return Err(HuffmanError::InvalidCode {
                position: reader.position(),
            });
        }
    }
    Ok(out)
}

/// Decode a container produced by [`compress`] / [`Encoded::to_container`].
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let sections = container::split(data)?;
    let table = table::read_table(sections.table)?;
    unpack(&table, sections.symbol_count, sections.payload)
}

/// Encode `data` straight to container bytes.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Ok(encode(data)?.to_container())
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decode(data)
}

/// Compress the file at `src` into a container at `dst`.
pub fn compress_file(src: &Path, dst: &Path) -> Result<u64> {
    let input = fs::read(src)?;
    let encoded = encode(&input)?;
    let container = encoded.to_container();
    fs::write(dst, &container)?;
    debug!(
        src = %src.display(),
        symbols = encoded.table.len(),
        raw = input.len(),
        compressed = container.len(),
        "compressed file"
    );
    Ok(container.len() as u64)
}

/// Decompress the container at `src` into `dst`.
pub fn decompress_file(src: &Path, dst: &Path) -> Result<u64> {
    let output = decode(&fs::read(src)?)?;
    fs::write(dst, &output)?;
    debug!(dst = %dst.display(), bytes = output.len(), "decompressed file");
    Ok(output.len() as u64)
}

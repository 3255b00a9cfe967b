//! Bit-level packing for the encoded payload.
//!
//! Bits fill each output byte starting at its least significant bit. A
//! codeword is emitted in its natural order, first bit of the codeword first.
//!
//! # Padding Rules
//! - BitWriter: the final partial byte is flushed with its high bits zero
//! - BitReader: cannot tell padding from data; callers stop at a known symbol count

/// Writes bits LSB-first into a byte buffer.
///
/// # Invariants
/// - `bit_count` is always < 8
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_buffer: u8,
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.bit_buffer |= 1 << self.bit_count;
        }
        self.bit_count += 1;

        if self.bit_count == 8 {
            self.bytes.push(self.bit_buffer);
            self.bit_buffer = 0;
            self.bit_count = 0;
        }
    }

    /// Write the low `count` bits of `value`, most significant of them first.
    pub fn write_bits(&mut self, value: u128, count: u8) {
        for shift in (0..count).rev() {
            self.write_bit((value >> shift) & 1 == 1);
        }
    }

    /// Flush any partial byte and return the output.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.bytes.push(self.bit_buffer);
        }
        self.bytes
    }

    /// Total bits written, including the partial byte.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }
}

/// Reads bits LSB-first from a byte buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Bit 0 is the least significant bit of the first byte.
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Next bit, or `None` once the buffer is exhausted.
    pub fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get(self.bit_position / 8)?;
        let bit = (byte >> (self.bit_position % 8)) & 1 == 1;
        self.bit_position += 1;
        Some(bit)
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_position
    }

    pub fn position(&self) -> usize {
        self.bit_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_fill_from_the_low_end() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bit(true);
        assert_eq!(writer.finish(), vec![0b0000_0101]);
    }

    #[test]
    fn codeword_is_written_first_bit_first() {
        let mut writer = BitWriter::new();
        // codeword "110"
        writer.write_bits(0b110, 3);
        assert_eq!(writer.finish(), vec![0b0000_0011]);
    }

    #[test]
    fn full_byte_flushes_immediately() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xFF, 8);
        assert_eq!(writer.bit_len(), 8);
        writer.write_bit(true);
        assert_eq!(writer.finish(), vec![0xFF, 0x01]);
    }

    #[test]
    fn reader_follows_writer_order() {
        let pattern = [true, false, false, true, true, true, false, true, false, true];
        let mut writer = BitWriter::new();
        for &bit in &pattern {
            writer.write_bit(bit);
        }
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 2);

        let mut reader = BitReader::new(&bytes);
        for &bit in &pattern {
            assert_eq!(reader.read_bit(), Some(bit));
        }
        // padding is readable but zero
        assert_eq!(reader.bits_remaining(), 6);
        assert_eq!(reader.read_bit(), Some(false));
    }

    #[test]
    fn reader_stops_at_end() {
        let mut reader = BitReader::new(&[0x80]);
        for _ in 0..7 {
            assert_eq!(reader.read_bit(), Some(false));
        }
        assert_eq!(reader.read_bit(), Some(true));
        assert_eq!(reader.read_bit(), None);
        assert_eq!(reader.position(), 8);
    }
}

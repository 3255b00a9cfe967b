//! Canonical prefix codes built from byte frequencies.

use std::fmt;

use crate::error::{HuffmanError, Result};

/// Longest codeword the table format and the decoder accept.
pub const MAX_CODE_LEN: u8 = 128;

/// A variable-length codeword: the low `len` bits of `bits`, first bit most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Codeword {
    pub bits: u128,
    pub len: u8,
}

impl Codeword {
    pub fn new(bits: u128, len: u8) -> Self {
        Self { bits, len }
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Codeword) -> bool {
        self.len <= other.len && other.bits >> (other.len - self.len) == self.bits
    }
}

impl fmt::Display for Codeword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$b}", self.bits, width = self.len as usize)
    }
}

/// Occurrences of every byte value in `data`.
pub fn count_frequencies(data: &[u8]) -> [u64; 256] {
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    freq
}

/// Replace weights sorted in ascending order with their optimal code lengths.
///
/// In-place minimum-redundancy construction (Moffat & Katajainen): the first
/// pass merges the two lightest available items left to right, leaving parent
/// pointers behind; the second turns parent pointers into internal node
/// depths; the third hands out leaf depths from the root down. On return the
/// lengths are non-increasing from index 0, so the heaviest symbol (last)
/// has the shortest code. A single weight gets length 0.
pub fn minimum_redundancy_lengths(a: &mut [u64]) {
    let n = a.len();
    match n {
        0 => return,
        1 => {
            a[0] = 0;
            return;
        }
        _ => {}
    }

    // ── Pass 1: merge, leaving parent pointers ──
    a[0] += a[1];
    let mut root = 0usize;
    let mut leaf = 2usize;
    for next in 1..n - 1 {
        if leaf >= n || a[root] < a[leaf] {
            a[next] = a[root];
            a[root] = next as u64;
            root += 1;
        } else {
            a[next] = a[leaf];
            leaf += 1;
        }

        if leaf >= n || (root < next && a[root] < a[leaf]) {
            a[next] += a[root];
            a[root] = next as u64;
            root += 1;
        } else {
            a[next] += a[leaf];
            leaf += 1;
        }
    }

    // ── Pass 2: internal node depths ──
    a[n - 2] = 0;
    for next in (0..n - 2).rev() {
        a[next] = a[a[next] as usize] + 1;
    }

    // ── Pass 3: leaf depths ──
    let mut avbl = 1usize;
    let mut used = 0usize;
    let mut depth = 0u64;
    let mut root = n as isize - 2;
    let mut next = n as isize - 1;
    while avbl > 0 {
        while root >= 0 && a[root as usize] == depth {
            used += 1;
            root -= 1;
        }
        while avbl > used {
            a[next as usize] = depth;
            next -= 1;
            avbl -= 1;
        }
        avbl = 2 * used;
        depth += 1;
        used = 0;
    }
}

/// Symbol to codeword mapping in canonical order.
///
/// Entries are ordered by code length, then by descending frequency (ties by
/// byte value); each codeword is the previous one plus one, shifted left to
/// the new length.
#[derive(Debug, Clone)]
pub struct CodeTable {
    entries: Vec<(u8, Codeword)>,
    lookup: [Option<Codeword>; 256],
}

impl CodeTable {
    /// Build the canonical code for the given byte frequencies.
    ///
    /// A lone symbol gets the one-bit codeword `0`; no symbols give an empty table.
    pub fn from_frequencies(freq: &[u64; 256]) -> Result<Self> {
        let mut symbols: Vec<(u64, u8)> = freq
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f > 0)
            .map(|(s, &f)| (f, s as u8))
            .collect();
        // ascending weight; reversed below, so lower byte values win ties
        symbols.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut lengths: Vec<u64> = symbols.iter().map(|&(f, _)| f).collect();
        minimum_redundancy_lengths(&mut lengths);

        let mut entries = Vec::with_capacity(symbols.len());
        let mut code = 0u128;
        let mut prev_len = 0u8;
        for (&(_, symbol), &depth) in symbols.iter().zip(&lengths).rev() {
            let depth = depth.max(1);
            if depth > MAX_CODE_LEN as u64 {
                return Err(HuffmanError::InvalidCodeLength {
                    len: depth as usize,
                    max: MAX_CODE_LEN,
                });
            }
            let len = depth as u8;
            if !entries.is_empty() {
                code = (code + 1) << (len - prev_len);
            }
            entries.push((symbol, Codeword::new(code, len)));
            prev_len = len;
        }

        Self::from_entries(entries)
    }

    /// Table from explicit entries, as read back from a container.
    pub fn from_entries(entries: Vec<(u8, Codeword)>) -> Result<Self> {
        let mut lookup = [None; 256];
        for &(symbol, code) in &entries {
            if code.len == 0 || code.len > MAX_CODE_LEN {
                return Err(HuffmanError::InvalidCodeLength {
                    len: code.len as usize,
                    max: MAX_CODE_LEN,
                });
            }
            if lookup[symbol as usize].replace(code).is_some() {
                return Err(HuffmanError::DuplicateSymbol { symbol });
            }
        }
        Ok(Self { entries, lookup })
    }

    pub fn code(&self, symbol: u8) -> Option<Codeword> {
        self.lookup[symbol as usize]
    }

    pub fn entries(&self) -> &[(u8, Codeword)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_len(&self) -> u8 {
        self.entries.iter().map(|(_, c)| c.len).max().unwrap_or(0)
    }
}

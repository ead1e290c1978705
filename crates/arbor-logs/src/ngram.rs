//! Numeric n-gram fingerprints and sorted fingerprint sets.
//!
//! Each byte position of a line yields one fingerprint: the next
//! [`NGRAM_LEN`] bytes of the line packed big-endian into a `u32`, padded
//! with zero bytes when the line ends sooner. Because the first byte is the
//! most significant, every fingerprint starting with a given prefix lies in
//! one contiguous numeric range, which is how terms shorter than a full
//! n-gram are looked up.

use std::ops::RangeInclusive;

use arbor_bundle::codec::{encode_varint, ByteReader};
use arbor_tree::{TreeError, TreeResult};

/// Bytes per fingerprint.
pub const NGRAM_LEN: usize = 4;

/// Fingerprint of the (up to) [`NGRAM_LEN`] bytes at the start of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> u32 {
    let mut packed = [0u8; NGRAM_LEN];
    let len = bytes.len().min(NGRAM_LEN);
    packed[..len].copy_from_slice(&bytes[..len]);
    u32::from_be_bytes(packed)
}

/// Push the fingerprint of every position of `line` onto `out`.
pub fn line_fingerprints(line: &[u8], out: &mut Vec<u32>) {
    out.extend((0..line.len()).map(|i| fingerprint(&line[i..])));
}

/// Range holding every fingerprint that starts with `prefix`.
///
/// `prefix` must be shorter than [`NGRAM_LEN`]; an empty prefix covers
/// every fingerprint.
pub fn prefix_range(prefix: &[u8]) -> RangeInclusive<u32> {
    debug_assert!(prefix.len() < NGRAM_LEN);
    let low = fingerprint(prefix);
    let high = match prefix.len() {
        0 => u32::MAX,
        n => low | (u32::MAX >> (8 * n)),
    };
    low..=high
}

/// A sorted, duplicate-free set of fingerprints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NgramSet {
    values: Vec<u32>,
}

impl NgramSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from fingerprints in any order.
    pub fn from_unsorted(mut values: Vec<u32>) -> Self {
        values.sort_unstable();
        values.dedup();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: u32) -> bool {
        self.values.binary_search(&value).is_ok()
    }

    /// Members within `[low, high]`, ascending.
    pub fn enumerate_range(&self, low: u32, high: u32) -> impl Iterator<Item = u32> + '_ {
        let start = self.values.partition_point(|&v| v < low);
        self.values[start..].iter().copied().take_while(move |&v| v <= high)
    }

    pub fn any_in_range(&self, low: u32, high: u32) -> bool {
        self.enumerate_range(low, high).next().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.values.iter().copied()
    }

    /// Count followed by ascending deltas, all varints.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        encode_varint(buf, self.values.len() as u64);
        let mut previous = 0u32;
        for &value in &self.values {
            encode_varint(buf, u64::from(value - previous));
            previous = value;
        }
    }

    pub fn decode(data: &[u8]) -> TreeResult<Self> {
        let mut reader = ByteReader::new(data);
        let set = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(TreeError::Decode(format!(
                "{} trailing bytes after n-gram set",
                reader.remaining()
            )));
        }
        Ok(set)
    }

    fn read(reader: &mut ByteReader<'_>) -> TreeResult<Self> {
        let count = reader.read_count(1)?;
        let mut values = Vec::with_capacity(count);
        let mut previous: Option<u32> = None;
        for _ in 0..count {
            let delta = reader.read_varint_u32()?;
            let value = match previous {
                None => delta,
                Some(_) if delta == 0 => {
                    return Err(TreeError::Decode("n-gram set is not strictly ascending".into()))
                }
                Some(prev) => prev
                    .checked_add(delta)
                    .ok_or_else(|| TreeError::Decode("n-gram value overflows u32".into()))?,
            };
            values.push(value);
            previous = Some(value);
        }
        Ok(Self { values })
    }
}

impl FromIterator<u32> for NgramSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

/// What a search term requires of a block's fingerprint set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NgramQuery {
    /// Every block may match.
    Any,
    /// Some fingerprint must fall in the range.
    Range(u32, u32),
    /// Every listed fingerprint must be present.
    All(Vec<u32>),
}

impl NgramQuery {
    pub(crate) fn for_term(term: &[u8]) -> Self {
        if term.is_empty() {
            NgramQuery::Any
        } else if term.len() < NGRAM_LEN {
            let range = prefix_range(term);
            NgramQuery::Range(*range.start(), *range.end())
        } else {
            let grams = term.windows(NGRAM_LEN).map(fingerprint).collect();
            NgramQuery::All(NgramSet::from_unsorted(grams).values)
        }
    }

    pub(crate) fn may_match(&self, set: &NgramSet) -> bool {
        match self {
            NgramQuery::Any => true,
            NgramQuery::Range(low, high) => set.any_in_range(*low, *high),
            NgramQuery::All(grams) => grams.iter().all(|&g| set.contains(g)),
        }
    }
}

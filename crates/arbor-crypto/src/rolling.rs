//! BuzHash (cyclic polynomial) rolling hash.
//!
//! The hash of a window `b[0..n]` is `XOR rotl(T[b[i]], n - 1 - i)`. Adding
//! a byte rotates the state by one and mixes in the new byte's table entry;
//! removing the oldest byte cancels its entry, which has been rotated once
//! for every byte added after it. Both operations are O(1).
//!
//! The state is 64 bits wide. Rotations repeat every [`BuzHash::PERIOD`]
//! positions, so two equal bytes that far apart cancel; windows must be no
//! longer than the period.

/// Byte substitution table, derived deterministically with SplitMix64 so
/// that every build produces identical chunk boundaries.
const TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state: u64 = 0x41_72_62_6f_72_5f_62_7a; // "Arbor_bz"
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        table[i] = z;
        i += 1;
    }
    table
}

/// Incremental rolling hash over a sliding window of bytes.
///
/// The hash does not keep the window contents itself; callers that slide a
/// window must pass the byte that falls out to [`BuzHash::sub`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuzHash {
    state: u64,
    count: usize,
}

impl BuzHash {
    /// Longest window in which no two positions share a rotation.
    pub const PERIOD: usize = u64::BITS as usize;

    pub fn new() -> Self {
        Self::default()
    }

    /// Current hash value.
    pub fn value(&self) -> u64 {
        self.state
    }

    /// Number of bytes currently contributing to the hash.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Append a byte to the window.
    pub fn add(&mut self, byte: u8) {
        self.state = self.state.rotate_left(1) ^ TABLE[byte as usize];
        self.count += 1;
    }

    /// Remove the oldest byte of the window. `byte` must be that byte.
    pub fn sub(&mut self, byte: u8) {
        debug_assert!(self.count > 0, "sub on an empty rolling hash");
        let shift = ((self.count - 1) % Self::PERIOD) as u32;
        self.state ^= TABLE[byte as usize].rotate_left(shift);
        self.count -= 1;
    }

    /// Forget all bytes.
    pub fn reset(&mut self) {
        self.state = 0;
        self.count = 0;
    }
}

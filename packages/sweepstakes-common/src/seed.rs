use std::fmt;

use sha2::{Digest, Sha256};

pub const SEED_LEN: usize = 32;

/// Domain prefixes, distinct from the Merkle leaf/node prefixes.
const SEED_DERIVE_PREFIX: u8 = 0x02;
const STREAM_BLOCK_PREFIX: u8 = 0x03;

/// 32-byte selection seed. Its hex encoding is the draw's reproducibility token.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DrawSeed([u8; SEED_LEN]);

impl DrawSeed {
    pub const fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        DrawSeed(bytes)
    }

    /// `seed = sha256( 0x02 || len_u32_be(part) || part || ... )`
    pub fn derive(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([SEED_DERIVE_PREFIX]);
        for part in parts {
            hasher.update((part.len() as u32).to_be_bytes());
            hasher.update(part);
        }
        DrawSeed(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn to_token(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let bytes = hex::decode(token).ok()?;
        <[u8; SEED_LEN]>::try_from(bytes).ok().map(DrawSeed)
    }

    pub fn stream(&self) -> SeedStream {
        SeedStream::new(*self)
    }
}

impl fmt::Debug for DrawSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrawSeed({})", self.to_token())
    }
}

/// Deterministic stream of u64 values.
///
/// Block `n` is `sha256( 0x03 || seed || n_u64_be )`; each block yields four
/// big-endian u64 words in order.
pub struct SeedStream {
    seed: [u8; SEED_LEN],
    block_index: u64,
    block: [u8; 32],
    offset: usize,
}

impl SeedStream {
    fn new(seed: DrawSeed) -> Self {
        SeedStream {
            seed: seed.0,
            block_index: 0,
            block: [0u8; 32],
            offset: 32,
        }
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update([STREAM_BLOCK_PREFIX]);
        hasher.update(self.seed);
        hasher.update(self.block_index.to_be_bytes());
        self.block = hasher.finalize().into();
        self.block_index += 1;
        self.offset = 0;
    }

    pub fn next_u64(&mut self) -> u64 {
        if self.offset >= self.block.len() {
            self.refill();
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.block[self.offset..self.offset + 8]);
        self.offset += 8;
        u64::from_be_bytes(word)
    }

    /// Uniform value in `[0, bound)`. Values below `2^64 mod bound` are rejected
    /// so every residue is equally likely. A bound of 0 or 1 yields 0.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        if bound <= 1 {
            return 0;
        }
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let value = self.next_u64();
            if value >= threshold {
                return value % bound;
            }
        }
    }
}

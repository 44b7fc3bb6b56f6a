//! Scan filter
//!
//! Bloom filter (BIP 37 style) over scripts and outpoints the wallet cares
//! about, so chain scanning picks up funding outputs that pay none of our
//! own addresses.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::transaction::OutPoint;

// =============================================================================
// Constants
// =============================================================================

/// Maximum bloom filter size (in bits)
pub const MAX_BLOOM_SIZE: usize = 36_000_000;

/// Maximum number of hash functions
pub const MAX_HASH_FUNCS: u8 = 50;

/// False positive rate used when the wallet rebuilds its filter
pub const DEFAULT_FP_RATE: f64 = 0.0001;

// =============================================================================
// Bloom Filter
// =============================================================================

/// Bloom filter for matching transactions against watched elements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Filter data (bit array)
    data: Vec<u8>,
    /// Number of hash functions
    hash_funcs: u8,
    /// Tweak for hash randomization
    tweak: u32,
}

impl BloomFilter {
    /// Create a new bloom filter
    pub fn new(size_bits: usize, hash_funcs: u8, tweak: u32) -> Self {
        let size_bytes = (size_bits.max(8) + 7) / 8;
        Self {
            data: vec![0u8; size_bytes.min(MAX_BLOOM_SIZE / 8)],
            hash_funcs: hash_funcs.clamp(1, MAX_HASH_FUNCS),
            tweak,
        }
    }

    /// Create filter optimized for N elements with target false positive rate
    pub fn for_elements(n_elements: usize, fp_rate: f64, tweak: u32) -> Self {
        let n = n_elements.max(1) as f64;
        // optimal size: -1 / (ln(2)^2) * n * ln(p)
        let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let size_bits = ((-1.0 / ln2_squared) * n * fp_rate.ln()) as usize;
        let size_bits = size_bits.clamp(8, MAX_BLOOM_SIZE);

        // optimal hash functions: (m/n) * ln(2)
        let hash_funcs = ((size_bits as f64 / n) * std::f64::consts::LN_2) as u8;

        Self::new(size_bits, hash_funcs, tweak)
    }

    /// Add data to the filter
    pub fn insert(&mut self, data: &[u8]) {
        for i in 0..self.hash_funcs as u32 {
            let idx = self.hash(data, i);
            self.set_bit(idx);
        }
    }

    /// Add an outpoint (wire encoding) to the filter
    pub fn insert_outpoint(&mut self, outpoint: &OutPoint) {
        self.insert(&outpoint.to_bytes());
    }

    /// Check if data might be in the filter
    pub fn contains(&self, data: &[u8]) -> bool {
        (0..self.hash_funcs as u32).all(|i| self.get_bit(self.hash(data, i)))
    }

    /// Get filter size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn hash(&self, data: &[u8], n: u32) -> usize {
        let seed = n.wrapping_mul(0xFBA4C795).wrapping_add(self.tweak);
        let mut hasher = Sha256::new();
        hasher.update(seed.to_le_bytes());
        hasher.update(data);
        let hash = hasher.finalize();

        let idx = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
        (idx as usize) % (self.data.len() * 8)
    }

    fn set_bit(&mut self, idx: usize) {
        self.data[idx / 8] |= 1 << (idx % 8);
    }

    fn get_bit(&self, idx: usize) -> bool {
        (self.data[idx / 8] & (1 << (idx % 8))) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::Txid;

    #[test]
    fn test_insert_and_contains() {
        let mut filter = BloomFilter::for_elements(10, DEFAULT_FP_RATE, 42);
        assert!(!filter.contains(b"funding-script"));

        filter.insert(b"funding-script");
        assert!(filter.contains(b"funding-script"));
    }

    #[test]
    fn test_watches_outpoint() {
        let watched = OutPoint::new(Txid([3u8; 32]), 1);
        let mut filter = BloomFilter::for_elements(4, DEFAULT_FP_RATE, 7);
        filter.insert_outpoint(&watched);
        assert!(filter.contains(&watched.to_bytes()));
    }

    #[test]
    fn test_size_is_clamped() {
        assert_eq!(BloomFilter::new(0, 1, 0).size(), 1);
        assert_eq!(BloomFilter::new(800, 1, 0).size(), 100);
    }
}

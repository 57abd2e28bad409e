use std::sync::Arc;

use log::{debug, info};
use rayon::ThreadPool;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use super::block::{Block, BlockData, Sha256Hash, UnsealedBlock};
use super::{HASH_BITS, HASH_BYTES};
use crate::error::{ChainError, Result};

/// Big-endian 256-bit threshold a digest must stay strictly below.
pub type Target = [u8; HASH_BYTES];

/// Nonces handed to each worker per parallel search round.
const NONCES_PER_WORKER: u64 = 4096;

/// Upper bound on nonce search workers.
pub const MAX_MINING_THREADS: usize = 256;

/// The hash puzzle for a fixed difficulty.
///
/// Holds no per-block state: the same engine mines and validates any number
/// of blocks.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    difficulty_bits: u32,
    target: Target,
    max_nonce: u64,
    threads: usize,
    // built once, shared by clones
    pool: Option<Arc<ThreadPool>>,
}

impl ProofOfWork {
    /// Build the engine; `target = 2^(256 - difficulty_bits)`.
    pub fn new(difficulty_bits: u32) -> Result<Self> {
        if difficulty_bits == 0 || difficulty_bits >= HASH_BITS {
            return Err(ChainError::Configuration(format!(
                "difficulty_bits must be in 1..{HASH_BITS}, got {difficulty_bits}"
            )));
        }
        Ok(Self {
            difficulty_bits,
            target: target_for(difficulty_bits),
            max_nonce: u64::MAX,
            threads: 1,
            pool: None,
        })
    }

    /// Stop searching after `max_nonce` (inclusive).
    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = max_nonce;
        self
    }

    /// Search nonces on `threads` workers. `0` and `1` both mean sequential.
    ///
    /// The worker pool is started here and reused by every `mine` call.
    pub fn with_threads(mut self, threads: usize) -> Result<Self> {
        if threads > MAX_MINING_THREADS {
            return Err(ChainError::Configuration(format!(
                "mining threads must be at most {MAX_MINING_THREADS}, got {threads}"
            )));
        }
        self.threads = threads.max(1);
        self.pool = if self.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()?;
            Some(Arc::new(pool))
        } else {
            None
        };
        Ok(self)
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn max_nonce(&self) -> u64 {
        self.max_nonce
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Preimage for `nonce`: previous hash, payload, then timestamp,
    /// difficulty and nonce as 8-byte big-endian integers, with no separators.
    ///
    /// Field order and widths are fixed; changing either changes every hash.
    pub fn serialize<B: BlockData + ?Sized>(&self, block: &B, nonce: u64) -> Vec<u8> {
        let previous_hash = block.previous_hash();
        let payload = block.payload();

        let mut data = Vec::with_capacity(previous_hash.len() + payload.len() + 24);
        data.extend_from_slice(previous_hash);
        data.extend_from_slice(payload);
        data.extend_from_slice(&block.timestamp().to_be_bytes());
        data.extend_from_slice(&u64::from(self.difficulty_bits).to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// SHA-256 of the preimage for `nonce`.
    pub fn hash<B: BlockData + ?Sized>(&self, block: &B, nonce: u64) -> Sha256Hash {
        Sha256::digest(self.serialize(block, nonce)).into()
    }

    /// Strict `hash < target`, both read as big-endian integers.
    pub fn meets_target(&self, hash: &Sha256Hash) -> bool {
        hash < &self.target
    }

    /// Find a nonce whose hash meets the target.
    ///
    /// Returns the lowest such nonce regardless of the number of threads.
    pub fn mine(&self, block: &UnsealedBlock) -> Result<(u64, Sha256Hash)> {
        debug!(
            "MINER - searching nonce (payload={} bytes, difficulty_bits={}, threads={})",
            block.payload().len(),
            self.difficulty_bits,
            self.threads
        );
        match &self.pool {
            Some(pool) => self.mine_parallel(pool, block),
            None => self.mine_sequential(block),
        }
    }

    /// Mine `block` and seal it with the solution.
    pub fn seal(&self, block: UnsealedBlock) -> Result<Block> {
        let (nonce, hash) = self.mine(&block)?;
        info!(
            "MINER - sealed block (hash={}, nonce={})",
            hex::encode(hash),
            nonce
        );
        Ok(block.seal(nonce, hash))
    }

    /// Re-derive the digest from the stored fields and nonce. The block is
    /// valid only if that digest meets the target and equals the stored hash.
    pub fn validate(&self, block: &Block) -> bool {
        let expected = self.hash(block, block.nonce());
        expected == *block.hash() && self.meets_target(&expected)
    }

    fn mine_sequential(&self, block: &UnsealedBlock) -> Result<(u64, Sha256Hash)> {
        let mut nonce = 0u64;
        loop {
            let hash = self.hash(block, nonce);
            if self.meets_target(&hash) {
                return Ok((nonce, hash));
            }
            if nonce == self.max_nonce {
                return Err(ChainError::MiningExhausted {
                    max_nonce: self.max_nonce,
                });
            }
            nonce += 1;
        }
    }

    /// Scan ascending batches; inside a batch `find_first` keeps the lowest
    /// hit, so the result matches the sequential search.
    fn mine_parallel(
        &self,
        pool: &ThreadPool,
        block: &UnsealedBlock,
    ) -> Result<(u64, Sha256Hash)> {
        let batch = NONCES_PER_WORKER
            .checked_mul(self.threads as u64)
            .ok_or_else(|| {
                ChainError::Configuration(format!(
                    "{} mining threads overflow the search batch",
                    self.threads
                ))
            })?;

        let mut start = 0u64;
        loop {
            let end = start.saturating_add(batch - 1).min(self.max_nonce);
            let found = pool.install(|| {
                (start..=end)
                    .into_par_iter()
                    .map(|nonce| (nonce, self.hash(block, nonce)))
                    .find_first(|(_, hash)| self.meets_target(hash))
            });
            if let Some(solution) = found {
                return Ok(solution);
            }
            if end == self.max_nonce {
                return Err(ChainError::MiningExhausted {
                    max_nonce: self.max_nonce,
                });
            }
            start = end + 1;
        }
    }
}

/// `2^(256 - difficulty_bits)` as a big-endian byte array.
fn target_for(difficulty_bits: u32) -> Target {
    let shift = (HASH_BITS - difficulty_bits) as usize;
    let mut target = [0u8; HASH_BYTES];
    target[HASH_BYTES - 1 - shift / 8] = 1 << (shift % 8);
    target
}

#[cfg(test)]
mod tests {
    use super::{MAX_MINING_THREADS, ProofOfWork};
    use crate::blockchain::block::{Block, UnsealedBlock};
    use crate::error::ChainError;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn candidate(payload: &str) -> UnsealedBlock {
        Block::new_unsealed(payload, Some([0x11; 32]), 1_700_000_000)
    }

    #[test]
    fn rejects_degenerate_difficulty() {
        assert!(matches!(
            ProofOfWork::new(0),
            Err(ChainError::Configuration(_))
        ));
        assert!(matches!(
            ProofOfWork::new(256),
            Err(ChainError::Configuration(_))
        ));
        assert!(ProofOfWork::new(1).is_ok());
        assert!(ProofOfWork::new(255).is_ok());
    }

    #[test]
    fn target_is_single_shifted_bit() {
        let t8 = ProofOfWork::new(8).unwrap();
        let mut expected = [0u8; 32];
        expected[0] = 0x01;
        assert_eq!(t8.target(), &expected);

        let t1 = ProofOfWork::new(1).unwrap();
        let mut expected = [0u8; 32];
        expected[0] = 0x80;
        assert_eq!(t1.target(), &expected);

        let t255 = ProofOfWork::new(255).unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 0x02;
        assert_eq!(t255.target(), &expected);
    }

    #[test]
    fn target_shrinks_as_difficulty_grows() {
        for bits in 1..255 {
            let easier = ProofOfWork::new(bits).unwrap();
            let harder = ProofOfWork::new(bits + 1).unwrap();
            assert!(harder.target() < easier.target(), "bits={bits}");
        }
    }

    #[test]
    fn comparison_is_strict() {
        let pow = ProofOfWork::new(8).unwrap();
        let at_target = *pow.target();
        assert!(!pow.meets_target(&at_target));

        let mut below = [0xff; 32];
        below[0] = 0x00;
        assert!(pow.meets_target(&below));
    }

    #[test]
    fn serialize_layout_is_fixed() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = Block::new_unsealed("ab", None, 1);

        let mut expected = b"ab".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 8]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(pow.serialize(&block, 2), expected);

        let linked = Block::new_unsealed("ab", Some([0xee; 32]), 1);
        let data = pow.serialize(&linked, 2);
        assert_eq!(&data[..32], &[0xee; 32]);
        assert_eq!(&data[32..], &expected[..]);
    }

    #[test]
    fn hashing_is_deterministic() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = candidate("payload");
        assert_eq!(pow.serialize(&block, 77), pow.serialize(&block, 77));
        assert_eq!(pow.hash(&block, 77), pow.hash(&block, 77));
        assert_ne!(pow.hash(&block, 77), pow.hash(&block, 78));
    }

    #[test]
    fn difficulty_is_part_of_the_preimage() {
        let block = candidate("payload");
        let a = ProofOfWork::new(8).unwrap();
        let b = ProofOfWork::new(9).unwrap();
        assert_ne!(a.hash(&block, 0), b.hash(&block, 0));
    }

    #[test]
    fn mining_finds_first_satisfying_nonce() {
        init_logger();
        let pow = ProofOfWork::new(8).unwrap();
        let block = candidate("Send 1 BTC to bosung");

        let (nonce, hash) = pow.mine(&block).unwrap();
        assert_eq!(hash, pow.hash(&block, nonce));
        assert!(pow.meets_target(&hash));
        assert_eq!(hash[0], 0);
        for earlier in 0..nonce {
            assert!(!pow.meets_target(&pow.hash(&block, earlier)));
        }
    }

    #[test]
    fn parallel_search_matches_sequential() {
        init_logger();
        let sequential = ProofOfWork::new(10).unwrap();
        let parallel = sequential.clone().with_threads(4).unwrap();
        let block = candidate("parallel");

        assert_eq!(
            sequential.mine(&block).unwrap(),
            parallel.mine(&block).unwrap()
        );
    }

    #[test]
    fn thread_count_is_capped() {
        let pow = ProofOfWork::new(8).unwrap();
        assert!(matches!(
            pow.clone().with_threads(MAX_MINING_THREADS + 1),
            Err(ChainError::Configuration(_))
        ));
        assert!(matches!(
            pow.clone().with_threads(usize::MAX / 2),
            Err(ChainError::Configuration(_))
        ));
        assert_eq!(pow.clone().with_threads(0).unwrap().threads(), 1);
    }

    #[test]
    fn parallel_engine_reuses_its_pool_across_blocks() {
        let pow = ProofOfWork::new(6).unwrap().with_threads(2).unwrap();
        let clone = pow.clone();
        for payload in ["a", "b", "c"] {
            let block = clone.seal(candidate(payload)).unwrap();
            assert!(pow.validate(&block));
        }
        assert_eq!(clone.threads(), 2);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let block = candidate("never");
        let pow = ProofOfWork::new(255).unwrap().with_max_nonce(100);
        assert!(matches!(
            pow.mine(&block),
            Err(ChainError::MiningExhausted { max_nonce: 100 })
        ));

        let parallel = pow.with_threads(2).unwrap();
        assert!(matches!(
            parallel.mine(&block),
            Err(ChainError::MiningExhausted { max_nonce: 100 })
        ));
    }

    #[test]
    fn mined_block_validates() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = pow.seal(candidate("valid")).unwrap();
        assert!(pow.validate(&block));
    }

    #[test]
    fn invalid_when_mutated() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = pow.seal(candidate("original")).unwrap();

        let mut b = block.clone();
        b.payload = b"tampered".to_vec();
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.previous_hash = Some([0x22; 32]);
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.previous_hash = None;
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.timestamp += 1;
        assert!(!pow.validate(&b));

        let mut b = block.clone();
        b.nonce += 1;
        assert!(!pow.validate(&b));
    }

    #[test]
    fn stored_hash_must_match_even_if_it_meets_target() {
        let pow = ProofOfWork::new(8).unwrap();
        let mut block = pow.seal(candidate("forged")).unwrap();
        block.hash = [0u8; 32];
        assert!(pow.meets_target(&block.hash));
        assert!(!pow.validate(&block));
    }

    #[test]
    fn block_mined_at_other_difficulty_is_rejected() {
        let easy = ProofOfWork::new(1).unwrap();
        let hard = ProofOfWork::new(8).unwrap();
        let block = easy.seal(candidate("easy")).unwrap();
        assert!(easy.validate(&block));
        // difficulty is hashed in, so the recomputed digest differs
        assert!(!hard.validate(&block));
    }
}

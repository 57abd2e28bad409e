pub mod block;
pub mod model;
pub mod pow;
pub mod shared;

pub use block::{Block, BlockData, Sha256Hash, UnsealedBlock};
pub use model::{Blockchain, verify_blocks};
pub use pow::{MAX_MINING_THREADS, ProofOfWork, Target};
pub use shared::SharedBlockchain;

/// Width of a SHA-256 digest in bits.
pub const HASH_BITS: u32 = 256;

/// Width of a SHA-256 digest in bytes.
pub const HASH_BYTES: usize = (HASH_BITS / 8) as usize;

/// Default Proof-of-Work difficulty (leading zero bits required).
pub const DEFAULT_DIFFICULTY_BITS: u32 = 24;

/// Payload of the first block of every chain.
pub const GENESIS_PAYLOAD: &str = "Genesis Block";

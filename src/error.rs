use thiserror::Error;

/// Everything that can go wrong while building, extending or re-verifying a chain.
///
/// A failed proof on a single block is *not* an error: `ProofOfWork::validate`
/// returns `false`. `InvalidProof` is only produced by the chain verifier.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(
        "block #{index} does not link to its predecessor (expected previous hash {expected:?}, found {found:?})"
    )]
    LinkageViolation {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("block #{index} carries an invalid proof of work")]
    InvalidProof { index: usize },

    #[error("chain has no genesis block")]
    EmptyChain,

    #[error("mining exhausted nonces 0..={max_nonce} without meeting the target")]
    MiningExhausted { max_nonce: u64 },

    #[error("failed to start mining workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("blockchain lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ChainError>;

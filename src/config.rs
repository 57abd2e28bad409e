//! Runtime configuration, read from the environment (and `.env` if present).

use std::env;
use std::str::FromStr;

use log::debug;

use crate::blockchain::{DEFAULT_DIFFICULTY_BITS, MAX_MINING_THREADS, ProofOfWork};
use crate::error::{ChainError, Result};

pub const DIFFICULTY_BITS_VAR: &str = "POW_DIFFICULTY_BITS";
pub const MINING_THREADS_VAR: &str = "POW_MINING_THREADS";
pub const MAX_NONCE_VAR: &str = "POW_MAX_NONCE";
pub const HASH_ALGORITHM_VAR: &str = "POW_HASH_ALGORITHM";

/// The only digest the chain is ever hashed with.
pub const HASH_ALGORITHM: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Leading zero bits a block hash needs; expected work is about 2^bits hashes.
    pub difficulty_bits: u32,
    /// Nonce search workers; 1 mines sequentially.
    pub mining_threads: usize,
    /// Highest nonce tried before mining gives up.
    pub max_nonce: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty_bits: DEFAULT_DIFFICULTY_BITS,
            mining_threads: 1,
            max_nonce: u64::MAX,
        }
    }
}

impl Config {
    /// Load `.env` (if any), then read the `POW_*` variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key/value source. Missing keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(algorithm) = lookup(HASH_ALGORITHM_VAR)
            && !algorithm.trim().eq_ignore_ascii_case(HASH_ALGORITHM)
        {
            return Err(ChainError::Configuration(format!(
                "{HASH_ALGORITHM_VAR} must be {HASH_ALGORITHM}, got {algorithm:?}"
            )));
        }

        let defaults = Self::default();
        let config = Self {
            difficulty_bits: parse_var(&lookup, DIFFICULTY_BITS_VAR)?
                .unwrap_or(defaults.difficulty_bits),
            mining_threads: parse_var(&lookup, MINING_THREADS_VAR)?
                .unwrap_or(defaults.mining_threads),
            max_nonce: parse_var(&lookup, MAX_NONCE_VAR)?.unwrap_or(defaults.max_nonce),
        };
        if config.mining_threads > MAX_MINING_THREADS {
            return Err(ChainError::Configuration(format!(
                "{MINING_THREADS_VAR} must be at most {MAX_MINING_THREADS}, got {}",
                config.mining_threads
            )));
        }
        debug!("CONFIG - {config:?}");
        Ok(config)
    }

    /// The validated proof-of-work engine for this configuration.
    pub fn proof_of_work(&self) -> Result<ProofOfWork> {
        Ok(ProofOfWork::new(self.difficulty_bits)?
            .with_threads(self.mining_threads)?
            .with_max_nonce(self.max_nonce))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            ChainError::Configuration(format!("{key}={raw:?} is not valid: {e}"))
        }),
    }
}

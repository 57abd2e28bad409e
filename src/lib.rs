//! Append-only chain of records sealed by SHA-256 proof of work.
//!
//! - [`blockchain`] - blocks, the proof-of-work engine and the chain container
//! - [`config`] - difficulty and mining settings from the environment
//! - [`error`] - error types

#![forbid(unsafe_code)]

pub mod blockchain;
pub mod config;
pub mod error;

pub use blockchain::{Block, Blockchain, ProofOfWork, SharedBlockchain, UnsealedBlock};
pub use config::Config;
pub use error::{ChainError, Result};

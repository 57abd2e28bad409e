use chrono::Utc;
use log::{info, warn};

use super::{Block, GENESIS_PAYLOAD, ProofOfWork};
use crate::config::Config;
use crate::error::{ChainError, Result};

/// Simple in-memory blockchain with Proof-of-Work.
///
/// Always holds at least the genesis block. Blocks are only ever appended;
/// existing entries are never touched.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    pow: ProofOfWork,
}

impl Blockchain {
    /// Initialize a new blockchain with a freshly mined genesis block.
    pub fn new(pow: ProofOfWork) -> Result<Self> {
        Self::with_genesis_timestamp(pow, Utc::now().timestamp())
    }

    /// Same as [`Blockchain::new`] with a fixed genesis timestamp.
    pub fn with_genesis_timestamp(pow: ProofOfWork, timestamp: i64) -> Result<Self> {
        let genesis = pow.seal(Block::new_unsealed(GENESIS_PAYLOAD, None, timestamp))?;
        info!("CHAIN - genesis mined (hash={})", genesis.hash_hex());
        Ok(Self {
            blocks: vec![genesis],
            pow,
        })
    }

    /// Build the engine from `config` and mine a genesis block with it.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.proof_of_work()?)
    }

    /// Adopt blocks from an untrusted source. Fails unless they form a
    /// valid chain under `pow`.
    pub fn from_blocks(blocks: Vec<Block>, pow: ProofOfWork) -> Result<Self> {
        verify_blocks(&blocks, &pow)?;
        Ok(Self { blocks, pow })
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// Mine and append a new block carrying `payload`, stamped now.
    pub fn append(&mut self, payload: impl Into<Vec<u8>>) -> Result<&Block> {
        self.append_at(payload, Utc::now().timestamp())
    }

    /// Mine and append a new block with an explicit timestamp.
    pub fn append_at(&mut self, payload: impl Into<Vec<u8>>, timestamp: i64) -> Result<&Block> {
        let previous_hash = *self.last_block().hash();
        let block = self
            .pow
            .seal(Block::new_unsealed(payload, Some(previous_hash), timestamp))?;

        info!(
            "CHAIN - appended block #{} (hash={}, nonce={})",
            self.blocks.len(),
            block.hash_hex(),
            block.nonce()
        );
        self.blocks.push(block);
        Ok(self.last_block())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Blocks in chain order, genesis first.
    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true: the genesis block is always present.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.pow.difficulty_bits()
    }

    /// Re-check linkage and proof of every block.
    pub fn verify(&self) -> Result<()> {
        verify_blocks(&self.blocks, &self.pow)
    }

    pub fn is_valid_chain(&self) -> bool {
        self.verify().is_ok()
    }
}

impl<'a> IntoIterator for &'a Blockchain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Walk `blocks` in order and report the first broken link or proof.
///
/// The first block must be a genesis block (empty link); every later block
/// must link to its predecessor's hash.
pub fn verify_blocks(blocks: &[Block], pow: &ProofOfWork) -> Result<()> {
    let Some(genesis) = blocks.first() else {
        return Err(ChainError::EmptyChain);
    };

    if !genesis.is_genesis() {
        warn!("CHAIN - rejected: first block carries a previous hash");
        return Err(ChainError::LinkageViolation {
            index: 0,
            expected: String::new(),
            found: hex::encode(genesis.previous_hash()),
        });
    }

    for (index, block) in blocks.iter().enumerate() {
        if index > 0 {
            let prev = &blocks[index - 1];
            if block.previous_block_hash() != Some(prev.hash()) {
                warn!("CHAIN - rejected: block #{index} is not linked to its predecessor");
                return Err(ChainError::LinkageViolation {
                    index,
                    expected: prev.hash_hex(),
                    found: hex::encode(block.previous_hash()),
                });
            }
        }

        if !pow.validate(block) {
            warn!("CHAIN - rejected: block #{index} fails proof of work");
            return Err(ChainError::InvalidProof { index });
        }
    }

    Ok(())
}

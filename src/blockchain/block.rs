use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A SHA-256 digest, big-endian.
pub type Sha256Hash = [u8; 32];

/// Read view over the fields that go into a block's proof-of-work preimage.
pub trait BlockData {
    /// Link to the previous block; empty for genesis.
    fn previous_hash(&self) -> &[u8];
    fn payload(&self) -> &[u8];
    /// Unix timestamp (UTC, seconds).
    fn timestamp(&self) -> i64;
}

/// A candidate block that has not been mined yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsealedBlock {
    timestamp: i64,
    payload: Vec<u8>,
    previous_hash: Option<Sha256Hash>,
}

impl UnsealedBlock {
    /// Attach the proof-of-work solution. Consumes the candidate, so a block
    /// can only be sealed once.
    pub(crate) fn seal(self, nonce: u64, hash: Sha256Hash) -> Block {
        Block {
            timestamp: self.timestamp,
            payload: self.payload,
            previous_hash: self.previous_hash,
            nonce,
            hash,
        }
    }
}

impl BlockData for UnsealedBlock {
    fn previous_hash(&self) -> &[u8] {
        link_bytes(&self.previous_hash)
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// A sealed block: its `hash` is the proof-of-work digest of the other fields.
///
/// Fields are read-only outside the crate; changing any of them without
/// re-mining makes `ProofOfWork::validate` reject the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub(crate) timestamp: i64, // Unix timestamp (UTC)
    #[serde(with = "hex")]
    pub(crate) payload: Vec<u8>,
    #[serde(with = "link_hex")]
    pub(crate) previous_hash: Option<Sha256Hash>,
    pub(crate) nonce: u64, // Proof-of-Work nonce
    #[serde(with = "hex")]
    pub(crate) hash: Sha256Hash,
}

impl Block {
    /// Create a candidate block. Pass `None` as `previous_hash` for genesis.
    pub fn new_unsealed(
        payload: impl Into<Vec<u8>>,
        previous_hash: Option<Sha256Hash>,
        timestamp: i64,
    ) -> UnsealedBlock {
        UnsealedBlock {
            timestamp,
            payload: payload.into(),
            previous_hash,
        }
    }

    /// Candidate block stamped with the current time.
    pub fn new_unsealed_now(
        payload: impl Into<Vec<u8>>,
        previous_hash: Option<Sha256Hash>,
    ) -> UnsealedBlock {
        Self::new_unsealed(payload, previous_hash, Utc::now().timestamp())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn previous_hash(&self) -> &[u8] {
        link_bytes(&self.previous_hash)
    }

    /// The link as a digest, `None` for a genesis block.
    pub fn previous_block_hash(&self) -> Option<&Sha256Hash> {
        self.previous_hash.as_ref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &Sha256Hash {
        &self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }
}

impl BlockData for Block {
    fn previous_hash(&self) -> &[u8] {
        link_bytes(&self.previous_hash)
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

fn link_bytes(link: &Option<Sha256Hash>) -> &[u8] {
    match link {
        Some(hash) => hash,
        None => &[],
    }
}

/// Hex codec for the previous-hash link; genesis is the empty string.
mod link_hex {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use super::Sha256Hash;

    pub fn serialize<S: Serializer>(
        link: &Option<Sha256Hash>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match link {
            Some(hash) => serializer.serialize_str(&hex::encode(hash)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Sha256Hash>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        if encoded.is_empty() {
            return Ok(None);
        }
        let mut hash = [0u8; 32];
        hex::decode_to_slice(&encoded, &mut hash).map_err(de::Error::custom)?;
        Ok(Some(hash))
    }
}

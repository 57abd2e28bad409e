use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Block, Blockchain};
use crate::error::{ChainError, Result};

/// Cloneable handle to one [`Blockchain`] shared between threads.
///
/// `append` holds the write lock from reading the tail until the mined block
/// is pushed, so concurrent appends are serialized and never fork the chain.
#[derive(Debug, Clone)]
pub struct SharedBlockchain {
    inner: Arc<RwLock<Blockchain>>,
}

impl SharedBlockchain {
    pub fn new(blockchain: Blockchain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(blockchain)),
        }
    }

    /// Mine and append; returns a copy of the new tail.
    pub fn append(&self, payload: impl Into<Vec<u8>>) -> Result<Block> {
        let mut bc = self.write()?;
        bc.append(payload).cloned()
    }

    pub fn last_block(&self) -> Result<Block> {
        Ok(self.read()?.last_block().clone())
    }

    /// Copy of every block, in chain order.
    pub fn snapshot(&self) -> Result<Vec<Block>> {
        Ok(self.read()?.blocks().to_vec())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn verify(&self) -> Result<()> {
        self.read()?.verify()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Blockchain>> {
        self.inner.read().map_err(|_| ChainError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Blockchain>> {
        self.inner.write().map_err(|_| ChainError::LockPoisoned)
    }
}

impl From<Blockchain> for SharedBlockchain {
    fn from(blockchain: Blockchain) -> Self {
        Self::new(blockchain)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::SharedBlockchain;
    use crate::blockchain::{Blockchain, ProofOfWork};

    #[test]
    fn concurrent_appends_keep_linkage() {
        let pow = ProofOfWork::new(6).unwrap();
        let shared = SharedBlockchain::new(Blockchain::new(pow).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..3 {
                        shared.append(format!("worker {worker} block {i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.len().unwrap(), 13);
        let blocks = shared.snapshot().unwrap();
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].previous_hash(), pair[0].hash());
        }
        assert!(shared.verify().is_ok());
    }

    #[test]
    fn append_returns_new_tail() {
        let pow = ProofOfWork::new(4).unwrap();
        let shared: SharedBlockchain = Blockchain::new(pow).unwrap().into();
        let genesis = shared.last_block().unwrap();

        let tail = shared.append("hello").unwrap();
        assert_eq!(tail.previous_hash(), genesis.hash());
        assert_eq!(shared.last_block().unwrap(), tail);
    }
}

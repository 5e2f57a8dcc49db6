//! In-memory block storage implementation

use crate::car::ParsedCar;
use crate::error::Result;
use crate::storage::BlockStore;
use bytes::Bytes;
use cid::Cid as IpldCid;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory block storage using BTreeMap
///
/// The usual home for a snapshot fetched as a CAR: the blocks are parsed
/// once and then shared read-only by every sub-walk of a verification call.
/// Cloning is cheap and clones share the same blocks.
///
/// Blocks are inserted through [`MemoryBlockStore::insert`], which files them
/// under their computed CID, or [`MemoryBlockStore::insert_raw`], which
/// trusts the caller's CID (the way a CAR does).
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<BTreeMap<IpldCid, Bytes>>,
    roots: Arc<Vec<IpldCid>>,
}

impl MemoryBlockStore {
    /// Create new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new memory store from roots and a map of blocks
    pub fn new_from_blocks(roots: Vec<IpldCid>, blocks: BTreeMap<IpldCid, Bytes>) -> Self {
        Self {
            blocks: Arc::new(blocks),
            roots: Arc::new(roots),
        }
    }

    /// Create a memory store from a parsed CAR
    pub fn from_car(parsed: ParsedCar) -> Self {
        Self::new_from_blocks(parsed.roots, parsed.blocks)
    }

    /// Replace the declared roots
    pub fn with_roots(mut self, roots: Vec<IpldCid>) -> Self {
        self.roots = Arc::new(roots);
        self
    }

    /// Add a block under its computed CID
    pub fn insert(&mut self, data: impl Into<Bytes>) -> Result<IpldCid> {
        let data = data.into();
        let cid = crate::hash::compute_cid(&data)?;
        Arc::make_mut(&mut self.blocks).insert(cid, data);
        Ok(cid)
    }

    /// Add a block under a caller-chosen CID
    ///
    /// No hash check happens here; it happens when the block is read by
    /// proof code.
    pub fn insert_raw(&mut self, cid: IpldCid, data: impl Into<Bytes>) {
        Arc::make_mut(&mut self.blocks).insert(cid, data.into());
    }

    /// Drop a block, returning its bytes
    pub fn remove(&mut self, cid: &IpldCid) -> Option<Bytes> {
        Arc::make_mut(&mut self.blocks).remove(cid)
    }

    /// Borrow the block map
    pub fn blocks(&self) -> &BTreeMap<IpldCid, Bytes> {
        &self.blocks
    }

    /// Get number of blocks stored
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn roots(&self) -> Vec<IpldCid> {
        self.roots.as_ref().clone()
    }

    async fn get(&self, cid: &IpldCid) -> Result<Option<Bytes>> {
        Ok(self.blocks.get(cid).cloned())
    }

    async fn has(&self, cid: &IpldCid) -> Result<bool> {
        Ok(self.blocks.contains_key(cid))
    }

    async fn cids(&self) -> Result<Vec<IpldCid>> {
        Ok(self.blocks.keys().copied().collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.blocks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let mut store = MemoryBlockStore::new();
        let data = b"test data";

        let cid = store.insert(&data[..]).unwrap();
        let retrieved = store.get(&cid).await.unwrap();

        assert_eq!(retrieved.as_deref(), Some(&data[..]));
        assert_eq!(cid, crate::hash::compute_cid(data).unwrap());
    }

    #[tokio::test]
    async fn test_has() {
        let mut store = MemoryBlockStore::new();
        let cid = store.insert(&b"test data"[..]).unwrap();
        assert!(store.has(&cid).await.unwrap());

        let fake_cid = IpldCid::default();
        assert!(!store.has(&fake_cid).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_raw_skips_hashing() {
        let mut store = MemoryBlockStore::new();
        let cid = crate::hash::compute_cid(b"real").unwrap();
        store.insert_raw(cid, &b"forged"[..]);

        assert_eq!(store.get(&cid).await.unwrap().as_deref(), Some(&b"forged"[..]));
    }

    #[tokio::test]
    async fn test_cids_and_len() {
        let mut store = MemoryBlockStore::new();
        let cid1 = store.insert(&b"data1"[..]).unwrap();
        let cid2 = store.insert(&b"data2"[..]).unwrap();

        assert_eq!(store.len().await.unwrap(), 2);
        let cids = store.cids().await.unwrap();
        assert!(cids.contains(&cid1));
        assert!(cids.contains(&cid2));

        store.remove(&cid1);
        assert_eq!(store.block_count(), 1);
    }

    #[tokio::test]
    async fn test_clone_is_snapshot() {
        let mut store1 = MemoryBlockStore::new().with_roots(vec![IpldCid::default()]);
        let store2 = store1.clone();

        let cid = store1.insert(&b"test"[..]).unwrap();
        assert!(!store2.has(&cid).await.unwrap());
        assert_eq!(store2.roots(), vec![IpldCid::default()]);
    }
}

//! Block storage abstraction for repository snapshots

use crate::error::Result;
use bytes::Bytes;
use cid::Cid as IpldCid;

/// Async read-only block storage for one repository snapshot
///
/// Provides CID-keyed access to the blocks of a snapshot (commit, MST nodes,
/// records) plus the snapshot's declared roots. The contents are untrusted:
/// blocks may be missing (pruned) or may not hash to the CID they are filed
/// under. Proof code re-hashes everything it reads.
///
/// Implementations might use:
/// - In-memory map parsed from a CAR ([`MemoryBlockStore`])
/// - A local block cache or remote HTTP storage (user-provided)
///
/// Fetches are async so remote implementations can suspend; any timeout or
/// retry policy belongs to the implementation.
///
/// # Example
///
/// ```rust,ignore
/// use skeetgate_repo::storage::{BlockStore, MemoryBlockStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut storage = MemoryBlockStore::new();
/// let cid = storage.insert(&b"hello world"[..])?;
///
/// if let Some(retrieved) = storage.get(&cid).await? {
///     assert_eq!(retrieved, &b"hello world"[..]);
/// }
/// # Ok(())
/// # }
/// ```
#[trait_variant::make(Send)]
pub trait BlockStore: Clone {
    /// Declared root CIDs of the snapshot
    fn roots(&self) -> Vec<IpldCid>;

    /// Get a block by CID
    ///
    /// Returns `None` if the block is not present.
    async fn get(&self, cid: &IpldCid) -> Result<Option<Bytes>>;

    /// Check if a block exists without retrieving it
    async fn has(&self, cid: &IpldCid) -> Result<bool>;

    /// Every CID held by the store
    async fn cids(&self) -> Result<Vec<IpldCid>>;

    /// Number of blocks held
    async fn len(&self) -> Result<usize>;
}

pub mod memory;

pub use memory::MemoryBlockStore;

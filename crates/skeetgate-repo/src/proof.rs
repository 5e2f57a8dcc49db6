//! Record inclusion proofs
//!
//! **Proof structure:**
//! - Signed root commit (signature + unsigned bytes)
//! - Every MST node the walk fetched and verified
//! - The target record
//!
//! **Proving:**
//! 1. Take the snapshot's single declared root as the commit
//! 2. Verify the commit hash, controller and signature
//! 3. Walk the MST exhaustively, verifying every held node
//! 4. Verify the target record's hash and `$type`
//! 5. Package the verified bytes
//!
//! Nothing is returned unless every step passed; there are no partial proofs.

use std::collections::BTreeMap;

use bytes::Bytes;
use cid::Cid as IpldCid;

use crate::car;
use crate::codec::Record;
use crate::commit::{ValidatedCommit, validate_commit};
use crate::crypto::VerificationMaterial;
use crate::error::{ProofError, Result};
use crate::hash;
use crate::mst::{PathStep, walk_tree};
use crate::record::RecordPath;
use crate::storage::{BlockStore, MemoryBlockStore};

/// Options for a proving call
#[derive(Debug, Clone, Default, bon::Builder)]
#[builder(start_fn = new)]
pub struct ProofOptions {
    /// Cap on node visits during the walk
    ///
    /// Defaults to the number of blocks in the store.
    pub max_steps: Option<usize>,
}

/// A verified inclusion proof for one record
#[derive(Debug, Clone)]
pub struct InclusionProof {
    /// The validated root commit
    pub commit: ValidatedCommit,
    /// Signed commit block as stored
    pub commit_block: Bytes,
    /// Path of the proven record
    pub path: RecordPath,
    /// Verified MST nodes, in visit order
    pub nodes: Vec<(IpldCid, Bytes)>,
    /// Path from the node holding the record up to the root
    pub node_path: Vec<PathStep>,
    /// CID of the target record
    pub target_cid: IpldCid,
    /// Raw target record bytes
    pub target_record: Bytes,
    /// Decoded target record
    pub record: Record,
}

impl InclusionProof {
    /// Signature over [`Self::unsigned_commit`]
    pub fn signature(&self) -> &[u8] {
        &self.commit.signature
    }

    /// Commit bytes without the signature
    pub fn unsigned_commit(&self) -> &[u8] {
        &self.commit.unsigned_bytes
    }

    /// Repository DID
    pub fn did(&self) -> &str {
        &self.commit.commit.did
    }

    /// Revision of the proven commit
    pub fn rev(&self) -> &str {
        &self.commit.commit.rev
    }

    /// Serialize to the verifier byte layout
    ///
    /// All integers are big-endian u32:
    ///
    /// | field | size |
    /// |---|---|
    /// | signature | 64 |
    /// | unsigned commit length, bytes | 4 + n |
    /// | node count N | 4 |
    /// | node SHA-256 digests | N × 32 |
    /// | node length, bytes | N × (4 + n) |
    /// | target record length, bytes | 4 + n |
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let node_bytes: usize = self.nodes.iter().map(|(_, b)| 4 + b.len()).sum();
        let mut out = Vec::with_capacity(
            self.signature().len()
                + 4
                + self.unsigned_commit().len()
                + 4
                + self.nodes.len() * hash::DIGEST_LEN
                + node_bytes
                + 4
                + self.target_record.len(),
        );

        out.extend_from_slice(self.signature());
        put_len_prefixed(&mut out, self.unsigned_commit())?;

        put_u32(&mut out, self.nodes.len())?;
        for (cid, _) in &self.nodes {
            out.extend_from_slice(&hash::cid_digest(cid)?);
        }
        for (_, bytes) in &self.nodes {
            put_len_prefixed(&mut out, bytes)?;
        }

        put_len_prefixed(&mut out, &self.target_record)?;
        Ok(out)
    }

    /// Export the proof blocks as a CAR rooted at the commit
    ///
    /// Holds the commit, every verified node and the record. Proving the same
    /// path from this CAR succeeds, since unvisited subtrees are pruned.
    pub async fn to_car_bytes(&self) -> Result<Vec<u8>> {
        let mut blocks = BTreeMap::new();
        blocks.insert(self.commit.cid, self.commit_block.clone());
        for (cid, bytes) in &self.nodes {
            blocks.insert(*cid, bytes.clone());
        }
        blocks.insert(self.target_cid, self.target_record.clone());
        car::write_car_bytes(self.commit.cid, blocks).await
    }
}

fn put_u32(out: &mut Vec<u8>, n: usize) -> Result<()> {
    let n = u32::try_from(n)
        .map_err(|_| ProofError::unsupported(format!("length {n} exceeds u32")))?;
    out.extend_from_slice(&n.to_be_bytes());
    Ok(())
}

fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    put_u32(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

/// Prove that `path` is included in the snapshot held by `store`
///
/// **Inputs:**
/// - `material`: the repository's signing key and controlling DID
/// - `store`: snapshot blocks with exactly one declared root (the commit)
/// - `path`: record to prove
///
/// **Errors:**
/// - zero roots is a schema error, several roots are unsupported
/// - an absent commit block or record is [`ProofError::NotFound`]
/// - hash, signature, schema, duplicate and cycle failures propagate from
///   the commit check and the walk
#[tracing::instrument(
    skip(material, store, path, options),
    fields(did_key = %material.did_key(), path = %path)
)]
pub async fn prove_inclusion<S: BlockStore + Sync + 'static>(
    material: &VerificationMaterial,
    store: &S,
    path: &RecordPath,
    options: &ProofOptions,
) -> Result<InclusionProof> {
    let root = match store.roots().as_slice() {
        [] => return Err(ProofError::schema("snapshot", "no root declared")),
        [root] => *root,
        roots => {
            return Err(ProofError::unsupported(format!(
                "snapshot declares {} roots",
                roots.len()
            )));
        }
    };

    let commit_block = store
        .get(&root)
        .await?
        .ok_or_else(|| ProofError::not_found(format!("root commit {root}")))?;
    let commit = validate_commit(material, &root, &commit_block)?;
    tracing::debug!(rev = %commit.commit.rev, data = %commit.tree_root(), "root commit ok");

    let outcome = walk_tree(store, commit.tree_root(), path, options.max_steps).await?;
    tracing::debug!(
        target_cid = %outcome.target_cid,
        nodes = outcome.visited.len(),
        "record included"
    );

    Ok(InclusionProof {
        commit,
        commit_block,
        path: path.clone(),
        nodes: outcome.visited,
        node_path: outcome.path,
        target_cid: outcome.target_cid,
        target_record: outcome.record_bytes,
        record: outcome.record,
    })
}

/// Prove inclusion from CAR bytes, e.g. a `com.atproto.sync.getRecord` body
pub async fn prove_inclusion_from_car(
    material: &VerificationMaterial,
    car_bytes: &[u8],
    path: &RecordPath,
    options: &ProofOptions,
) -> Result<InclusionProof> {
    let parsed = car::parse_car_bytes(car_bytes).await?;
    let store = MemoryBlockStore::from_car(parsed);
    prove_inclusion(material, &store, path, options).await
}

//! Exhaustive inclusion walk over an MST snapshot
//!
//! The walk does not stop at the first match. Every node reachable through
//! links the store actually holds is fetched, hashed and decoded, all
//! sibling sub-walks are awaited, and only then are the results combined.
//! A proof built from the outcome has therefore had every byte it carries
//! checked, whatever the unvisited (pruned) parts of the tree contain.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use cid::Cid as IpldCid;
use futures::future::join_all;

use crate::codec::Record;
use crate::error::{ProofError, Result};
use crate::hash;
use crate::mst::NodeData;
use crate::record::{RecordPath, validate_record};
use crate::storage::BlockStore;

/// One hop of the leaf-to-root path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    /// Node on the path
    pub node: IpldCid,
    /// Which link of `node` leads toward the target
    ///
    /// `0` is the left link `l`; `i + 1` is entry `i` (its `v` in the node
    /// that holds the target, its `t` in every node above it).
    pub hint: usize,
}

/// Result of a successful walk
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    /// CID of the target record
    pub target_cid: IpldCid,
    /// Decoded target record
    pub record: Record,
    /// Raw target record bytes
    pub record_bytes: Bytes,
    /// Every node that was fetched and verified, in pre-order visit order
    pub visited: Vec<(IpldCid, Bytes)>,
    /// Nodes from the one holding the target up to the root
    pub path: Vec<PathStep>,
}

#[derive(Debug)]
struct Found {
    target_cid: IpldCid,
    record: Record,
    record_bytes: Bytes,
    path: Vec<PathStep>,
}

#[derive(Debug, Default)]
struct SubWalk {
    visited: Vec<(IpldCid, Bytes)>,
    found: Option<Found>,
    matches: usize,
}

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<SubWalk>> + Send + 'a>>;

struct Walker<'a, S> {
    store: &'a S,
    target: &'a RecordPath,
    key: String,
    steps: AtomicUsize,
    limit: usize,
}

/// Walk the tree rooted at `root` looking for `target`
///
/// `max_steps` caps the number of node visits; without it the cap is the
/// number of blocks in the store. Exceeding the cap is a
/// [`ProofError::Cycle`]. Links to blocks the store does not hold are skipped.
#[tracing::instrument(level = "debug", skip(store, target), fields(path = %target))]
pub async fn walk_tree<S: BlockStore + Sync + 'static>(
    store: &S,
    root: &IpldCid,
    target: &RecordPath,
    max_steps: Option<usize>,
) -> Result<WalkOutcome> {
    let limit = match max_steps {
        Some(limit) => limit,
        None => store.len().await?,
    };

    let walker = Walker {
        store,
        target,
        key: target.key(),
        steps: AtomicUsize::new(0),
        limit,
    };

    if !store.has(root).await? {
        return Err(ProofError::not_found(format!("tree root {root}")));
    }

    let walked = walker.walk_node(*root, 0).await?;
    tracing::debug!(
        steps = walker.steps.load(Ordering::Relaxed),
        visited = walked.visited.len(),
        "walk complete"
    );

    let found = walked
        .found
        .ok_or_else(|| ProofError::not_found(format!("record {}", walker.key)))?;

    Ok(WalkOutcome {
        target_cid: found.target_cid,
        record: found.record,
        record_bytes: found.record_bytes,
        visited: walked.visited,
        path: found.path,
    })
}

impl<'a, S: BlockStore + Sync + 'static> Walker<'a, S> {
    fn walk_node(&'a self, cid: IpldCid, depth: usize) -> WalkFuture<'a> {
        Box::pin(async move {
            let steps = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
            if steps > self.limit {
                return Err(ProofError::Cycle {
                    steps,
                    limit: self.limit,
                });
            }

            let bytes = self
                .store
                .get(&cid)
                .await?
                .ok_or_else(|| ProofError::not_found(format!("tree node {cid}")))?;
            tracing::debug!(depth, %cid, "walking");

            hash::verify_block(&cid, &bytes)?;
            let node = NodeData::from_cbor(&bytes)?;
            let keys = node.reconstruct_keys()?;

            let mut slots = Vec::new();
            let mut branches: Vec<WalkFuture<'a>> = Vec::new();

            if let Some(left) = node.left {
                if self.store.has(&left).await? {
                    tracing::debug!(depth, %left, "pushing left path");
                    slots.push(0);
                    branches.push(self.walk_node(left, depth + 1));
                }
            }

            for (i, (entry, key)) in node.entries.iter().zip(keys.iter()).enumerate() {
                if let Some(tree) = entry.tree {
                    if self.store.has(&tree).await? {
                        tracing::debug!(depth, k = %String::from_utf8_lossy(key), %tree, "pushing right path");
                        slots.push(i + 1);
                        branches.push(self.walk_node(tree, depth + 1));
                    }
                }

                if key.as_slice() == self.key.as_bytes() {
                    tracing::debug!(depth, k = %self.key, v = %entry.value, "matching entry");
                    slots.push(i + 1);
                    branches.push(self.match_entry(entry.value));
                }
            }

            let results = join_all(branches).await;

            let mut combined = SubWalk {
                visited: vec![(cid, bytes)],
                ..Default::default()
            };
            let mut first_error = None;

            for (slot, result) in slots.into_iter().zip(results) {
                match result {
                    Ok(sub) => {
                        combined.visited.extend(sub.visited);
                        combined.matches += sub.matches;
                        if let Some(mut found) = sub.found {
                            found.path.push(PathStep { node: cid, hint: slot });
                            if combined.found.is_none() {
                                combined.found = Some(found);
                            }
                        }
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }
            if combined.matches > 1 {
                return Err(ProofError::DuplicateKey {
                    key: self.key.clone(),
                    count: combined.matches,
                });
            }
            if combined.found.is_some() {
                tracing::debug!(depth, %cid, "found target");
            }

            Ok(combined)
        })
    }

    fn match_entry(&'a self, value: IpldCid) -> WalkFuture<'a> {
        Box::pin(async move {
            let validated = validate_record(self.store, &value, &self.target.collection).await?;
            Ok(SubWalk {
                visited: Vec::new(),
                found: Some(Found {
                    target_cid: validated.cid,
                    record: validated.record,
                    record_bytes: validated.bytes,
                    path: Vec::new(),
                }),
                matches: 1,
            })
        })
    }
}

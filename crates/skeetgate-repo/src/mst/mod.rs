//! Merkle Search Tree node model and inclusion walk
//!
//! Nodes are read straight from their wire form (`{l, e: [{k, p, t, v}]}`);
//! there is no in-memory tree. The walk in [`walk`] verifies every node it
//! reaches and reports the one path that ends in the target record.

pub mod node;
pub mod walk;

pub use node::{NodeData, TreeEntry};
pub use walk::{PathStep, WalkOutcome, walk_tree};

/// Count shared prefix length between two byte keys
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

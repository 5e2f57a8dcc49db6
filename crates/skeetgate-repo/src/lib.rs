//! AT Protocol record inclusion proofs
//!
//! This crate checks that a record is part of a signed repository snapshot
//! and packages the evidence for an external verifier:
//!
//! - **Commits**: Signed root commit validation (hash, controller, signature)
//! - **MST walk**: Exhaustive search with compressed-key reconstruction and per-node hash checks
//! - **Proofs**: Signature, unsigned commit, verified nodes and target record in an exact byte layout
//! - **Chain payload**: `v`/`r`/`s` split and leaf-to-root node hints for on-chain replay
//! - **CAR I/O**: Read snapshots and export proofs in CAR (Content Addressable aRchive) format
//! - **Storage**: Async block storage abstraction with an in-memory implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use skeetgate_repo::{ProofOptions, RecordPath, prove_inclusion_from_car};
//!
//! # async fn example(material: skeetgate_repo::VerificationMaterial, car: Vec<u8>) -> skeetgate_repo::Result<()> {
//! let path: RecordPath = "app.bsky.feed.post/3l4qpz7ajrc2a".parse()?;
//! let proof = prove_inclusion_from_car(&material, &car, &path, &ProofOptions::default()).await?;
//!
//! println!("record {} at rev {}", proof.target_cid, proof.rev());
//! let artifact = proof.to_bytes()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

/// CAR (Content Addressable aRchive) utilities
pub mod car;
pub mod codec;
/// Commit structures and signature verification
pub mod commit;
pub mod crypto;
pub mod error;
pub mod hash;
/// Merkle Search Tree node model and walk
pub mod mst;
pub mod payload;
pub mod proof;
pub mod record;
/// Block storage abstraction
pub mod storage;

pub use codec::{Record, RepoBlock};
pub use commit::{Commit, SigningKey, ValidatedCommit, validate_commit};
pub use crypto::{KeyCodec, PublicKey, VerificationMaterial};
pub use error::{ProofError, ProofErrorKind, Result};
pub use mst::{NodeData, PathStep, TreeEntry, WalkOutcome, walk_tree};
pub use payload::ChainSubmission;
pub use proof::{InclusionProof, ProofOptions, prove_inclusion, prove_inclusion_from_car};
pub use record::{RecordPath, ValidatedRecord, validate_record};
pub use storage::{BlockStore, MemoryBlockStore};

/// DAG-CBOR codec identifier for CIDs (0x71)
pub const DAG_CBOR_CID_CODEC: u64 = 0x71;

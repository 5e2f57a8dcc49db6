//! Content hashing and CID checks

use crate::error::{ProofError, Result};
use cid::Cid as IpldCid;
use sha2::{Digest, Sha256};

/// Multihash code for SHA2-256
pub const SHA2_256: u64 = 0x12;

/// Size of a SHA2-256 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Compute the SHA2-256 digest of a block
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

/// Compute CID from raw bytes
///
/// Uses SHA-256 hash and DAG-CBOR codec. Assumes data is already DAG-CBOR encoded.
pub fn compute_cid(data: &[u8]) -> Result<IpldCid> {
    let hash = sha256(data);
    let mh = multihash::Multihash::<64>::wrap(SHA2_256, &hash)
        .map_err(|e| ProofError::schema("multihash", e.to_string()))?;

    Ok(IpldCid::new_v1(crate::DAG_CBOR_CID_CODEC, mh))
}

/// Raw digest carried by a CID
///
/// Fails with [`ProofError::Unsupported`] for anything but SHA2-256.
pub fn cid_digest(cid: &IpldCid) -> Result<[u8; DIGEST_LEN]> {
    let mh = cid.hash();
    if mh.code() != SHA2_256 {
        return Err(ProofError::unsupported(format!(
            "hash function 0x{:x} in {}",
            mh.code(),
            cid
        )));
    }
    mh.digest()
        .try_into()
        .map_err(|_| ProofError::schema("CID", format!("digest length {}", mh.digest().len())))
}

/// Check the content-addressing invariant for a block
///
/// The SHA2-256 digest of `data` must equal the digest inside `cid`.
pub fn verify_block(cid: &IpldCid, data: &[u8]) -> Result<()> {
    let expected = cid_digest(cid)?;
    let actual = sha256(data);
    if expected != actual {
        return Err(ProofError::Integrity {
            cid: cid.to_string(),
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

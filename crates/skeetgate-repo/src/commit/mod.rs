//! Commit structures and signature verification for AT Protocol repositories.
//!
//! The root block of a repository snapshot is a signed commit. Validating it
//! yields the three things an external verifier needs to replay the check:
//! the signature, the exact unsigned bytes that were signed, and the MST root.

pub(crate) mod serde_bytes_helper;

use crate::codec;
use crate::crypto::VerificationMaterial;
use crate::error::{ProofError, Result};
use crate::hash;
use bytes::Bytes;
use cid::Cid as IpldCid;
use ipld_core::ipld::Ipld;

/// Commit version this crate accepts
pub const COMMIT_VERSION: i64 = 3;

/// Length of a compact curve signature
pub const SIGNATURE_LEN: usize = 64;

/// Repository commit object
///
/// This structure represents a signed commit in an AT Protocol repository.
/// Stored as a block in CAR files, identified by its CID.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Commit {
    /// Repository DID
    pub did: String,

    /// Commit version (3)
    pub version: i64,

    /// MST root CID
    pub data: IpldCid,

    /// Revision TID
    pub rev: String,

    /// Previous commit CID
    ///
    /// Serializes as explicit `null` when None.
    #[serde(default)]
    pub prev: Option<IpldCid>,

    /// Signature bytes
    #[serde(with = "serde_bytes_helper")]
    pub sig: Bytes,
}

impl Commit {
    /// Create new unsigned commit (version = 3, sig empty)
    pub fn new_unsigned(
        did: impl Into<String>,
        data: IpldCid,
        rev: impl Into<String>,
        prev: Option<IpldCid>,
    ) -> Self {
        Self {
            did: did.into(),
            version: COMMIT_VERSION,
            data,
            rev: rev.into(),
            prev,
            sig: Bytes::new(),
        }
    }

    /// Sign this commit with a key
    pub fn sign(mut self, key: &impl SigningKey) -> Result<Self> {
        let unsigned = self.unsigned_bytes()?;
        self.sig = key.sign_bytes(&unsigned)?;
        Ok(self)
    }

    /// Bytes covered by the signature
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        strip_signature(&self.to_cbor()?)
    }

    /// Serialize to DAG-CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Deserialize from DAG-CBOR
    ///
    /// Rejects anything that is not a version 3 commit with a 64-byte signature.
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        let commit: Commit = serde_ipld_dagcbor::from_slice(data)
            .map_err(|e| ProofError::schema("commit", e.to_string()))?;
        if commit.version != COMMIT_VERSION {
            return Err(ProofError::schema(
                "commit",
                format!("unsupported version {}", commit.version),
            ));
        }
        if commit.sig.len() != SIGNATURE_LEN {
            return Err(ProofError::schema(
                "commit",
                format!("signature is {} bytes, expected {}", commit.sig.len(), SIGNATURE_LEN),
            ));
        }
        Ok(commit)
    }

    /// Compute CID of this commit
    pub fn to_cid(&self) -> Result<IpldCid> {
        hash::compute_cid(&self.to_cbor()?)
    }
}

/// Re-encode a signed commit block without its `sig` field
///
/// Every other field is carried over as decoded, so the output is exactly
/// what the repository signed.
pub fn strip_signature(signed: &[u8]) -> Result<Vec<u8>> {
    let mut map = codec::decode_map("commit", signed)?;
    map.remove("sig");
    codec::encode(&Ipld::Map(map))
}

/// Output of commit validation
#[derive(Debug, Clone)]
pub struct ValidatedCommit {
    /// CID of the commit block
    pub cid: IpldCid,
    /// Decoded commit
    pub commit: Commit,
    /// Signature over `unsigned_bytes`
    pub signature: Bytes,
    /// DAG-CBOR encoding of the commit without `sig`
    pub unsigned_bytes: Bytes,
}

impl ValidatedCommit {
    /// MST root referenced by the commit
    pub fn tree_root(&self) -> &IpldCid {
        &self.commit.data
    }
}

/// Validate a signed root commit
///
/// Checks, in order: the block hash against `cid`, the commit schema
/// (version 3, 64-byte signature), that `material` is controlled by the
/// commit's DID, and the signature over the unsigned commit bytes.
#[tracing::instrument(level = "debug", skip(material, data), fields(did_key = %material.did_key()))]
pub fn validate_commit(
    material: &VerificationMaterial,
    cid: &IpldCid,
    data: &[u8],
) -> Result<ValidatedCommit> {
    hash::verify_block(cid, data)?;
    tracing::debug!("commit hash valid");

    let commit = Commit::from_cbor(data)?;

    if material.controller != commit.did {
        return Err(ProofError::ControllerMismatch {
            controller: material.controller.clone(),
            commit_did: commit.did.clone(),
        });
    }

    let unsigned = strip_signature(data)?;
    material.public_key.verify(&unsigned, &commit.sig)?;
    tracing::debug!(did = %commit.did, rev = %commit.rev, "commit signature valid");

    Ok(ValidatedCommit {
        cid: *cid,
        signature: commit.sig.clone(),
        unsigned_bytes: Bytes::from(unsigned),
        commit,
    })
}

/// Trait for signing keys.
///
/// Implemented for ed25519_dalek::SigningKey, k256::ecdsa::SigningKey, and p256::ecdsa::SigningKey.
pub trait SigningKey {
    /// Sign the given data and return signature as Bytes
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes>;
}

impl SigningKey for ed25519_dalek::SigningKey {
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes> {
        use ed25519_dalek::Signer;
        let sig = Signer::sign(self, data);
        Ok(Bytes::copy_from_slice(&sig.to_bytes()))
    }
}

impl SigningKey for k256::ecdsa::SigningKey {
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes> {
        use k256::ecdsa::signature::Signer;
        let sig: k256::ecdsa::Signature = Signer::sign(self, data);
        Ok(Bytes::copy_from_slice(&sig.to_bytes()))
    }
}

impl SigningKey for p256::ecdsa::SigningKey {
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes> {
        use p256::ecdsa::signature::Signer;
        let sig: p256::ecdsa::Signature = Signer::sign(self, data);
        // normalize to low-S, which atproto requires for P-256 too
        let sig = sig.normalize_s().unwrap_or(sig);
        Ok(Bytes::copy_from_slice(&sig.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PublicKey;
    use crate::error::ProofErrorKind;
    use rand::rngs::OsRng;

    fn test_cid(n: u8) -> IpldCid {
        hash::compute_cid(&[n; 8]).unwrap()
    }

    fn signed(sk: &k256::ecdsa::SigningKey, did: &str) -> (IpldCid, Vec<u8>) {
        let commit = Commit::new_unsigned(did, test_cid(1), "3l4qpz7ajrc2a", None)
            .sign(sk)
            .unwrap();
        let bytes = commit.to_cbor().unwrap();
        (hash::compute_cid(&bytes).unwrap(), bytes)
    }

    fn material(sk: &k256::ecdsa::SigningKey, did: &str) -> VerificationMaterial {
        VerificationMaterial::new(PublicKey::from_k256(sk.verifying_key()), did)
    }

    #[test]
    fn validates_signed_commit() {
        let sk = k256::ecdsa::SigningKey::random(&mut OsRng);
        let (cid, bytes) = signed(&sk, "did:plc:test");

        let validated = validate_commit(&material(&sk, "did:plc:test"), &cid, &bytes).unwrap();
        assert_eq!(validated.tree_root(), &test_cid(1));
        assert_eq!(validated.signature.len(), SIGNATURE_LEN);
        assert_eq!(
            validated.unsigned_bytes.as_ref(),
            validated.commit.unsigned_bytes().unwrap().as_slice()
        );
        // the unsigned form carries no sig key
        let map = codec::decode_map("commit", &validated.unsigned_bytes).unwrap();
        assert!(!map.contains_key("sig"));
        assert!(map.contains_key("prev"));
    }

    #[test]
    fn wrong_key_is_signature_error() {
        let sk = k256::ecdsa::SigningKey::random(&mut OsRng);
        let other = k256::ecdsa::SigningKey::random(&mut OsRng);
        let (cid, bytes) = signed(&sk, "did:plc:test");

        let err = validate_commit(&material(&other, "did:plc:test"), &cid, &bytes).unwrap_err();
        assert!(matches!(err, ProofError::Signature { .. }));
    }

    #[test]
    fn controller_must_match_commit_did() {
        let sk = k256::ecdsa::SigningKey::random(&mut OsRng);
        let (cid, bytes) = signed(&sk, "did:plc:test");

        let err = validate_commit(&material(&sk, "did:plc:other"), &cid, &bytes).unwrap_err();
        assert!(matches!(err, ProofError::ControllerMismatch { .. }));
        assert_eq!(err.kind(), ProofErrorKind::Signature);
    }

    #[test]
    fn hash_checked_before_decoding() {
        let sk = k256::ecdsa::SigningKey::random(&mut OsRng);
        let (_, bytes) = signed(&sk, "did:plc:test");

        let err = validate_commit(&material(&sk, "did:plc:test"), &test_cid(9), &bytes)
            .unwrap_err();
        assert_eq!(err.kind(), ProofErrorKind::Integrity);
    }

    #[test]
    fn version_two_is_rejected() {
        let sk = k256::ecdsa::SigningKey::random(&mut OsRng);
        let mut commit = Commit::new_unsigned("did:plc:test", test_cid(1), "1", None);
        commit.version = 2;
        let commit = commit.sign(&sk).unwrap();
        let bytes = commit.to_cbor().unwrap();
        let cid = hash::compute_cid(&bytes).unwrap();

        let err = validate_commit(&material(&sk, "did:plc:test"), &cid, &bytes).unwrap_err();
        assert_eq!(err.kind(), ProofErrorKind::Schema);
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn short_signature_is_schema_error() {
        let mut commit = Commit::new_unsigned("did:plc:test", test_cid(1), "1", None);
        commit.sig = Bytes::from_static(&[1, 2, 3]);
        let bytes = commit.to_cbor().unwrap();

        let err = Commit::from_cbor(&bytes).unwrap_err();
        assert_eq!(err.kind(), ProofErrorKind::Schema);
    }

    #[test]
    fn ed25519_and_p256_commits_validate() {
        let ed = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let commit = Commit::new_unsigned("did:plc:ed", test_cid(2), "1", None)
            .sign(&ed)
            .unwrap();
        let bytes = commit.to_cbor().unwrap();
        let cid = hash::compute_cid(&bytes).unwrap();
        let mat = VerificationMaterial::new(PublicKey::from_ed25519(&ed.verifying_key()), "did:plc:ed");
        validate_commit(&mat, &cid, &bytes).unwrap();

        let p = p256::ecdsa::SigningKey::random(&mut OsRng);
        let commit = Commit::new_unsigned("did:plc:p", test_cid(3), "1", Some(test_cid(4)))
            .sign(&p)
            .unwrap();
        let bytes = commit.to_cbor().unwrap();
        let cid = hash::compute_cid(&bytes).unwrap();
        let mat = VerificationMaterial::new(PublicKey::from_p256(p.verifying_key()), "did:plc:p");
        validate_commit(&mat, &cid, &bytes).unwrap();
    }
}

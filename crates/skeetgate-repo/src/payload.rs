//! Chain submission payload
//!
//! An on-chain verifier replays a proof with `ecrecover` and bottom-up hashing.
//! It takes the signature split into `r`, `s` and a recovery value `v`, the
//! unsigned commit, the path nodes ordered from the record's node up to the
//! root, and for each node a hint saying which link holds the hash of the
//! level below.

use std::collections::BTreeMap;

use bytes::Bytes;
use cid::Cid as IpldCid;
use smol_str::SmolStr;

use crate::crypto::{KeyCodec, VerificationMaterial};
use crate::error::{ProofError, Result};
use crate::proof::InclusionProof;

/// Offset added to the recovery id to form `v`
pub const RECOVERY_OFFSET: u8 = 27;

/// Arguments for an on-chain inclusion check
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSubmission {
    /// Recovery value, `27 + recovery id`
    pub v: u8,
    /// First 32 bytes of the signature
    #[serde(with = "hex_bytes")]
    pub r: Bytes,
    /// Last 32 bytes of the signature
    #[serde(with = "hex_bytes")]
    pub s: Bytes,
    /// Unsigned commit bytes
    #[serde(with = "hex_bytes")]
    pub commit: Bytes,
    /// Path node bytes, record's node first and root last
    #[serde(with = "hex_bytes_list")]
    pub nodes: Vec<Bytes>,
    /// Per node: `0` for the left link, `i + 1` for entry `i`
    pub node_hints: Vec<usize>,
    /// Target record bytes
    #[serde(with = "hex_bytes")]
    pub target: Bytes,
    /// Collection of the target
    pub collection: SmolStr,
    /// Record key of the target
    pub rkey: SmolStr,
}

impl ChainSubmission {
    /// Build the payload for a verified proof
    ///
    /// `v` is found by trial recovery of the signing key from the signature,
    /// so only secp256k1 keys can be submitted.
    pub fn from_proof(proof: &InclusionProof, material: &VerificationMaterial) -> Result<Self> {
        if material.public_key.codec != KeyCodec::Secp256k1 {
            return Err(ProofError::unsupported(format!(
                "chain submission needs a secp256k1 key, got {:?}",
                material.public_key.codec
            )));
        }

        let signature = proof.signature();
        let v = recovery_value(material, proof.unsigned_commit(), signature)?;

        let by_cid: BTreeMap<&IpldCid, &Bytes> =
            proof.nodes.iter().map(|(cid, bytes)| (cid, bytes)).collect();
        let mut nodes = Vec::with_capacity(proof.node_path.len());
        let mut node_hints = Vec::with_capacity(proof.node_path.len());
        for step in &proof.node_path {
            let bytes = by_cid
                .get(&step.node)
                .ok_or_else(|| ProofError::not_found(format!("path node {}", step.node)))?;
            nodes.push((*bytes).clone());
            node_hints.push(step.hint);
        }

        Ok(Self {
            v,
            r: Bytes::copy_from_slice(&signature[..32]),
            s: Bytes::copy_from_slice(&signature[32..]),
            commit: Bytes::copy_from_slice(proof.unsigned_commit()),
            nodes,
            node_hints,
            target: proof.target_record.clone(),
            collection: proof.path.collection.clone(),
            rkey: proof.path.rkey.clone(),
        })
    }

    /// Render as pretty JSON with `0x` hex byte fields
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ProofError::schema("chain submission", e.to_string()))
    }
}

fn recovery_value(
    material: &VerificationMaterial,
    message: &[u8],
    signature: &[u8],
) -> Result<u8> {
    use k256::ecdsa::{RecoveryId, Signature};

    let failed = |source: crate::error::BoxError| ProofError::Signature {
        did_key: material.did_key(),
        source: Some(source),
    };

    let vk = material.public_key.to_k256()?;
    let sig = Signature::from_slice(signature).map_err(|e| failed(Box::new(e)))?;
    let recid =
        RecoveryId::trial_recovery_from_msg(&vk, message, &sig).map_err(|e| failed(Box::new(e)))?;
    Ok(RECOVERY_OFFSET + recid.to_byte())
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }
}

mod hex_bytes_list {
    use bytes::Bytes;
    use serde::Serializer;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(list: &[Bytes], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(list.len()))?;
        for bytes in list {
            seq.serialize_element(&format!("0x{}", hex::encode(bytes)))?;
        }
        seq.end()
    }
}

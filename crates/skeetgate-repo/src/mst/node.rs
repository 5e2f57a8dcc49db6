//! MST node data structures

use bytes::Bytes;
use cid::Cid as IpldCid;

use crate::error::{ProofError, Result};
use crate::{codec, hash};

/// Wire format entry (prefix-compressed leaf with optional subtree pointer)
///
/// **IMPORTANT:** Fields are declared in DAG-CBOR canonical order (k, p, t, v).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TreeEntry {
    /// Key suffix after prefix (stored as bytes in wire format)
    ///
    /// Must use serde_bytes to serialize as CBOR byte string (major type 2)
    /// instead of array of integers (major type 4)
    #[serde(rename = "k", with = "crate::commit::serde_bytes_helper")]
    pub key_suffix: Bytes,

    /// Prefix length (bytes shared with the previous key in this node)
    #[serde(rename = "p")]
    pub prefix_len: usize,

    /// Optional subtree pointer (CID of child MST node)
    ///
    /// Serializes as explicit `null` when None.
    #[serde(rename = "t")]
    pub tree: Option<IpldCid>,

    /// CID of the record value
    #[serde(rename = "v")]
    pub value: IpldCid,
}

/// Wire format node data (serialized as DAG-CBOR)
///
/// `left` points at the subtree holding keys below the first entry; each
/// entry's `tree` points at the subtree holding keys between that entry and
/// the next.
///
/// # Nullability requirement
///
/// All `Option<T>` fields serialize as explicit `null` (not skipped).
/// Skipping vs explicit null produces different CBOR bytes and so different CIDs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeData {
    /// Left-most subtree pointer
    #[serde(rename = "l")]
    pub left: Option<IpldCid>,

    /// Entries in this node (sorted by full key, prefix-compressed)
    #[serde(rename = "e")]
    pub entries: Vec<TreeEntry>,
}

impl NodeData {
    /// Build a node from full keys, applying prefix compression
    ///
    /// Entries are taken in the given order and not checked; this is how
    /// fixtures (including deliberately malformed ones) are produced.
    pub fn compress<K: AsRef<[u8]>>(
        left: Option<IpldCid>,
        leaves: impl IntoIterator<Item = (K, IpldCid, Option<IpldCid>)>,
    ) -> Self {
        let mut entries = Vec::new();
        let mut prev: Vec<u8> = Vec::new();
        for (key, value, tree) in leaves {
            let key = key.as_ref();
            let prefix_len = super::common_prefix_len(&prev, key);
            entries.push(TreeEntry {
                key_suffix: Bytes::copy_from_slice(&key[prefix_len..]),
                prefix_len,
                tree,
                value,
            });
            prev = key.to_vec();
        }
        Self { left, entries }
    }

    /// Decode a node from DAG-CBOR
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        serde_ipld_dagcbor::from_slice(data).map_err(|e| ProofError::schema("tree node", e.to_string()))
    }

    /// Serialize to DAG-CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Compute CID of this node
    pub fn to_cid(&self) -> Result<IpldCid> {
        hash::compute_cid(&self.to_cbor()?)
    }

    /// Expand the prefix-compressed keys of every entry
    ///
    /// Each key is `previous_key[..p] ++ k`, starting from the empty key.
    /// Keys must be strictly increasing: a repeated key is
    /// [`ProofError::DuplicateKey`], a decreasing one or a `p` longer than
    /// the previous key is a schema error.
    pub fn reconstruct_keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut keys: Vec<Vec<u8>> = Vec::with_capacity(self.entries.len());

        for (i, entry) in self.entries.iter().enumerate() {
            let prev: &[u8] = keys.last().map(Vec::as_slice).unwrap_or_default();
            if entry.prefix_len > prev.len() {
                return Err(ProofError::schema(
                    "tree node",
                    format!(
                        "entry {} prefix length {} exceeds previous key length {}",
                        i,
                        entry.prefix_len,
                        prev.len()
                    ),
                ));
            }

            let mut key = Vec::with_capacity(entry.prefix_len + entry.key_suffix.len());
            key.extend_from_slice(&prev[..entry.prefix_len]);
            key.extend_from_slice(&entry.key_suffix);

            if i > 0 {
                match key.as_slice().cmp(prev) {
                    std::cmp::Ordering::Greater => {}
                    std::cmp::Ordering::Equal => {
                        return Err(ProofError::DuplicateKey {
                            key: String::from_utf8_lossy(&key).into_owned(),
                            count: 2,
                        });
                    }
                    std::cmp::Ordering::Less => {
                        return Err(ProofError::schema(
                            "tree node",
                            format!("entry {} key is out of order", i),
                        ));
                    }
                }
            }

            keys.push(key);
        }

        Ok(keys)
    }
}

//! DAG-CBOR record codec
//!
//! Repository blocks come in three shapes: signed commits, MST nodes and
//! generic records. [`RepoBlock::decode`] classifies a block by its top-level
//! map keys and then runs the typed, schema-validating parse for that shape.
//! Callers that already know what they expect use the typed decoders
//! ([`Commit::from_cbor`], [`NodeData::from_cbor`], [`Record::from_cbor`])
//! directly.

use std::collections::BTreeMap;

use crate::commit::Commit;
use crate::error::{ProofError, Result};
use crate::mst::NodeData;
use ipld_core::ipld::Ipld;
use serde::Serialize;

/// Field holding a record's declared type
pub const TYPE_FIELD: &str = "$type";

/// Deterministically encode a value as DAG-CBOR
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| ProofError::schema("DAG-CBOR", e.to_string()))
}

/// Decode DAG-CBOR bytes into a top-level map
pub fn decode_map(what: &'static str, data: &[u8]) -> Result<BTreeMap<String, Ipld>> {
    let ipld: Ipld =
        serde_ipld_dagcbor::from_slice(data).map_err(|e| ProofError::schema(what, e.to_string()))?;
    match ipld {
        Ipld::Map(map) => Ok(map),
        _ => Err(ProofError::schema(what, "top-level value is not a map")),
    }
}

/// A decoded repository block
#[derive(Debug, Clone)]
pub enum RepoBlock {
    /// Signed repository commit
    Commit(Commit),
    /// MST node
    TreeNode(NodeData),
    /// Any other record
    Record(Record),
}

impl RepoBlock {
    /// Decode a block, picking the shape from its top-level keys
    pub fn decode(data: &[u8]) -> Result<Self> {
        let map = decode_map("block", data)?;
        let is_commit = ["did", "version", "data", "rev", "sig"]
            .iter()
            .all(|k| map.contains_key(*k));
        let is_node = map.len() == 2 && map.contains_key("l") && map.contains_key("e");

        if is_commit {
            Commit::from_cbor(data).map(RepoBlock::Commit)
        } else if is_node {
            NodeData::from_cbor(data).map(RepoBlock::TreeNode)
        } else {
            Ok(RepoBlock::Record(Record(map)))
        }
    }
}

/// A generic repository record
///
/// Kept as its decoded IPLD map so it can be inspected and re-encoded
/// without a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Record(BTreeMap<String, Ipld>);

impl Record {
    /// Decode a record from DAG-CBOR
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        decode_map("record", data).map(Record)
    }

    /// Build a record from fields
    pub fn from_fields(fields: BTreeMap<String, Ipld>) -> Self {
        Record(fields)
    }

    /// Re-encode as DAG-CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        encode(&self.0)
    }

    /// Declared `$type`, if it is a string
    pub fn type_tag(&self) -> Option<&str> {
        self.get_str(TYPE_FIELD)
    }

    /// Field value
    pub fn get(&self, field: &str) -> Option<&Ipld> {
        self.0.get(field)
    }

    /// String field value
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.0.get(field) {
            Some(Ipld::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// All fields
    pub fn fields(&self) -> &BTreeMap<String, Ipld> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProofErrorKind;

    fn post(text: &str) -> Record {
        let mut fields = BTreeMap::new();
        fields.insert(TYPE_FIELD.to_string(), Ipld::String("app.bsky.feed.post".into()));
        fields.insert("text".to_string(), Ipld::String(text.into()));
        Record::from_fields(fields)
    }

    #[test]
    fn record_round_trips_through_cbor() {
        let rec = post("hello");
        let bytes = rec.to_cbor().unwrap();
        let back = Record::from_cbor(&bytes).unwrap();
        assert_eq!(back.type_tag(), Some("app.bsky.feed.post"));
        assert_eq!(back.get_str("text"), Some("hello"));
        assert_eq!(back.to_cbor().unwrap(), bytes);
    }

    #[test]
    fn classifies_node_and_record() {
        let node = NodeData {
            left: None,
            entries: vec![],
        };
        let bytes = encode(&node).unwrap();
        assert!(matches!(RepoBlock::decode(&bytes).unwrap(), RepoBlock::TreeNode(_)));

        let bytes = post("hi").to_cbor().unwrap();
        assert!(matches!(RepoBlock::decode(&bytes).unwrap(), RepoBlock::Record(_)));
    }

    #[test]
    fn non_map_is_schema_error() {
        let bytes = encode(&vec![1u8, 2, 3]).unwrap();
        let err = RepoBlock::decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), ProofErrorKind::Schema);

        let err = Record::from_cbor(b"\xff\x00").unwrap_err();
        assert_eq!(err.kind(), ProofErrorKind::Schema);
    }
}

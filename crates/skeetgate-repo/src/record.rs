//! Record paths and target record validation

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use cid::Cid as IpldCid;
use smol_str::SmolStr;

use crate::codec::Record;
use crate::error::{ProofError, Result};
use crate::hash;
use crate::storage::BlockStore;

/// Location of a record inside a repository: `collection/rkey`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPath {
    /// Collection NSID, e.g. `app.bsky.feed.post`
    pub collection: SmolStr,
    /// Record key within the collection
    pub rkey: SmolStr,
}

impl RecordPath {
    /// Create a path from its parts
    pub fn new(collection: impl AsRef<str>, rkey: impl AsRef<str>) -> Result<Self> {
        let collection = collection.as_ref();
        let rkey = rkey.as_ref();
        if collection.is_empty() || rkey.is_empty() {
            return Err(ProofError::schema(
                "record path",
                "collection and rkey must both be non-empty",
            ));
        }
        if collection.contains('/') {
            return Err(ProofError::schema("record path", "collection contains '/'"));
        }
        Ok(Self {
            collection: SmolStr::new(collection),
            rkey: SmolStr::new(rkey),
        })
    }

    /// Parse `collection/rkey`, splitting on the first `/`
    pub fn parse(path: &str) -> Result<Self> {
        let (collection, rkey) = path
            .split_once('/')
            .ok_or_else(|| ProofError::schema("record path", format!("no '/' in {path:?}")))?;
        Self::new(collection, rkey)
    }

    /// MST key for this record
    pub fn key(&self) -> String {
        format!("{}/{}", self.collection, self.rkey)
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.rkey)
    }
}

impl FromStr for RecordPath {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A target record whose bytes matched its CID
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    /// CID the record was reached under
    pub cid: IpldCid,
    /// Decoded record
    pub record: Record,
    /// Raw DAG-CBOR bytes
    pub bytes: Bytes,
}

/// Fetch and check the record an MST entry points at
///
/// The bytes must be present, hash to `cid`, decode to a map, and carry a
/// `$type` equal to `collection`.
pub async fn validate_record<S: BlockStore + Sync>(
    store: &S,
    cid: &IpldCid,
    collection: &str,
) -> Result<ValidatedRecord> {
    tracing::debug!(%cid, collection, "validating record");

    let bytes = store
        .get(cid)
        .await?
        .ok_or_else(|| ProofError::not_found(format!("record block {cid}")))?;
    hash::verify_block(cid, &bytes)?;
    tracing::debug!(%cid, "valid record hash");

    let record = Record::from_cbor(&bytes)?;
    match record.type_tag() {
        Some(t) if t == collection => {}
        Some(t) => {
            return Err(ProofError::schema(
                "record",
                format!("$type {t} does not match collection {collection}"),
            ));
        }
        None => return Err(ProofError::schema("record", "missing $type")),
    }

    Ok(ValidatedRecord {
        cid: *cid,
        record,
        bytes,
    })
}

//! Error types for inclusion proof operations

use std::error::Error;

/// Boxed error type for error sources
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type alias for proof operations
pub type Result<T> = std::result::Result<T, ProofError>;

/// Inclusion proof error with rich diagnostics
///
/// Every variant is terminal for the verification call that produced it.
/// Only [`ProofErrorKind::Storage`] failures are worth retrying, and that is
/// the caller's decision.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ProofError {
    /// Block bytes do not hash to the digest carried by their CID
    #[error("hash mismatch for {cid}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(proof::integrity),
        help("the block was tampered with or filed under the wrong CID")
    )]
    Integrity {
        /// CID the bytes were claimed under
        cid: String,
        /// Hex digest carried by the CID
        expected: String,
        /// Hex digest of the bytes actually supplied
        actual: String,
    },

    /// Commit signature did not verify
    #[error("commit signature invalid for {did_key}")]
    #[diagnostic(
        code(proof::signature),
        help("the commit must be signed by the repository's current signing key")
    )]
    Signature {
        /// `did:key` identifier of the key used to verify
        did_key: String,
        /// Underlying crypto failure, when there is one
        #[source]
        source: Option<BoxError>,
    },

    /// Verification material belongs to a different identity than the commit
    #[error("verification method controlled by {controller}, commit is for {commit_did}")]
    #[diagnostic(
        code(proof::controller_mismatch),
        help("resolve the verification material for the repository's own DID")
    )]
    ControllerMismatch {
        /// Controller of the verification material
        controller: String,
        /// DID declared in the commit
        commit_did: String,
    },

    /// Bytes do not decode to the expected record shape
    #[error("invalid {what}: {reason}")]
    #[diagnostic(code(proof::schema))]
    Schema {
        /// What was being decoded
        what: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// More than one entry matched the same key
    #[error("key {key} found {count} times")]
    #[diagnostic(
        code(proof::duplicate_key),
        help("MST keys are unique; the tree is malformed")
    )]
    DuplicateKey {
        /// The duplicated key
        key: String,
        /// Number of matches seen
        count: usize,
    },

    /// The walk visited more nodes than the store could hold without repeats
    #[error("tree walk exceeded {limit} steps (possible cycle)")]
    #[diagnostic(
        code(proof::cycle),
        help("node links revisit blocks; the tree is not a tree")
    )]
    Cycle {
        /// Steps taken when the guard tripped
        steps: usize,
        /// Step budget
        limit: usize,
    },

    /// Requested block or key is absent
    #[error("{what} not found")]
    #[diagnostic(code(proof::not_found))]
    NotFound {
        /// Description of what was missing
        what: String,
    },

    /// Input uses something this crate does not handle
    #[error("unsupported: {0}")]
    #[diagnostic(code(proof::unsupported))]
    Unsupported(String),

    /// Block store failed to serve a request
    #[error("block store failure")]
    #[diagnostic(code(proof::storage))]
    Storage {
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// CAR parsing or writing failed
    #[error("CAR operation failed")]
    #[diagnostic(code(proof::car))]
    Car {
        /// Underlying error
        #[source]
        source: BoxError,
    },
}

/// Error categories for proof operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofErrorKind {
    /// Content hash mismatch
    Integrity,
    /// Bad signature or wrong key
    Signature,
    /// Undecodable or mistyped record
    Schema,
    /// Key appears more than once
    DuplicateKey,
    /// Cycle guard tripped
    Cycle,
    /// Block or key absent
    NotFound,
    /// Unsupported input
    Unsupported,
    /// Storage or transport failure
    Storage,
}

impl ProofError {
    /// Get the error category
    pub fn kind(&self) -> ProofErrorKind {
        match self {
            ProofError::Integrity { .. } => ProofErrorKind::Integrity,
            ProofError::Signature { .. } | ProofError::ControllerMismatch { .. } => {
                ProofErrorKind::Signature
            }
            ProofError::Schema { .. } => ProofErrorKind::Schema,
            ProofError::DuplicateKey { .. } => ProofErrorKind::DuplicateKey,
            ProofError::Cycle { .. } => ProofErrorKind::Cycle,
            ProofError::NotFound { .. } => ProofErrorKind::NotFound,
            ProofError::Unsupported(_) => ProofErrorKind::Unsupported,
            ProofError::Storage { .. } | ProofError::Car { .. } => ProofErrorKind::Storage,
        }
    }

    /// Whether retrying the whole call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProofError::Storage { .. })
    }

    // Constructors

    /// Create a schema error
    pub fn schema(what: &'static str, reason: impl Into<String>) -> Self {
        ProofError::Schema {
            what,
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        ProofError::NotFound { what: what.into() }
    }

    /// Create a storage error
    pub fn storage(source: impl Error + Send + Sync + 'static) -> Self {
        ProofError::Storage {
            source: Box::new(source),
        }
    }

    /// Create a CAR error
    pub fn car(source: impl Error + Send + Sync + 'static) -> Self {
        ProofError::Car {
            source: Box::new(source),
        }
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        ProofError::Unsupported(msg.into())
    }
}

/// Multikey decoding and conversion errors
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic, PartialEq, Eq)]
pub enum KeyError {
    /// Multibase decode error
    #[error("failed to decode multibase")]
    MultibaseDecode,
    /// Multicodec decode error
    #[error("failed to decode multicodec varint")]
    MulticodecDecode,
    /// Unsupported key codec error
    #[error("unsupported key codec: 0x{0:x}")]
    UnsupportedCodec(u64),
    /// Invalid key length error
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidLength {
        /// Expected length of the key
        expected: usize,
        /// Actual length of the key
        got: usize,
    },
    /// Invalid key format error
    #[error("invalid key format")]
    InvalidFormat,
    /// Conversion error
    #[error("conversion error: {0}")]
    Conversion(String),
}

impl From<KeyError> for ProofError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::UnsupportedCodec(code) => {
                ProofError::unsupported(format!("key codec 0x{:x}", code))
            }
            other => ProofError::schema("public key", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let e = ProofError::ControllerMismatch {
            controller: "did:plc:a".into(),
            commit_did: "did:plc:b".into(),
        };
        assert_eq!(e.kind(), ProofErrorKind::Signature);
        assert!(!e.is_retryable());

        let e = ProofError::storage(std::io::Error::other("socket closed"));
        assert_eq!(e.kind(), ProofErrorKind::Storage);
        assert!(e.is_retryable());
    }

    #[test]
    fn unsupported_codec_maps_to_unsupported() {
        let e: ProofError = KeyError::UnsupportedCodec(0x1205).into();
        assert_eq!(e.kind(), ProofErrorKind::Unsupported);
        assert!(e.to_string().contains("0x1205"));

        let e: ProofError = KeyError::InvalidFormat.into();
        assert_eq!(e.kind(), ProofErrorKind::Schema);
    }
}

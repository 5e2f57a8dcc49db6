//! DID to document resolution
//!
//! Fetching returns a `DidDocResponse` holding the raw body and HTTP status,
//! so callers decide when to parse and whether to check the document `id`
//! against the requested DID.

use bon::Builder;
use bytes::Bytes;
use http::StatusCode;
use miette::Diagnostic;
use skeetgate_repo::VerificationMaterial;
use skeetgate_repo::error::KeyError;
use thiserror::Error;
use url::Url;

use crate::did_doc::DidDocument;

/// Result type for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur during identity resolution.
///
/// When a fetched document's `id` differs from the requested DID, a
/// `DocIdMismatch` error carries the document so callers can inspect it.
#[derive(Debug, Error, Diagnostic)]
#[allow(missing_docs)]
pub enum IdentityError {
    #[error("unsupported DID method: {0}")]
    #[diagnostic(
        code(skeetgate_identity::unsupported_did_method),
        help("supported DID methods: did:web, did:plc")
    )]
    UnsupportedDidMethod(String),
    #[error("HTTP error: {0}")]
    #[diagnostic(
        code(skeetgate_identity::http),
        help("check network connectivity and TLS configuration")
    )]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    #[diagnostic(
        code(skeetgate_identity::http_status),
        help("verify the did:web well-known path or the PLC directory base")
    )]
    HttpStatus(StatusCode),
    #[error("URL parse error: {0}")]
    #[diagnostic(code(skeetgate_identity::url))]
    Url(#[from] url::ParseError),
    #[error("serialize/deserialize error: {0}")]
    #[diagnostic(code(skeetgate_identity::serde))]
    Serde(#[from] serde_json::Error),
    #[error("invalid DID document: {0}")]
    #[diagnostic(
        code(skeetgate_identity::invalid_doc),
        help("the #atproto verification method must be a Multikey with publicKeyMultibase")
    )]
    InvalidDoc(String),
    #[error("no #atproto verification method in document for {0}")]
    #[diagnostic(code(skeetgate_identity::missing_verification_method))]
    MissingVerificationMethod(String),
    #[error("invalid signing key")]
    #[diagnostic(code(skeetgate_identity::key))]
    Key(#[from] KeyError),
    /// DID document id did not match requested DID; includes the fetched document
    #[error("DID doc id mismatch: expected {expected}, got {}", .doc.id)]
    #[diagnostic(
        code(skeetgate_identity::doc_id_mismatch),
        help("document id differs from requested DID; do not trust this document")
    )]
    DocIdMismatch {
        expected: String,
        doc: Box<DidDocument>,
    },
}

impl IdentityError {
    /// Unsupported DID method
    pub fn unsupported_did_method(did: impl Into<String>) -> Self {
        Self::UnsupportedDidMethod(did.into())
    }

    /// Invalid DID document
    pub fn invalid_doc(msg: impl Into<String>) -> Self {
        Self::InvalidDoc(msg.into())
    }

    /// Network failures and server-side statuses, which may clear on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::HttpStatus(status) => status.is_server_error(),
            _ => false,
        }
    }
}

/// Configurable resolver options.
///
/// - `plc_directory`: base URL did:plc documents are fetched from
/// - `validate_doc_id`: if true (default), document helpers check the `id`
///   against the requested DID, returning `DocIdMismatch` on mismatch
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct ResolverOptions {
    /// PLC directory base
    pub plc_directory: Url,
    /// Validate that fetched DID document id matches the requested DID
    #[builder(default = true)]
    pub validate_doc_id: bool,
}

/// Public PLC directory
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory/";

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::new()
            .plc_directory(Url::parse(DEFAULT_PLC_DIRECTORY).expect("valid url"))
            .build()
    }
}

/// DID document fetch response.
///
/// Carries the raw response bytes and HTTP status, plus the requested DID
/// (if supplied) to enable validation.
#[derive(Debug, Clone)]
pub struct DidDocResponse {
    #[allow(missing_docs)]
    pub buffer: Bytes,
    #[allow(missing_docs)]
    pub status: StatusCode,
    /// DID we intended to resolve; used by `parse_validated`
    pub requested: Option<String>,
}

impl DidDocResponse {
    /// Parse the body as a DID document
    pub fn parse(&self) -> Result<DidDocument> {
        if !self.status.is_success() {
            return Err(IdentityError::HttpStatus(self.status));
        }
        Ok(serde_json::from_slice(&self.buffer)?)
    }

    /// Parse and validate that the document id matches the requested DID if present.
    pub fn parse_validated(&self) -> Result<DidDocument> {
        let doc = self.parse()?;
        if let Some(expected) = &self.requested {
            if doc.id != *expected {
                return Err(IdentityError::DocIdMismatch {
                    expected: expected.clone(),
                    doc: Box::new(doc),
                });
            }
        }
        Ok(doc)
    }
}

/// Trait for DID resolution, for pluggable implementations.
///
/// [`crate::PlcResolver`] fetches `did:web` documents from their well-known
/// location and `did:plc` documents from a PLC directory.
pub trait IdentityResolver {
    /// Access options for validation decisions in default methods
    fn options(&self) -> &ResolverOptions;

    /// Resolve DID document
    fn resolve_did_doc(
        &self,
        did: &str,
    ) -> impl Future<Output = Result<DidDocResponse>> + Send
    where
        Self: Sync;

    /// Resolve and parse the DID document, checking its id when configured
    fn resolve_did_doc_owned(
        &self,
        did: &str,
    ) -> impl Future<Output = Result<DidDocument>> + Send
    where
        Self: Sync,
    {
        async move {
            let resp = self.resolve_did_doc(did).await?;
            if self.options().validate_doc_id {
                resp.parse_validated()
            } else {
                resp.parse()
            }
        }
    }

    /// Resolve the repository signing key and controller for a DID
    fn resolve_material(
        &self,
        did: &str,
    ) -> impl Future<Output = Result<VerificationMaterial>> + Send
    where
        Self: Sync,
    {
        async move { self.resolve_did_doc_owned(did).await?.verification_material() }
    }
}

impl<T: IdentityResolver + Sync> IdentityResolver for std::sync::Arc<T> {
    fn options(&self) -> &ResolverOptions {
        self.as_ref().options()
    }

    /// Resolve DID document
    async fn resolve_did_doc(&self, did: &str) -> Result<DidDocResponse> {
        self.as_ref().resolve_did_doc(did).await
    }
}

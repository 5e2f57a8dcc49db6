//! Identity resolution for skeetgate inclusion proofs
//!
//! Resolves a repository DID to its document and extracts the `#atproto`
//! signing key as [`skeetgate_repo::VerificationMaterial`].
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use skeetgate_identity::{MaterialCache, PlcResolver, resolve_material};
//!
//! let resolver = PlcResolver::default();
//! let cache = MaterialCache::new(Duration::from_secs(300));
//!
//! let material = resolve_material(&resolver, &cache, "did:plc:hdhoaan3xa3jiuq4fg4mefid").await?;
//! println!("signing key {}", material.did_key());
//! # Ok(())
//! # }
//! ```
//!
//! ## DID methods
//!
//! - `did:web:example.com` → `https://example.com/.well-known/did.json`
//! - `did:web:example.com:user:alice` → `https://example.com/user/alice/did.json`
//! - `did:plc:...` → `{plc_directory}did:plc:...`
//!
//! Other methods fail with [`IdentityError::UnsupportedDidMethod`].

#![warn(missing_docs)]

pub mod cache;
pub mod did_doc;
pub mod resolver;

pub use cache::{MaterialCache, resolve_material};
pub use did_doc::{DidDocument, Service, VerificationMethod};
pub use resolver::{DidDocResponse, IdentityError, IdentityResolver, ResolverOptions};

use bytes::Bytes;
use http::StatusCode;
use percent_encoding::percent_decode_str;
use url::{ParseError, Url};

/// HTTP resolver for `did:web` and `did:plc`
#[derive(Debug, Clone)]
pub struct PlcResolver {
    http: reqwest::Client,
    opts: ResolverOptions,
}

impl Default for PlcResolver {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), ResolverOptions::default())
    }
}

impl PlcResolver {
    /// Create a resolver over an existing HTTP client
    pub fn new(http: reqwest::Client, opts: ResolverOptions) -> Self {
        tracing::debug!(
            plc_directory = %opts.plc_directory,
            validate_doc_id = opts.validate_doc_id,
            "identity resolver created"
        );
        Self { http, opts }
    }

    /// Replace the PLC directory base
    pub fn with_plc_directory(mut self, base: Url) -> Self {
        self.opts.plc_directory = base;
        self
    }

    /// Enable/disable doc id validation
    pub fn with_validate_doc_id(mut self, enable: bool) -> Self {
        self.opts.validate_doc_id = enable;
        self
    }

    /// URL the document for `did` is fetched from
    pub fn did_doc_url(&self, did: &str) -> resolver::Result<Url> {
        if did.starts_with("did:web:") {
            did_web_url(did)
        } else if did.starts_with("did:plc:") {
            // Url::join would read the "did:" prefix as a scheme
            Ok(Url::parse(&format!("{}{}", self.opts.plc_directory, did))?)
        } else {
            Err(IdentityError::unsupported_did_method(did))
        }
    }

    async fn get_json_bytes(&self, url: Url) -> resolver::Result<(Bytes, StatusCode)> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let buf = resp.bytes().await?;
        Ok((buf, status))
    }
}

/// Construct the well-known HTTPS URL for a `did:web` DID.
fn did_web_url(did: &str) -> resolver::Result<Url> {
    let rest = did
        .strip_prefix("did:web:")
        .ok_or_else(|| IdentityError::unsupported_did_method(did))?;
    let mut parts = rest.split(':');
    let host = parts
        .next()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| IdentityError::unsupported_did_method(did))?;
    // host may carry an encoded port, e.g. localhost%3A8080
    let host = percent_decode_str(host).decode_utf8_lossy();
    let mut url = Url::parse(&format!("https://{host}/"))?;
    let path: Vec<&str> = parts.collect();
    if path.is_empty() {
        url.set_path(".well-known/did.json");
    } else {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| IdentityError::Url(ParseError::SetHostOnCannotBeABaseUrl))?;
        for seg in path {
            let decoded = percent_decode_str(seg).decode_utf8_lossy();
            segments.push(&decoded);
        }
        segments.push("did.json");
    }
    Ok(url)
}

impl IdentityResolver for PlcResolver {
    fn options(&self) -> &ResolverOptions {
        &self.opts
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn resolve_did_doc(&self, did: &str) -> resolver::Result<DidDocResponse> {
        let url = self.did_doc_url(did)?;
        let (buffer, status) = self.get_json_bytes(url).await?;
        tracing::debug!(%status, len = buffer.len(), "fetched DID document");
        Ok(DidDocResponse {
            buffer,
            status,
            requested: Some(did.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(did: &str) -> String {
        PlcResolver::default().did_doc_url(did).unwrap().to_string()
    }

    #[test]
    fn did_web_urls() {
        assert_eq!(
            url("did:web:example.com"),
            "https://example.com/.well-known/did.json"
        );
        assert_eq!(
            url("did:web:example.com:user:alice"),
            "https://example.com/user/alice/did.json"
        );
        assert_eq!(
            url("did:web:localhost%3A8080"),
            "https://localhost:8080/.well-known/did.json"
        );
    }

    #[test]
    fn plc_urls() {
        assert_eq!(
            url("did:plc:hdhoaan3xa3jiuq4fg4mefid"),
            "https://plc.directory/did:plc:hdhoaan3xa3jiuq4fg4mefid"
        );

        let resolver = PlcResolver::default()
            .with_plc_directory(Url::parse("http://127.0.0.1:2582/").unwrap());
        assert_eq!(
            resolver.did_doc_url("did:plc:abc").unwrap().as_str(),
            "http://127.0.0.1:2582/did:plc:abc"
        );
    }

    #[test]
    fn unsupported_methods() {
        let resolver = PlcResolver::default();
        for did in ["did:key:zQ3shpq1g134o7HGDb86CtQFxnHqzx5pZWknrVX2Waum3fF6j", "did:web:", "alice.example.com"] {
            assert!(matches!(
                resolver.did_doc_url(did),
                Err(IdentityError::UnsupportedDidMethod(_))
            ));
        }
    }
}

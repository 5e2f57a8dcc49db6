//! Resolved verification material cache
//!
//! Entries older than the cache's max age are treated as absent and
//! re-resolved on the next lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use skeetgate_repo::VerificationMaterial;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::resolver::{IdentityResolver, Result};

/// TTL cache of DID to verification material
///
/// Clones share the same entries.
#[derive(Debug, Clone)]
pub struct MaterialCache {
    max_age: Duration,
    entries: Arc<RwLock<HashMap<String, (VerificationMaterial, Instant)>>>,
}

impl MaterialCache {
    /// Create an empty cache whose entries expire after `max_age`
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Entry lifetime
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Material for `did` if present and not expired
    pub async fn get(&self, did: &str) -> Option<VerificationMaterial> {
        let entries = self.entries.read().await;
        entries
            .get(did)
            .filter(|(_, stored)| stored.elapsed() < self.max_age)
            .map(|(material, _)| material.clone())
    }

    /// Store material for `did`, resetting its age
    pub async fn insert(&self, did: impl Into<String>, material: VerificationMaterial) {
        self.entries
            .write()
            .await
            .insert(did.into(), (material, Instant::now()));
    }

    /// Drop the entry for `did`, e.g. after a key rotation
    pub async fn invalidate(&self, did: &str) -> Option<VerificationMaterial> {
        self.entries
            .write()
            .await
            .remove(did)
            .map(|(material, _)| material)
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, stored)| stored.elapsed() < self.max_age);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Resolve verification material for `did`, serving fresh cache entries
///
/// Misses and expired entries go to `resolver`; successful resolutions are
/// stored. Failures are not cached.
#[tracing::instrument(level = "debug", skip(resolver, cache))]
pub async fn resolve_material<R: IdentityResolver + Sync>(
    resolver: &R,
    cache: &MaterialCache,
    did: &str,
) -> Result<VerificationMaterial> {
    if let Some(material) = cache.get(did).await {
        tracing::debug!("cache hit");
        return Ok(material);
    }

    let material = resolver.resolve_material(did).await?;
    tracing::debug!(did_key = %material.did_key(), "resolved verification material");
    cache.insert(did, material.clone()).await;
    Ok(material)
}

//! Key material resolved from a DID document drives proof verification

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use ipld_core::ipld::Ipld;
use k256::ecdsa::SigningKey as K256Key;
use rand::rngs::OsRng;
use skeetgate_identity::resolver::Result;
use skeetgate_identity::{
    DidDocResponse, IdentityError, IdentityResolver, MaterialCache, ResolverOptions,
    resolve_material,
};
use skeetgate_repo::codec::TYPE_FIELD;
use skeetgate_repo::{
    Commit, MemoryBlockStore, NodeData, ProofError, ProofOptions, PublicKey, Record, RecordPath,
    prove_inclusion,
};

const DID: &str = "did:plc:ewvi7nxzyoun6zhxrhs64oiz";

/// Serves one canned document for every DID
struct StaticResolver {
    opts: ResolverOptions,
    doc: serde_json::Value,
    calls: AtomicUsize,
}

impl StaticResolver {
    fn new(doc: serde_json::Value) -> Self {
        Self {
            opts: ResolverOptions::default(),
            doc,
            calls: AtomicUsize::new(0),
        }
    }
}

impl IdentityResolver for StaticResolver {
    fn options(&self) -> &ResolverOptions {
        &self.opts
    }

    async fn resolve_did_doc(&self, did: &str) -> Result<DidDocResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DidDocResponse {
            buffer: Bytes::from(serde_json::to_vec(&self.doc)?),
            status: StatusCode::OK,
            requested: Some(did.to_string()),
        })
    }
}

fn did_doc(id: &str, controller: &str, sk: &K256Key) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "alsoKnownAs": ["at://alice.test"],
        "verificationMethod": [{
            "id": format!("{id}#atproto"),
            "type": "Multikey",
            "controller": controller,
            "publicKeyMultibase": PublicKey::from_k256(sk.verifying_key()).multibase(),
        }],
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": "https://pds.alice.test",
        }],
    })
}

/// Signed single-node snapshot holding `app.bsky.feed.post/3l4qpz7ajrc2a`
fn snapshot(sk: &K256Key) -> MemoryBlockStore {
    let mut fields = BTreeMap::new();
    fields.insert(TYPE_FIELD.to_string(), Ipld::String("app.bsky.feed.post".into()));
    fields.insert("text".to_string(), Ipld::String("gm".into()));
    let record = Record::from_fields(fields).to_cbor().unwrap();

    let mut store = MemoryBlockStore::new();
    let target = store.insert(record).unwrap();
    let node = NodeData::compress(
        None,
        [("app.bsky.feed.post/3l4qpz7ajrc2a", target, None)],
    );
    let root = store.insert(node.to_cbor().unwrap()).unwrap();
    let commit = Commit::new_unsigned(DID, root, "3l4qpz7bkwc2a", None)
        .sign(sk)
        .unwrap();
    let commit = store.insert(commit.to_cbor().unwrap()).unwrap();
    store.with_roots(vec![commit])
}

fn path() -> RecordPath {
    "app.bsky.feed.post/3l4qpz7ajrc2a".parse().unwrap()
}

#[tokio::test]
async fn resolved_material_verifies_the_commit() {
    let sk = K256Key::random(&mut OsRng);
    let resolver = StaticResolver::new(did_doc(DID, DID, &sk));
    let cache = MaterialCache::new(Duration::from_secs(300));

    let material = resolve_material(&resolver, &cache, DID).await.unwrap();
    let store = snapshot(&sk);
    let proof = prove_inclusion(&material, &store, &path(), &ProofOptions::default())
        .await
        .unwrap();
    assert_eq!(proof.did(), DID);
    assert_eq!(proof.record.get_str("text"), Some("gm"));

    // second proof for the same repo reuses the cached key
    let material = resolve_material(&resolver, &cache, DID).await.unwrap();
    prove_inclusion(&material, &store, &path(), &ProofOptions::default())
        .await
        .unwrap();
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rotated_key_fails_until_invalidated() {
    let old = K256Key::random(&mut OsRng);
    let new = K256Key::random(&mut OsRng);
    let cache = MaterialCache::new(Duration::from_secs(300));

    let stale = StaticResolver::new(did_doc(DID, DID, &old));
    resolve_material(&stale, &cache, DID).await.unwrap();

    let store = snapshot(&new);
    let fresh = StaticResolver::new(did_doc(DID, DID, &new));
    let material = resolve_material(&fresh, &cache, DID).await.unwrap();
    let err = prove_inclusion(&material, &store, &path(), &ProofOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProofError::Signature { .. }));

    cache.invalidate(DID).await;
    let material = resolve_material(&fresh, &cache, DID).await.unwrap();
    prove_inclusion(&material, &store, &path(), &ProofOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn foreign_controller_is_rejected() {
    let sk = K256Key::random(&mut OsRng);
    let resolver = StaticResolver::new(did_doc(DID, "did:plc:someoneelse", &sk));
    let cache = MaterialCache::new(Duration::from_secs(300));

    let material = resolve_material(&resolver, &cache, DID).await.unwrap();
    let err = prove_inclusion(&material, &snapshot(&sk), &path(), &ProofOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProofError::ControllerMismatch { .. }));
}

#[tokio::test]
async fn document_for_another_did_is_not_trusted() {
    let sk = K256Key::random(&mut OsRng);
    let resolver = StaticResolver::new(did_doc("did:plc:someoneelse", DID, &sk));
    let cache = MaterialCache::new(Duration::from_secs(300));

    let err = resolve_material(&resolver, &cache, DID).await.unwrap_err();
    match err {
        IdentityError::DocIdMismatch { expected, doc } => {
            assert_eq!(expected, DID);
            assert_eq!(doc.id, "did:plc:someoneelse");
            assert_eq!(doc.handle(), Some("alice.test"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(cache.is_empty().await);
}

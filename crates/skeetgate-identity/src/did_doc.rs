//! DID document model and verification material extraction

use serde::{Deserialize, Serialize};
use skeetgate_repo::{PublicKey, VerificationMaterial};
use url::Url;

use crate::resolver::IdentityError;

/// Fragment of the repository signing key's verification method
pub const ATPROTO_KEY_FRAGMENT: &str = "#atproto";

/// Fragment of the PDS service entry
pub const ATPROTO_PDS_FRAGMENT: &str = "#atproto_pds";

/// Verification method type this crate can turn into key material
pub const MULTIKEY: &str = "Multikey";

/// DID document
///
/// Only the fields identity resolution needs; anything else in the JSON is
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// Document subject
    pub id: String,
    /// Handles and other aliases, e.g. `at://alice.example.com`
    #[serde(default)]
    pub also_known_as: Vec<String>,
    /// Public keys
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    /// Service endpoints
    #[serde(default)]
    pub service: Vec<Service>,
}

/// Verification method entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Full (`did:...#atproto`) or relative (`#atproto`) id
    pub id: String,
    /// Method type, `Multikey` for current documents
    #[serde(rename = "type")]
    pub r#type: String,
    /// DID controlling the key
    pub controller: String,
    /// Multibase-encoded Multikey public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

/// Service entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Full or relative id, e.g. `#atproto_pds`
    pub id: String,
    /// Service type
    #[serde(rename = "type")]
    pub r#type: String,
    /// Endpoint; usually a URL string
    pub service_endpoint: serde_json::Value,
}

impl DidDocument {
    fn matches_fragment(&self, id: &str, fragment: &str) -> bool {
        id == fragment
            || id
                .strip_prefix(self.id.as_str())
                .is_some_and(|rest| rest == fragment)
    }

    /// The `#atproto` verification method, if present
    pub fn atproto_method(&self) -> Option<&VerificationMethod> {
        self.verification_method
            .iter()
            .find(|vm| self.matches_fragment(&vm.id, ATPROTO_KEY_FRAGMENT))
    }

    /// Repository signing key and its controller
    ///
    /// Taken from the `#atproto` method, which must be a `Multikey` with a
    /// `publicKeyMultibase`.
    pub fn verification_material(&self) -> Result<VerificationMaterial, IdentityError> {
        let vm = self
            .atproto_method()
            .ok_or_else(|| IdentityError::MissingVerificationMethod(self.id.clone()))?;

        if vm.r#type != MULTIKEY {
            return Err(IdentityError::invalid_doc(format!(
                "verification method type {} is not {}",
                vm.r#type, MULTIKEY
            )));
        }
        let multibase = vm
            .public_key_multibase
            .as_deref()
            .ok_or_else(|| IdentityError::invalid_doc("verification method has no publicKeyMultibase"))?;

        let public_key = PublicKey::decode(multibase)?;
        Ok(VerificationMaterial::new(public_key, vm.controller.clone()))
    }

    /// PDS endpoint from the `#atproto_pds` service
    pub fn pds_endpoint(&self) -> Option<Url> {
        self.service
            .iter()
            .find(|s| self.matches_fragment(&s.id, ATPROTO_PDS_FRAGMENT))
            .and_then(|s| s.service_endpoint.as_str())
            .and_then(|endpoint| Url::parse(endpoint).ok())
    }

    /// Handle from the first `at://` alias
    pub fn handle(&self) -> Option<&str> {
        self.also_known_as
            .iter()
            .find_map(|aka| aka.strip_prefix("at://"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skeetgate_repo::KeyCodec;

    const PLC_DOC: &str = r##"{
  "@context": [
    "https://www.w3.org/ns/did/v1",
    "https://w3id.org/security/multikey/v1",
    "https://w3id.org/security/suites/secp256k1-2019/v1"
  ],
  "id": "did:plc:hdhoaan3xa3jiuq4fg4mefid",
  "alsoKnownAs": ["at://bad-example.com"],
  "verificationMethod": [
    {
      "id": "did:plc:hdhoaan3xa3jiuq4fg4mefid#atproto",
      "type": "Multikey",
      "controller": "did:plc:hdhoaan3xa3jiuq4fg4mefid",
      "publicKeyMultibase": "zQ3shpq1g134o7HGDb86CtQFxnHqzx5pZWknrVX2Waum3fF6j"
    }
  ],
  "service": [
    {
      "id": "#atproto_pds",
      "type": "AtprotoPersonalDataServer",
      "serviceEndpoint": "https://porcini.us-east.host.bsky.network"
    }
  ]
}"##;

    #[test]
    fn plc_document_material() {
        let doc: DidDocument = serde_json::from_str(PLC_DOC).unwrap();
        assert_eq!(doc.handle(), Some("bad-example.com"));
        assert_eq!(
            doc.pds_endpoint().unwrap().as_str(),
            "https://porcini.us-east.host.bsky.network/"
        );

        let material = doc.verification_material().unwrap();
        assert_eq!(material.controller, "did:plc:hdhoaan3xa3jiuq4fg4mefid");
        assert_eq!(material.public_key.codec, KeyCodec::Secp256k1);
        assert_eq!(
            material.did_key(),
            "did:key:zQ3shpq1g134o7HGDb86CtQFxnHqzx5pZWknrVX2Waum3fF6j"
        );
    }

    #[test]
    fn relative_method_id_is_found() {
        let mut doc: DidDocument = serde_json::from_str(PLC_DOC).unwrap();
        doc.verification_method[0].id = "#atproto".into();
        assert!(doc.atproto_method().is_some());

        doc.verification_method[0].id = "did:plc:someone-else#atproto".into();
        assert!(doc.atproto_method().is_none());
        assert!(matches!(
            doc.verification_material(),
            Err(IdentityError::MissingVerificationMethod(_))
        ));
    }

    #[test]
    fn legacy_key_types_are_rejected() {
        let mut doc: DidDocument = serde_json::from_str(PLC_DOC).unwrap();
        doc.verification_method[0].r#type = "EcdsaSecp256k1VerificationKey2019".into();
        assert!(matches!(
            doc.verification_material(),
            Err(IdentityError::InvalidDoc(_))
        ));

        let mut doc: DidDocument = serde_json::from_str(PLC_DOC).unwrap();
        doc.verification_method[0].public_key_multibase = Some("not-multibase".into());
        assert!(matches!(doc.verification_material(), Err(IdentityError::Key(_))));
    }
}

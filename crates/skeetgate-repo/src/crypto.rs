//! Multikey public keys and signature verification.
//!
//! A `PublicKey` is decoded from a Multikey `publicKeyMultibase` string into
//! raw bytes plus a codec (`KeyCodec`). Verification dispatches on the codec
//! to ed25519_dalek, k256 or p256.
//!
//! ```
//! use skeetgate_repo::crypto::{KeyCodec, PublicKey};
//!
//! let sk = k256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
//! let pk = PublicKey::from_k256(sk.verifying_key());
//! let did_key = pk.did_key();
//! assert!(did_key.starts_with("did:key:zQ3s"));
//!
//! let decoded = PublicKey::from_did_key(&did_key).unwrap();
//! assert_eq!(decoded.codec, KeyCodec::Secp256k1);
//! assert_eq!(decoded, pk);
//! ```

use crate::error::{KeyError, ProofError, Result};

/// Known multicodec key codecs for Multikey public keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCodec {
    /// Ed25519
    Ed25519,
    /// Secp256k1
    Secp256k1,
    /// P256
    P256,
}

impl KeyCodec {
    /// Multicodec code for this key type
    pub fn code(self) -> u64 {
        match self {
            KeyCodec::Ed25519 => 0xED,
            KeyCodec::Secp256k1 => 0xE7,
            KeyCodec::P256 => 0x1200,
        }
    }

    fn from_code(code: u64) -> std::result::Result<Self, KeyError> {
        match code {
            0xED => Ok(KeyCodec::Ed25519),
            0xE7 => Ok(KeyCodec::Secp256k1),
            0x1200 => Ok(KeyCodec::P256),
            other => Err(KeyError::UnsupportedCodec(other)),
        }
    }
}

/// Public key decoded from a Multikey `publicKeyMultibase` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Codec used to encode the public key
    pub codec: KeyCodec,
    /// Bytes of the public key (compressed SEC1 for the curves, raw for ed25519)
    pub bytes: Vec<u8>,
}

impl PublicKey {
    /// Decode a Multikey public key from a multibase-encoded string
    pub fn decode(multibase_str: &str) -> std::result::Result<Self, KeyError> {
        let (_base, data) =
            multibase::decode(multibase_str).map_err(|_| KeyError::MultibaseDecode)?;
        let (code, offset) = decode_uvarint(&data).ok_or(KeyError::MulticodecDecode)?;
        let codec = KeyCodec::from_code(code)?;
        let bytes = &data[offset..];
        match codec {
            KeyCodec::Ed25519 => {
                if bytes.len() != 32 {
                    return Err(KeyError::InvalidLength {
                        expected: 32,
                        got: bytes.len(),
                    });
                }
            }
            KeyCodec::Secp256k1 | KeyCodec::P256 => {
                if !(bytes.len() == 33 || bytes.len() == 65) {
                    return Err(KeyError::InvalidLength {
                        expected: 33,
                        got: bytes.len(),
                    });
                }
                // 0x02/0x03 compressed, 0x04 uncompressed
                let first = *bytes.first().ok_or(KeyError::InvalidFormat)?;
                if first != 0x02 && first != 0x03 && first != 0x04 {
                    return Err(KeyError::InvalidFormat);
                }
            }
        }
        Ok(PublicKey {
            codec,
            bytes: bytes.to_vec(),
        })
    }

    /// Decode from a `did:key:` identifier
    pub fn from_did_key(did_key: &str) -> std::result::Result<Self, KeyError> {
        let multibase = did_key
            .strip_prefix("did:key:")
            .ok_or(KeyError::InvalidFormat)?;
        Self::decode(multibase)
    }

    /// Wrap a secp256k1 verifying key
    pub fn from_k256(vk: &k256::ecdsa::VerifyingKey) -> Self {
        PublicKey {
            codec: KeyCodec::Secp256k1,
            bytes: vk.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// Wrap a P-256 verifying key
    pub fn from_p256(vk: &p256::ecdsa::VerifyingKey) -> Self {
        PublicKey {
            codec: KeyCodec::P256,
            bytes: vk.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// Wrap an ed25519 verifying key
    pub fn from_ed25519(vk: &ed25519_dalek::VerifyingKey) -> Self {
        PublicKey {
            codec: KeyCodec::Ed25519,
            bytes: vk.to_bytes().to_vec(),
        }
    }

    /// Multibase (base58btc) Multikey encoding, as found in `publicKeyMultibase`
    pub fn multibase(&self) -> String {
        let mut buf = encode_uvarint(self.codec.code());
        buf.extend_from_slice(&self.bytes);
        multibase::encode(multibase::Base::Base58Btc, buf)
    }

    /// `did:key:` identifier for this key
    pub fn did_key(&self) -> String {
        format!("did:key:{}", self.multibase())
    }

    /// Convert to ed25519_dalek verifying key
    pub fn to_ed25519(&self) -> std::result::Result<ed25519_dalek::VerifyingKey, KeyError> {
        if self.codec != KeyCodec::Ed25519 {
            return Err(KeyError::UnsupportedCodec(self.codec.code()));
        }
        let raw: &[u8; 32] = self
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength {
                expected: 32,
                got: self.bytes.len(),
            })?;
        ed25519_dalek::VerifyingKey::from_bytes(raw).map_err(|e| KeyError::Conversion(e.to_string()))
    }

    /// Convert to k256 verifying key
    pub fn to_k256(&self) -> std::result::Result<k256::ecdsa::VerifyingKey, KeyError> {
        if self.codec != KeyCodec::Secp256k1 {
            return Err(KeyError::UnsupportedCodec(self.codec.code()));
        }
        k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.bytes)
            .map_err(|e| KeyError::Conversion(e.to_string()))
    }

    /// Convert to p256 verifying key
    pub fn to_p256(&self) -> std::result::Result<p256::ecdsa::VerifyingKey, KeyError> {
        if self.codec != KeyCodec::P256 {
            return Err(KeyError::UnsupportedCodec(self.codec.code()));
        }
        p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.bytes)
            .map_err(|e| KeyError::Conversion(e.to_string()))
    }

    /// Verify `signature` over `message`
    ///
    /// The key type is taken from the codec. Curve signatures are the 64-byte
    /// compact `r || s` form used by AT Protocol commits.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig_failed = |source: Option<crate::error::BoxError>| ProofError::Signature {
            did_key: self.did_key(),
            source,
        };

        match self.codec {
            KeyCodec::Ed25519 => {
                let vk = self.to_ed25519()?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| sig_failed(Some(Box::new(e))))?;
                vk.verify_strict(message, &sig)
                    .map_err(|e| sig_failed(Some(Box::new(e))))?;
            }
            KeyCodec::Secp256k1 => {
                use k256::ecdsa::{Signature, signature::Verifier};
                let vk = self.to_k256()?;
                let sig =
                    Signature::from_slice(signature).map_err(|e| sig_failed(Some(Box::new(e))))?;
                vk.verify(message, &sig)
                    .map_err(|e| sig_failed(Some(Box::new(e))))?;
            }
            KeyCodec::P256 => {
                use p256::ecdsa::{Signature, signature::Verifier};
                let vk = self.to_p256()?;
                let sig =
                    Signature::from_slice(signature).map_err(|e| sig_failed(Some(Box::new(e))))?;
                vk.verify(message, &sig)
                    .map_err(|e| sig_failed(Some(Box::new(e))))?;
            }
        }

        Ok(())
    }
}

/// Key material resolved for a repository
///
/// Produced by the identity layer from a DID document's `#atproto`
/// verification method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMaterial {
    /// Signing key of the repository
    pub public_key: PublicKey,
    /// DID that controls this key; must match the commit's `did`
    pub controller: String,
}

impl VerificationMaterial {
    /// Pair a key with its controlling DID
    pub fn new(public_key: PublicKey, controller: impl Into<String>) -> Self {
        Self {
            public_key,
            controller: controller.into(),
        }
    }

    /// `did:key:` identifier of the key
    pub fn did_key(&self) -> String {
        self.public_key.did_key()
    }
}

fn decode_uvarint(data: &[u8]) -> Option<(u64, usize)> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for (i, b) in data.iter().copied().enumerate() {
        if b < 0x80 {
            if i > 9 || (i == 9 && b > 1) {
                return None;
            }
            return Some((x | ((b as u64) << s), i + 1));
        }
        x |= ((b & 0x7F) as u64) << s;
        s += 7;
    }
    None
}

fn encode_uvarint(mut x: u64) -> Vec<u8> {
    let mut out = Vec::new();
    while x >= 0x80 {
        out.push(((x as u8) & 0x7F) | 0x80);
        x >>= 7;
    }
    out.push(x as u8);
    out
}

// ciris-audit/src/keys.rs
// ============================================================================
// Module: Audit Signing Keys
// Description: Ed25519 signing keys with additive rotation.
// Purpose: Sign audit entries and verify signatures across key generations.
// Dependencies: ed25519-dalek, base64, ciris-core
// ============================================================================

//! ## Overview
//! The audit chain signs every entry hash with the active key. Rotation is
//! additive: a new key becomes active while prior public keys remain in the
//! ring so old signatures stay verifiable. Signatures cover the ASCII bytes
//! of the lowercase hex entry hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ciris_core::SigningKeyId;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Signing Algorithm
// ============================================================================

/// Supported audit signing algorithms.
///
/// `rsa-pss` is accepted in configuration for wire compatibility but fails
/// closed at key load; ed25519 is the implemented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningAlgorithm {
    /// Ed25519 signatures (implemented).
    #[default]
    Ed25519,
    /// RSA-PSS signatures (recognized, not implemented).
    RsaPss,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key handling errors.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The configured algorithm has no implementation.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Public key bytes failed to decode.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    /// Signature bytes failed to decode.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
    /// Signature verification failed.
    #[error("signature verification failed for key {0}")]
    VerificationFailed(String),
    /// The signing key id is not present in the ring.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
}

// ============================================================================
// SECTION: Audit Signer
// ============================================================================

/// Active signing key used for new audit entries.
pub struct AuditSigner {
    /// Key identifier recorded on entries.
    key_id: SigningKeyId,
    /// Ed25519 signing key.
    signing_key: SigningKey,
}

impl AuditSigner {
    /// Generates a fresh signer with the given key id.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnsupportedAlgorithm`] for algorithms without an
    /// implementation.
    pub fn generate(
        key_id: SigningKeyId,
        algorithm: SigningAlgorithm,
    ) -> Result<Self, KeyError> {
        match algorithm {
            SigningAlgorithm::Ed25519 => Ok(Self {
                key_id,
                signing_key: SigningKey::generate(&mut OsRng),
            }),
            SigningAlgorithm::RsaPss => {
                Err(KeyError::UnsupportedAlgorithm("rsa-pss".to_string()))
            }
        }
    }

    /// Creates a signer from raw ed25519 secret key bytes.
    #[must_use]
    pub fn from_bytes(key_id: SigningKeyId, bytes: &[u8; 32]) -> Self {
        Self {
            key_id,
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Returns the key identifier.
    #[must_use]
    pub const fn key_id(&self) -> &SigningKeyId {
        &self.key_id
    }

    /// Returns the base64-encoded public key.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Returns the verifying key for ring registration.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Signs a message and returns the base64-encoded signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        BASE64.encode(self.signing_key.sign(message).to_bytes())
    }
}

// ============================================================================
// SECTION: Key Ring
// ============================================================================

/// Verifying keys across every key generation.
#[derive(Default)]
pub struct KeyRing {
    /// Verifying keys by key id.
    keys: BTreeMap<SigningKeyId, VerifyingKey>,
}

impl KeyRing {
    /// Creates an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a verifying key to the ring.
    pub fn add(&mut self, key_id: SigningKeyId, key: VerifyingKey) {
        self.keys.insert(key_id, key);
    }

    /// Adds a base64-encoded public key to the ring.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPublicKey`] when decoding fails.
    pub fn add_base64(&mut self, key_id: SigningKeyId, encoded: &str) -> Result<(), KeyError> {
        let key = decode_public_key(encoded)?;
        self.add(key_id, key);
        Ok(())
    }

    /// Returns true when the ring holds the given key id.
    #[must_use]
    pub fn contains(&self, key_id: &SigningKeyId) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Verifies a base64-encoded signature over a message.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownKey`] for unregistered key ids and
    /// [`KeyError::VerificationFailed`] when the signature does not verify.
    pub fn verify(
        &self,
        key_id: &SigningKeyId,
        message: &[u8],
        signature_base64: &str,
    ) -> Result<(), KeyError> {
        let key =
            self.keys.get(key_id).ok_or_else(|| KeyError::UnknownKey(key_id.to_string()))?;
        let signature = decode_signature(signature_base64)?;
        key.verify(message, &signature)
            .map_err(|_| KeyError::VerificationFailed(key_id.to_string()))
    }
}

// ============================================================================
// SECTION: Decoding Helpers
// ============================================================================

/// Decodes a base64-encoded ed25519 public key.
///
/// # Errors
///
/// Returns [`KeyError::InvalidPublicKey`] when decoding fails.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, KeyError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|err| KeyError::InvalidPublicKey(err.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| KeyError::InvalidPublicKey("expected 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|err| KeyError::InvalidPublicKey(err.to_string()))
}

/// Decodes a base64-encoded ed25519 signature.
fn decode_signature(encoded: &str) -> Result<Signature, KeyError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|err| KeyError::InvalidSignature(err.to_string()))?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| KeyError::InvalidSignature("expected 64 bytes".to_string()))?;
    Ok(Signature::from_bytes(&bytes))
}

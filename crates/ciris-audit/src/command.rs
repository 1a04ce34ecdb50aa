// ciris-audit/src/command.rs
// ============================================================================
// Module: Signed Emergency Commands
// Description: Verification of Wise-Authority-signed shutdown commands.
// Purpose: Accept emergency shutdown only from allow-listed keys in window.
// Dependencies: ciris-core, ed25519-dalek, crate::keys
// ============================================================================

//! ## Overview
//! An emergency shutdown command is an Ed25519-signed record. The signature
//! covers the RFC 8785 canonicalization of every field except `signature`.
//! Verification fails closed: the command type must be exactly
//! `SHUTDOWN_NOW`, the public key must be allow-listed, the timestamp must
//! fall inside the validity window, and the signature must verify.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ciris_core::Timestamp;
use ciris_core::WaId;
use ciris_core::hashing::canonical_json_bytes;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::keys::decode_public_key;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Required command type for emergency shutdown.
pub const SHUTDOWN_COMMAND_TYPE: &str = "SHUTDOWN_NOW";
/// Validity window around `issued_at`, in milliseconds (five minutes).
pub const COMMAND_VALIDITY_WINDOW_MILLIS: i64 = 5 * 60 * 1_000;

// ============================================================================
// SECTION: Command
// ============================================================================

/// Signed emergency command submitted by a Wise Authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyCommand {
    /// Unique command identifier.
    pub command_id: String,
    /// Command type; must equal [`SHUTDOWN_COMMAND_TYPE`].
    pub command_type: String,
    /// Issuing authority.
    pub wa_id: WaId,
    /// Base64-encoded Ed25519 public key of the issuer.
    pub wa_public_key: String,
    /// Time the command was issued.
    pub issued_at: Timestamp,
    /// Human-readable reason.
    pub reason: String,
    /// Base64-encoded signature over the canonical unsigned form.
    pub signature: String,
}

/// Canonical unsigned form covered by the command signature.
#[derive(Debug, Serialize)]
struct UnsignedCommand<'a> {
    /// Unique command identifier.
    command_id: &'a str,
    /// Command type.
    command_type: &'a str,
    /// Issuing authority.
    wa_id: &'a WaId,
    /// Base64-encoded public key of the issuer.
    wa_public_key: &'a str,
    /// Time the command was issued.
    issued_at: Timestamp,
    /// Human-readable reason.
    reason: &'a str,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Emergency command rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejection {
    /// Command type is not `SHUTDOWN_NOW`.
    #[error("unexpected command type: {0}")]
    WrongCommandType(String),
    /// The signing key is not allow-listed.
    #[error("public key is not allow-listed")]
    KeyNotAllowed,
    /// The command timestamp falls outside the validity window.
    #[error("command issued outside the validity window")]
    OutsideValidityWindow,
    /// The public key failed to decode.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    /// The signature failed to decode or verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies an emergency command against the allow-list and clock.
///
/// # Errors
///
/// Returns [`CommandRejection`] naming the first failed check; callers must
/// record a security-violation audit event and take no action on rejection.
pub fn verify_emergency_command(
    command: &EmergencyCommand,
    allowed_keys: &[String],
    now: Timestamp,
) -> Result<(), CommandRejection> {
    if command.command_type != SHUTDOWN_COMMAND_TYPE {
        return Err(CommandRejection::WrongCommandType(command.command_type.clone()));
    }
    if !allowed_keys.contains(&command.wa_public_key) {
        return Err(CommandRejection::KeyNotAllowed);
    }
    let skew = now.millis_since(command.issued_at).abs();
    if skew > COMMAND_VALIDITY_WINDOW_MILLIS {
        return Err(CommandRejection::OutsideValidityWindow);
    }

    let key = decode_public_key(&command.wa_public_key)
        .map_err(|err| CommandRejection::InvalidKey(err.to_string()))?;
    let unsigned = UnsignedCommand {
        command_id: &command.command_id,
        command_type: &command.command_type,
        wa_id: &command.wa_id,
        wa_public_key: &command.wa_public_key,
        issued_at: command.issued_at,
        reason: &command.reason,
    };
    let message = canonical_json_bytes(&unsigned)
        .map_err(|err| CommandRejection::InvalidSignature(err.to_string()))?;

    let mut ring = crate::keys::KeyRing::new();
    ring.add(ciris_core::SigningKeyId::new("wa"), key);
    ring.verify(&ciris_core::SigningKeyId::new("wa"), &message, &command.signature)
        .map_err(|err| CommandRejection::InvalidSignature(err.to_string()))
}

/// Signs an emergency command form; used by authority tooling and tests.
///
/// # Errors
///
/// Returns [`CommandRejection::InvalidSignature`] when canonicalization
/// fails.
pub fn sign_emergency_command(
    command_id: &str,
    wa_id: &WaId,
    signer: &crate::keys::AuditSigner,
    issued_at: Timestamp,
    reason: &str,
) -> Result<EmergencyCommand, CommandRejection> {
    let wa_public_key = signer.public_key_base64();
    let unsigned = UnsignedCommand {
        command_id,
        command_type: SHUTDOWN_COMMAND_TYPE,
        wa_id,
        wa_public_key: &wa_public_key,
        issued_at,
        reason,
    };
    let message = canonical_json_bytes(&unsigned)
        .map_err(|err| CommandRejection::InvalidSignature(err.to_string()))?;
    let signature = signer.sign(&message);
    Ok(EmergencyCommand {
        command_id: command_id.to_string(),
        command_type: SHUTDOWN_COMMAND_TYPE.to_string(),
        wa_id: wa_id.clone(),
        wa_public_key,
        issued_at,
        reason: reason.to_string(),
        signature,
    })
}

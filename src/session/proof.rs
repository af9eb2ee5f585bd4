//! Chat-platform proof verification.
//!
//! When the bot side redeems a handshake code on behalf of a user, it
//! attaches a proof: an HMAC-SHA256 over `"{code}:{chat_platform_id}"`
//! keyed with the secret shared between the bot and the gateway. The
//! comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

fn message(code: &str, chat_platform_id: &str) -> String {
    format!("{code}:{chat_platform_id}")
}

/// Computes the hex-encoded proof for a code/identity pair.
///
/// Exposed so the bot-side client (and tests) produce proofs the same
/// way the gateway checks them.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if the MAC cannot be keyed.
pub fn sign(secret: &str, code: &str, chat_platform_id: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Internal(format!("proof key: {e}")))?;
    mac.update(message(code, chat_platform_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a hex-encoded proof in constant time.
///
/// Any malformed input verifies as `false`, never as an error — the
/// caller only needs valid/invalid.
#[must_use]
pub fn verify(secret: &str, code: &str, chat_platform_id: &str, proof: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message(code, chat_platform_id).as_bytes());
    let expected = mac.finalize().into_bytes();

    let Ok(provided) = hex::decode(proof) else {
        return false;
    };
    expected.ct_eq(provided.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "bot-shared-secret";

    #[test]
    fn signed_proof_verifies() {
        let proof = sign(SECRET, "CODE1", "42").unwrap_or_default();
        assert!(verify(SECRET, "CODE1", "42", &proof));
    }

    #[test]
    fn proof_bound_to_code_and_identity() {
        let proof = sign(SECRET, "CODE1", "42").unwrap_or_default();
        assert!(!verify(SECRET, "CODE2", "42", &proof));
        assert!(!verify(SECRET, "CODE1", "43", &proof));
    }

    #[test]
    fn wrong_secret_fails() {
        let proof = sign(SECRET, "CODE1", "42").unwrap_or_default();
        assert!(!verify("other-secret", "CODE1", "42", &proof));
    }

    #[test]
    fn malformed_proof_fails_closed() {
        assert!(!verify(SECRET, "CODE1", "42", "not-hex!"));
        assert!(!verify(SECRET, "CODE1", "42", ""));
        assert!(!verify(SECRET, "CODE1", "42", "deadbeef"));
    }
}

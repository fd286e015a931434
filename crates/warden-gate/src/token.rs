//! Stateless single-use confirm tokens.
//!
//! A token is a keyed MAC over `{operation, payload_hash, issued_at,
//! expires_at}`. The issuer holds the only key, so a valid token proves the
//! engine itself issued it for this exact request. Statelessness means the
//! engine never waits for the second submission; the caller resubmits with
//! `confirm=true`, the token, and a non-trivial reason when it is ready.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_types::{now_ms, Result, TimestampMs, WardenError};

/// Default token lifetime, ten minutes.
pub const DEFAULT_TOKEN_TTL_MS: i64 = 10 * 60 * 1000;

/// Minimum length for the resubmission reason string.
pub const MIN_REASON_LEN: usize = 10;

const KEY_CONTEXT: &str = "warden confirm token v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,
    #[error("Token expired at {expired_at}")]
    Expired { expired_at: TimestampMs },
    #[error("Token was issued for operation '{expected}', not '{actual}'")]
    OperationMismatch { expected: String, actual: String },
    #[error("Token payload hash does not match the resubmitted request")]
    PayloadMismatch,
    #[error("Token signature is invalid")]
    BadSignature,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    operation: String,
    payload_hash: String,
    issued_at: TimestampMs,
    expires_at: TimestampMs,
}

/// Issues and verifies confirm tokens with a key derived from the
/// deployment secret.
pub struct ConfirmTokenIssuer {
    key: [u8; 32],
    ttl_ms: i64,
}

impl ConfirmTokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            ttl_ms: DEFAULT_TOKEN_TTL_MS,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Hash binding a token to the exact request payload.
    pub fn payload_hash(payload: &serde_json::Value) -> String {
        let bytes = serde_json::to_vec(payload).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Issues a token for one operation and payload.
    pub fn issue(&self, operation: &str, payload: &serde_json::Value) -> Result<String> {
        let issued_at = now_ms();
        let claims = TokenClaims {
            operation: operation.to_string(),
            payload_hash: Self::payload_hash(payload),
            issued_at,
            expires_at: issued_at + self.ttl_ms,
        };
        let claim_bytes = serde_json::to_vec(&claims)
            .map_err(|e| WardenError::internal(format!("token encoding failed: {e}")))?;
        let mac = blake3::keyed_hash(&self.key, &claim_bytes);
        Ok(format!("{}.{}", hex::encode(&claim_bytes), mac.to_hex()))
    }

    /// Verifies a resubmitted token against the operation and payload it
    /// must have been issued for.
    pub fn verify(
        &self,
        token: &str,
        operation: &str,
        payload: &serde_json::Value,
    ) -> std::result::Result<(), TokenError> {
        let (claims_hex, mac_hex) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let claim_bytes = hex::decode(claims_hex).map_err(|_| TokenError::Malformed)?;

        let expected_mac = blake3::keyed_hash(&self.key, &claim_bytes);
        let provided_mac: blake3::Hash = mac_hex.parse().map_err(|_| TokenError::Malformed)?;
        // blake3::Hash equality is constant-time.
        if provided_mac != expected_mac {
            return Err(TokenError::BadSignature);
        }

        let claims: TokenClaims =
            serde_json::from_slice(&claim_bytes).map_err(|_| TokenError::Malformed)?;
        if claims.operation != operation {
            return Err(TokenError::OperationMismatch {
                expected: claims.operation,
                actual: operation.to_string(),
            });
        }
        if claims.payload_hash != Self::payload_hash(payload) {
            return Err(TokenError::PayloadMismatch);
        }
        if now_ms() >= claims.expires_at {
            return Err(TokenError::Expired {
                expired_at: claims.expires_at,
            });
        }
        Ok(())
    }
}

/// Checks the resubmission carries an explicit confirmation and a reason
/// long enough to mean something.
pub fn validate_resubmission(confirm: bool, reason: &str) -> Result<()> {
    if !confirm {
        return Err(WardenError::invalid_input(
            "confirm",
            "resubmission must set confirm=true",
        ));
    }
    if reason.trim().len() < MIN_REASON_LEN {
        return Err(WardenError::invalid_input(
            "reason",
            format!("resubmission reason must be at least {MIN_REASON_LEN} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({"target": "prod-db", "statement": "DROP TABLE sessions"})
    }

    #[test]
    fn test_round_trip_verifies() {
        let issuer = ConfirmTokenIssuer::new("test-secret");
        let token = issuer.issue("schema.initialize", &payload()).unwrap();
        assert!(issuer
            .verify(&token, "schema.initialize", &payload())
            .is_ok());
    }

    #[test]
    fn test_different_payload_rejected() {
        let issuer = ConfirmTokenIssuer::new("test-secret");
        let token = issuer.issue("schema.initialize", &payload()).unwrap();
        let other = serde_json::json!({"target": "staging-db"});
        assert_eq!(
            issuer.verify(&token, "schema.initialize", &other),
            Err(TokenError::PayloadMismatch)
        );
    }

    #[test]
    fn test_different_operation_rejected() {
        let issuer = ConfirmTokenIssuer::new("test-secret");
        let token = issuer.issue("schema.initialize", &payload()).unwrap();
        assert!(matches!(
            issuer.verify(&token, "grant.manage", &payload()),
            Err(TokenError::OperationMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issuer = ConfirmTokenIssuer::new("test-secret");
        let other = ConfirmTokenIssuer::new("another-secret");
        let token = issuer.issue("schema.initialize", &payload()).unwrap();
        assert_eq!(
            other.verify(&token, "schema.initialize", &payload()),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = ConfirmTokenIssuer::new("test-secret").with_ttl_ms(0);
        let token = issuer.issue("schema.initialize", &payload()).unwrap();
        assert!(matches!(
            issuer.verify(&token, "schema.initialize", &payload()),
            Err(TokenError::Expired { .. })
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let issuer = ConfirmTokenIssuer::new("test-secret");
        let token = issuer.issue("schema.initialize", &payload()).unwrap();
        let tampered = format!("00{}", &token[2..]);
        assert!(issuer
            .verify(&tampered, "schema.initialize", &payload())
            .is_err());
    }

    #[test]
    fn test_resubmission_needs_real_reason() {
        assert!(validate_resubmission(true, "migrating the session store").is_ok());
        assert!(validate_resubmission(true, "ok").is_err());
        assert!(validate_resubmission(false, "migrating the session store").is_err());
    }
}

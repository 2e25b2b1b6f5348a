// SPDX-License-Identifier: MIT OR Apache-2.0
//! Caller credential verification.
//!
//! The gateway currently requires only the pre-shared-key path; passport and
//! mTLS credentials are parsed into the envelope but not cryptographically
//! verified — [`Verifier::verify_passport`] is the designated extension point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use fabric_core::{AuthContext, AuthMode};
use fabric_error::{ErrorCode, GatewayError};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Principal id assigned to callers admitted by PSK.
const PSK_PRINCIPAL: &str = "psk-client";

/// Verifies inbound credential material and produces an [`AuthContext`].
#[derive(Debug, Clone)]
pub struct Verifier {
    shared_secret: Option<String>,
}

/// Structural form of a passport credential blob.
///
/// Signature verification is reserved; the fields are carried through to the
/// envelope unverified.
#[derive(Debug, Clone, Deserialize)]
struct PassportClaims {
    passport_id: String,
    principal: String,
    #[serde(default)]
    signature: Option<String>,
}

impl Verifier {
    /// Create a verifier with the given shared secret.
    ///
    /// `None` puts the verifier in open mode: every caller is admitted with
    /// an anonymous PSK context. Intended for local development only.
    #[must_use]
    pub fn new(shared_secret: Option<String>) -> Self {
        Self { shared_secret }
    }

    /// Returns `true` if a shared secret is configured.
    #[must_use]
    pub fn requires_credentials(&self) -> bool {
        self.shared_secret.is_some()
    }

    /// Verify bearer credential material from a transport.
    ///
    /// `credential` is the raw value of the `Authorization` header (HTTP) or
    /// equivalent out-of-band material. Recognised forms:
    ///
    /// - `Bearer <psk>` — constant-time comparison against the configured
    ///   secret;
    /// - `Passport <base64-json>` — structurally parsed, never verified.
    ///
    /// # Errors
    ///
    /// `AUTH_DENIED` when a recognised credential does not match;
    /// `AUTH_INVALID` when the credential is structurally malformed or
    /// missing while a secret is configured.
    pub fn verify(&self, credential: Option<&str>) -> Result<AuthContext, GatewayError> {
        let Some(secret) = self.shared_secret.as_deref() else {
            // Open mode: no secret configured.
            return Ok(AuthContext::psk("anonymous"));
        };

        let Some(raw) = credential else {
            return Err(GatewayError::new(
                ErrorCode::AuthDenied,
                "missing credentials",
            ));
        };

        let raw = raw.trim();
        if let Some(token) = raw.strip_prefix("Bearer ") {
            return self.verify_psk(token.trim(), secret);
        }
        if let Some(blob) = raw.strip_prefix("Passport ") {
            return self.verify_passport(blob.trim());
        }

        Err(GatewayError::new(
            ErrorCode::AuthInvalid,
            "unrecognized credential scheme",
        ))
    }

    /// Constant-time PSK comparison.
    ///
    /// Both sides are SHA-256 digested first so the comparison length is
    /// fixed regardless of input lengths.
    fn verify_psk(&self, token: &str, secret: &str) -> Result<AuthContext, GatewayError> {
        if token.is_empty() {
            return Err(GatewayError::new(ErrorCode::AuthInvalid, "empty bearer token"));
        }

        let presented = Sha256::digest(token.as_bytes());
        let expected = Sha256::digest(secret.as_bytes());

        if presented.ct_eq(&expected).into() {
            debug!(target: "fabric.auth", mode = "psk", "caller authenticated");
            Ok(AuthContext::psk(PSK_PRINCIPAL))
        } else {
            Err(GatewayError::new(ErrorCode::AuthDenied, "invalid credentials"))
        }
    }

    /// Parse a passport credential into an [`AuthContext`].
    ///
    /// Extension point: this revision checks structure only. A future
    /// revision verifies `signature` and enforces expiry (`AUTH_EXPIRED`).
    fn verify_passport(&self, blob: &str) -> Result<AuthContext, GatewayError> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|_| GatewayError::new(ErrorCode::AuthInvalid, "passport is not valid base64"))?;
        let claims: PassportClaims = serde_json::from_slice(&bytes)
            .map_err(|_| GatewayError::new(ErrorCode::AuthInvalid, "passport structure invalid"))?;

        debug!(
            target: "fabric.auth",
            mode = "passport",
            passport_id = %claims.passport_id,
            "passport parsed (signature verification reserved)"
        );

        Ok(AuthContext {
            mode: AuthMode::Passport,
            principal_id: claims.principal,
            agent_passport_id: Some(claims.passport_id),
            signature: claims.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> Verifier {
        Verifier::new(Some("s3cret".into()))
    }

    #[test]
    fn correct_psk_is_admitted() {
        let ctx = verifier().verify(Some("Bearer s3cret")).unwrap();
        assert_eq!(ctx.mode, AuthMode::Psk);
        assert_eq!(ctx.principal_id, PSK_PRINCIPAL);
    }

    #[test]
    fn wrong_psk_is_denied() {
        let err = verifier().verify(Some("Bearer wrong")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthDenied);
    }

    #[test]
    fn missing_credentials_denied() {
        let err = verifier().verify(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthDenied);
    }

    #[test]
    fn empty_bearer_is_invalid() {
        let err = verifier().verify(Some("Bearer ")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
    }

    #[test]
    fn unknown_scheme_is_invalid() {
        let err = verifier().verify(Some("Basic dXNlcg==")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
    }

    #[test]
    fn open_mode_admits_everyone() {
        let v = Verifier::new(None);
        assert!(!v.requires_credentials());
        let ctx = v.verify(None).unwrap();
        assert_eq!(ctx.principal_id, "anonymous");
    }

    #[test]
    fn passport_is_parsed_but_not_verified() {
        let claims = serde_json::json!({
            "passport_id": "pp-1",
            "principal": "agent-a",
            "signature": "unchecked",
        });
        let blob = BASE64.encode(serde_json::to_vec(&claims).unwrap());
        let ctx = verifier().verify(Some(&format!("Passport {blob}"))).unwrap();
        assert_eq!(ctx.mode, AuthMode::Passport);
        assert_eq!(ctx.principal_id, "agent-a");
        assert_eq!(ctx.agent_passport_id.as_deref(), Some("pp-1"));
        assert_eq!(ctx.signature.as_deref(), Some("unchecked"));
    }

    #[test]
    fn garbage_passport_is_invalid() {
        let err = verifier().verify(Some("Passport !!!not-base64")).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);

        let blob = BASE64.encode(b"not json");
        let err = verifier()
            .verify(Some(&format!("Passport {blob}")))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
    }
}

//! Claim extraction from provider-issued access tokens.
//!
//! The provider's access token is a JWT whose `jti` claim carries the
//! encrypted consent id. The token is received over the authenticated
//! token endpoint and is never trusted for authorization decisions here,
//! so claims are read without verifying the signature.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::signing::ConsentCipher;
use crate::types::Timestamp;

/// The subset of access-token claims this system reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl AccessTokenClaims {
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.exp.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

/// Decode the payload of a JWT without verifying its signature or expiry.
pub fn decode_unverified(token: &str) -> Result<AccessTokenClaims, CoreError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| CoreError::Validation(format!("Malformed access token: {e}")))
}

/// Recover the plaintext consent token embedded in an access token.
///
/// Returns `None` when the token is not a JWT, has no `jti`, or the `jti`
/// does not decrypt. Requests then proceed without a consent header.
pub fn consent_token_from_access_token(
    access_token: &str,
    cipher: &ConsentCipher,
) -> Option<String> {
    let claims = match decode_unverified(access_token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Access token carries no readable claims");
            return None;
        }
    };
    let jti = claims.jti.filter(|j| !j.is_empty())?;
    cipher.decrypt(&jti)
}

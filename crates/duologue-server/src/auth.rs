//! Client token verification.
//!
//! Clients present an HS512 JWT carrying a `memberId` claim (number or
//! string). An optional `Bearer ` prefix is tolerated. Expiry is enforced
//! when the token carries an `exp` claim.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use duologue_core::ParticipantId;

/// Why a token was rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was supplied.
    #[error("missing token")]
    MissingToken,
    /// Signature, structure, or expiry check failed.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    /// The token carried no usable `memberId` claim.
    #[error("token has no memberId claim")]
    MissingMemberId,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(rename = "memberId")]
    member_id: Option<serde_json::Value>,
}

/// Verify a client token and extract the participant identity.
pub fn verify_token(token: &str, secret: &str) -> Result<ParticipantId, AuthError> {
    let raw = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    if raw.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let mut validation = Validation::new(Algorithm::HS512);
    // exp is optional; validated when present.
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<Claims>(
        raw,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    let member_id = match data.claims.member_id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(AuthError::MissingMemberId),
    };
    Ok(ParticipantId::from_string(member_id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

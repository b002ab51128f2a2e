use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};

/// Bearer token lifetime for sovereign feed subscribers
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subscriber id
    pub jti: String, // token id (unique per token)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
    pub iss: String, // Issuer
}

/// Verifies bearer credentials presented on sovereign feed upgrades.
///
/// Credential issuance lives elsewhere; the relay only consumes the
/// pass/fail outcome of verification. The mint helper exists for operators
/// and tests.
pub struct FeedAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl FeedAuthenticator {
    pub fn new(secret: &str, issuer: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
        }
    }

    /// Mint a subscriber token
    pub fn create_token(&self, subscriber_id: &str) -> RelayResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(TOKEN_TTL_HOURS);

        let claims = Claims {
            sub: subscriber_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Verify a raw token string
    pub fn verify_token(&self, token: &str) -> RelayResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Authorize an upgrade request from its Authorization header value.
    ///
    /// Missing header, non-bearer scheme, and invalid tokens all fail; the
    /// caller rejects the upgrade before any transport handshake.
    pub fn authorize(&self, auth_header: Option<&str>) -> RelayResult<Claims> {
        let header = auth_header.ok_or_else(|| RelayError::auth("missing Authorization header"))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            RelayError::auth("Authorization header is not a bearer credential")
        })?;
        self.verify_token(token.trim())
    }
}

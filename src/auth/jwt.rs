use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by the session cookie.
///
/// Written on sign-in by the JWT callback and re-signed whenever the API
/// access token is refreshed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_access_token_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub exp: i64,
}

/// Signs and verifies session cookies (HS256 with `AUTH_SECRET`).
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    max_age_secs: u64,
}

impl SessionCodec {
    pub fn new(secret: &str, max_age_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            max_age_secs,
        }
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    pub fn encode(&self, token: &Token) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), token, &self.encoding_key)
            .context("Failed to sign session token")
    }

    /// Verify signature and expiry, then return the claims.
    pub fn decode(&self, raw: &str) -> Result<Token> {
        match decode::<Token>(raw, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                let token_hash = format!("{:x}", md5::compute(raw));
                tracing::warn!(
                    error = ?e,
                    token_hash = %token_hash,
                    token_len = raw.len(),
                    "Session token rejected"
                );
                anyhow::bail!("Session token validation failed: {}", e);
            }
        }
    }
}

//! Downstream API access tokens.
//!
//! The sign-in token is issued for the app itself. Calls to the backend API
//! need a token with the API's `user_impersonation` scope, obtained by
//! redeeming the stored refresh token against the tenant's token endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::helpers::decode_claims_unverified;
use crate::config::Config;

/// Claims read from an API access token. Not a trust boundary: the token
/// came straight from the token endpoint and the backend verifies it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiTokenClaims {
    pub exp: i64,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiAccessToken {
    pub access_token: String,
    /// Unix seconds, from the token's `exp` claim
    pub expires_at: i64,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchanges a refresh token for an API access token.
#[async_trait]
pub trait ApiTokenSource: Send + Sync {
    async fn get_api_access_token(&self, refresh_token: &str) -> Result<ApiAccessToken>;
}

/// Token endpoint client for the configured tenant.
pub struct ApiTokenClient {
    http_client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ApiTokenClient {
    pub fn new(config: &Config, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            token_endpoint: config.token_endpoint(),
            client_id: config.azure_ad_client_id.clone(),
            client_secret: config.azure_ad_client_secret.clone(),
            scope: config.api_scope(),
        }
    }
}

#[async_trait]
impl ApiTokenSource for ApiTokenClient {
    async fn get_api_access_token(&self, refresh_token: &str) -> Result<ApiAccessToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        tracing::debug!(scope = %self.scope, "Requesting API access token");

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_body,
                "API access token request failed"
            );
            anyhow::bail!("Failed to get API access token: HTTP {}", status.as_u16());
        }

        let data: TokenEndpointResponse = response
            .json()
            .await
            .context("Failed to parse token endpoint response")?;

        let access_token = data
            .access_token
            .filter(|t| !t.is_empty())
            .context("Failed to get API access token")?;

        let claims: ApiTokenClaims = decode_claims_unverified(&access_token)
            .context("API access token payload could not be decoded")?;

        tracing::info!(
            expires_at = claims.exp,
            roles = ?claims.roles,
            "Acquired API access token"
        );

        Ok(ApiAccessToken {
            access_token,
            expires_at: claims.exp,
            roles: claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fake_jwt(payload_json: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload_json);
        format!("{header}.{payload}.fake-signature")
    }

    fn client_for(server: &MockServer) -> ApiTokenClient {
        let uri = server.uri();
        let config = Config::from_lookup(move |key| match key {
            "AZURE_AD_TENANT_ID" => Some("tenant".to_string()),
            "AZURE_AD_CLIENT_ID" => Some("client".to_string()),
            "AZURE_AD_CLIENT_SECRET" => Some("secret".to_string()),
            "AZURE_AD_API_CLIENT_ID" => Some("api-client".to_string()),
            "AUTH_SECRET" => Some("signing".to_string()),
            "API_URL" => Some("https://api.example.com".to_string()),
            "AZURE_AD_AUTHORITY_HOST" => Some(uri.clone()),
            _ => None,
        })
        .unwrap();
        ApiTokenClient::new(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_returns_token_with_decoded_expiry_and_roles() {
        let server = MockServer::start().await;
        let api_token = fake_jwt(r#"{"exp":4102444800,"roles":["Docs.Read","Docs.Write"]}"#);

        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=stored-refresh"))
            .and(body_string_contains("client_id=client"))
            .and(body_string_contains("client_secret=secret"))
            .and(body_string_contains(
                "scope=api%3A%2F%2Fapi-client%2Fuser_impersonation",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": api_token,
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server)
            .get_api_access_token("stored-refresh")
            .await
            .unwrap();

        assert_eq!(token.access_token, api_token);
        assert_eq!(token.expires_at, 4102444800);
        assert_eq!(token.roles, vec!["Docs.Read", "Docs.Write"]);
    }

    #[tokio::test]
    async fn test_missing_access_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_api_access_token("stored-refresh")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to get API access token"));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        assert!(client_for(&server)
            .get_api_access_token("revoked")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_undecodable_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "opaque"})),
            )
            .mount(&server)
            .await;

        assert!(client_for(&server)
            .get_api_access_token("stored-refresh")
            .await
            .is_err());
    }
}

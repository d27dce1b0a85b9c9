// =============================================================================
// GOOGLE AUTHENTICATION
// =============================================================================
//
// Two ways to obtain an OAuth2 access token for the Drive and Docs APIs:
//
// 1. **Refresh token** (`GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`,
//    `GOOGLE_REFRESH_TOKEN`): acts as the user who granted consent, so the
//    assistant sees that user's own Drive. The refresh token is obtained once
//    out of band; there is no consent flow here.
//
// 2. **Service account** (`GOOGLE_SERVICE_ACCOUNT_KEY` path or
//    `GOOGLE_SERVICE_ACCOUNT_JSON` content): signs a JWT with the account's
//    private key. Only files shared with the service account email are
//    visible.
//
// Both cache the token and fetch a new one a minute before it expires.

use super::google_api::GoogleError;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Full Drive access plus Docs editing.
pub const GOOGLE_SCOPES: &str =
    "https://www.googleapis.com/auth/drive https://www.googleapis.com/auth/documents";

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Anything that can hand out a currently valid access token.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, GoogleError>;
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Access token cache shared by both authenticators.
#[derive(Default)]
struct TokenCache {
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Returns the cached token unless it expires within the refresh margin.
    async fn valid_token(&self, now: SystemTime) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|t| t.expires_at > now + REFRESH_MARGIN)
            .map(|t| t.token.clone())
    }

    async fn store(&self, token: String, expires_in: u64, now: SystemTime) {
        let mut cached = self.cached.write().await;
        *cached = Some(CachedToken {
            token,
            expires_at: now + Duration::from_secs(expires_in),
        });
    }
}

/// Posts a token request form and decodes the grant.
async fn request_token(
    client: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, GoogleError> {
    let response = client.post(token_uri).form(form).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await?;
        let reason = serde_json::from_str::<TokenErrorResponse>(&text)
            .map(|e| match e.error_description {
                Some(description) => format!("{}: {}", e.error, description),
                None => e.error,
            })
            .unwrap_or(text);
        return Err(GoogleError::Auth(format!(
            "token exchange failed ({}): {}",
            status, reason
        )));
    }

    Ok(response.json().await?)
}

// =============================================================================
// REFRESH TOKEN
// =============================================================================

pub struct RefreshTokenAuth {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
    client: Client,
    cache: TokenCache,
}

impl RefreshTokenAuth {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            client: Client::new(),
            cache: TokenCache::default(),
        }
    }

    pub fn with_token_uri(mut self, token_uri: &str) -> Self {
        self.token_uri = token_uri.to_string();
        self
    }
}

#[async_trait]
impl AccessTokenSource for RefreshTokenAuth {
    async fn access_token(&self) -> Result<String, GoogleError> {
        if let Some(token) = self.cache.valid_token(SystemTime::now()).await {
            return Ok(token);
        }

        tracing::debug!("Refreshing Google access token (refresh token grant)");
        let grant = request_token(
            &self.client,
            &self.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ],
        )
        .await?;

        self.cache
            .store(grant.access_token.clone(), grant.expires_in, SystemTime::now())
            .await;
        Ok(grant.access_token)
    }
}

// =============================================================================
// SERVICE ACCOUNT
// =============================================================================

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    /// PEM-encoded RSA private key.
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// JWT claims for the service-account bearer grant.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    /// At most one hour after `iat`.
    exp: u64,
}

pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    client: Client,
    cache: TokenCache,
}

impl ServiceAccountAuth {
    /// Loads credentials from a JSON key file.
    pub async fn from_file(path: &str) -> Result<Self, GoogleError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GoogleError::Credentials(format!("cannot read {}: {}", path, e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, GoogleError> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(json)
            .map_err(|e| GoogleError::Credentials(e.to_string()))?;
        Ok(Self {
            credentials,
            client: Client::new(),
            cache: TokenCache::default(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    fn claims(&self, now: u64) -> JwtClaims {
        JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: GOOGLE_SCOPES.to_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        }
    }

    fn signed_assertion(&self) -> Result<String, GoogleError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GoogleError::Auth(e.to_string()))?
            .as_secs();

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| GoogleError::Credentials(format!("invalid private key: {}", e)))?;
        encode(&Header::new(Algorithm::RS256), &self.claims(now), &key)
            .map_err(|e| GoogleError::Auth(format!("JWT signing failed: {}", e)))
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, GoogleError> {
        if let Some(token) = self.cache.valid_token(SystemTime::now()).await {
            return Ok(token);
        }

        tracing::debug!(
            "Refreshing Google access token for service account {}",
            self.credentials.client_email
        );
        let assertion = self.signed_assertion()?;
        let grant = request_token(
            &self.client,
            &self.credentials.token_uri,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ],
        )
        .await?;

        self.cache
            .store(grant.access_token.clone(), grant.expires_in, SystemTime::now())
            .await;
        Ok(grant.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::super::google_api::test_support::spawn_stub;
    use super::*;
    use axum::routing::post;
    use axum::Json;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cache_refreshes_inside_margin() {
        let cache = TokenCache::default();
        let now = SystemTime::now();
        assert!(cache.valid_token(now).await.is_none());

        cache.store("abc".to_string(), 3600, now).await;
        assert_eq!(cache.valid_token(now).await, Some("abc".to_string()));

        // 30 seconds before expiry counts as expired
        let late = now + Duration::from_secs(3600 - 30);
        assert!(cache.valid_token(late).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_grant_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = axum::Router::new().route(
            "/token",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer" }))
                }
            }),
        );
        let base = spawn_stub(router).await;

        let auth = RefreshTokenAuth::new("id".into(), "secret".into(), "refresh".into())
            .with_token_uri(&format!("{}/token", base));

        assert_eq!(auth.access_token().await.unwrap(), "ya29.fresh");
        assert_eq!(auth.access_token().await.unwrap(), "ya29.fresh");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_grant_reports_reason() {
        let router = axum::Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant", "error_description": "Token has been expired or revoked." })),
                )
            }),
        );
        let base = spawn_stub(router).await;

        let auth = RefreshTokenAuth::new("id".into(), "secret".into(), "stale".into())
            .with_token_uri(&format!("{}/token", base));

        let err = auth.access_token().await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_service_account_claims() {
        let auth = ServiceAccountAuth::from_json(
            r#"{"client_email":"bot@proj.iam.gserviceaccount.com","private_key":"not-a-key"}"#,
        )
        .unwrap();

        assert_eq!(auth.client_email(), "bot@proj.iam.gserviceaccount.com");
        let claims = auth.claims(1_000);
        assert_eq!(claims.aud, GOOGLE_TOKEN_URI);
        assert_eq!(claims.exp, 4_600);
        assert!(claims.scope.contains("/auth/drive"));
        assert!(claims.scope.contains("/auth/documents"));

        // A malformed key fails at signing time, not at load time
        assert!(matches!(
            auth.signed_assertion(),
            Err(GoogleError::Credentials(_))
        ));
    }

    #[test]
    fn test_service_account_rejects_incomplete_json() {
        assert!(matches!(
            ServiceAccountAuth::from_json(r#"{"client_email":"x"}"#),
            Err(GoogleError::Credentials(_))
        ));
    }
}

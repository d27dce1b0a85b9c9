// =============================================================================
// GOOGLE API TRANSPORT
// =============================================================================
//
// Shared plumbing for the Drive and Docs clients: every request carries a
// bearer token from an `AccessTokenSource`, and non-2xx responses are parsed
// from Google's standard error body (`{"error": {"code", "message"}}`).

use super::auth::AccessTokenSource;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DOCS_BASE_URL: &str = "https://docs.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid Google credentials: {0}")]
    Credentials(String),

    #[error("Could not extract document ID from: {0}")]
    InvalidDocumentId(String),

    #[error("Unexpected response from Google: {0}")]
    Unexpected(String),
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Authenticated HTTP access to Google's REST APIs.
pub struct GoogleApi {
    client: Client,
    auth: Arc<dyn AccessTokenSource>,
}

impl GoogleApi {
    pub fn new(auth: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            client: Client::new(),
            auth,
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, GoogleError> {
        let request = self.client.get(url).query(query);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, GoogleError> {
        let request = self.client.post(url).query(query).json(body);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// Sends a DELETE; Google answers with an empty body on success.
    pub async fn delete(&self, url: &str) -> Result<(), GoogleError> {
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, GoogleError> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(GoogleError::Api { status, message });
        }

        Ok(response)
    }
}

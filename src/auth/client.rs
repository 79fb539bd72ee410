//! OAuth2 token client for the provider's token endpoint
//!
//! Exchanges authorization codes for tokens, refreshes access tokens, and
//! notifies a registered listener whenever new tokens arrive so they can be
//! persisted independently of the request/response path.

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::Result;
use crate::error::Error;
use super::credentials::Credentials;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Callback invoked with every new token set the client obtains
pub type TokenListener = Box<dyn Fn(Credentials) + Send + Sync>;

/// Provider token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: String,
    #[serde(default)]
    scope: Option<String>,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'a str,
}

/// In-memory authorized client for one OAuth2 principal.
///
/// Shared behind an `Arc`; credentials are replaced wholesale on exchange
/// and refresh, never mutated field by field.
pub struct OAuth2Client {
    client_id: String,
    client_secret: String,
    token_url: String,
    http_client: Client,
    credentials: Mutex<Option<Credentials>>,
    token_listener: Mutex<Option<TokenListener>>,
}

impl fmt::Debug for OAuth2Client {
    // Manual impl: the boxed listener is not Debug, and the client secret
    // must never end up in debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl OAuth2Client {
    /// Create a client for the given installed-application identity
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            http_client: Client::new(),
            credentials: Mutex::new(None),
            token_listener: Mutex::new(None),
        }
    }

    /// Override the token endpoint (used by tests against a mock server)
    pub fn with_token_url(mut self, token_url: String) -> Self {
        self.token_url = token_url;
        self
    }

    /// The OAuth client id
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Register the listener invoked whenever new tokens are obtained
    pub fn on_tokens(&self, listener: TokenListener) {
        *self.token_listener.lock() = Some(listener);
    }

    /// Replace the current credentials without notifying the listener
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock() = Some(credentials);
    }

    /// Snapshot of the current credentials
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.lock().clone()
    }

    /// Whether the current token carries an expiry inside the buffer window
    pub fn needs_refresh(&self) -> bool {
        self.credentials
            .lock()
            .as_ref()
            .map(Credentials::is_expiring_soon)
            .unwrap_or(false)
    }

    /// Exchange an authorization code for tokens and install them
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credentials> {
        let request = ExchangeRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
            redirect_uri,
            grant_type: "authorization_code",
        };

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Provider(format!("Token exchange failed: {}", error_text)));
        }

        let token_response: TokenResponse = response.json().await?;
        let credentials = credentials_from_response(token_response, None);
        self.install(credentials.clone());
        Ok(credentials)
    }

    /// Refresh the access token using the stored refresh token.
    ///
    /// The provider may omit the refresh token from the response; the
    /// existing one is carried forward so the session is not stranded.
    pub async fn refresh_access_token(&self) -> Result<Credentials> {
        let refresh_token = self
            .credentials()
            .and_then(|c| c.refresh_token)
            .ok_or_else(|| Error::Provider("No refresh token available".to_string()))?;

        let request = RefreshRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token: &refresh_token,
            grant_type: "refresh_token",
        };

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Provider(format!("Token refresh failed: {}", error_text)));
        }

        let token_response: TokenResponse = response.json().await?;
        let credentials = credentials_from_response(token_response, Some(refresh_token));
        self.install(credentials.clone());
        Ok(credentials)
    }

    /// Install new credentials and notify the token listener
    fn install(&self, credentials: Credentials) {
        *self.credentials.lock() = Some(credentials.clone());
        if let Some(listener) = self.token_listener.lock().as_ref() {
            listener(credentials);
        }
    }
}

fn credentials_from_response(
    response: TokenResponse,
    fallback_refresh: Option<String>,
) -> Credentials {
    let expires_at = response
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs));

    Credentials {
        access_token: Some(response.access_token),
        refresh_token: response.refresh_token.or(fallback_refresh),
        token_type: response.token_type,
        scope: response.scope,
        expires_at,
    }
}

//! Auth session manager
//!
//! Owns the in-memory authorized client and decides between the cached
//! credentials, a transparent refresh, and a fresh interactive browser
//! login. One manager per process, driven from a single caller context;
//! overlapping `get_authenticated_client` calls are not internally
//! serialized and may race to start duplicate listeners.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;
use crate::Result;
use crate::error::Error;
use crate::config::{self, ClientSecret};
use super::callback_server::{redirect_uri, CallbackServer};
use super::client::OAuth2Client;
use super::credentials::Credentials;
use super::port;
use super::storage::CredentialStorage;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Interactive login must complete within this window
const LOGIN_TIMEOUT_SECS: u64 = 5 * 60;

/// Coordinates the in-memory client, the token cache, and the interactive
/// login flow.
pub struct AuthManager {
    scopes: Vec<String>,
    storage: Arc<CredentialStorage>,
    client_secret_path: PathBuf,
    login_timeout: Duration,
    client: Option<Arc<OAuth2Client>>,
}

impl AuthManager {
    /// Create a manager requesting the given scopes
    pub fn new(scopes: Vec<String>, storage: Arc<CredentialStorage>) -> Self {
        Self::with_client_secret_path(scopes, storage, config::client_secret_path())
    }

    /// Create a manager reading the client secret from an explicit path
    pub fn with_client_secret_path(
        scopes: Vec<String>,
        storage: Arc<CredentialStorage>,
        client_secret_path: PathBuf,
    ) -> Self {
        Self {
            scopes,
            storage,
            client_secret_path,
            login_timeout: Duration::from_secs(LOGIN_TIMEOUT_SECS),
            client: None,
        }
    }

    /// Override the login timeout (used by tests)
    pub fn with_login_timeout(mut self, login_timeout: Duration) -> Self {
        self.login_timeout = login_timeout;
        self
    }

    /// Get an authorized client, logging in interactively when needed.
    ///
    /// Repeat calls return the same client instance; a token within five
    /// minutes of expiry is refreshed transparently first.
    pub async fn get_authenticated_client(&mut self) -> Result<Arc<OAuth2Client>> {
        if let Some(client) = self.client.clone() {
            self.refresh_if_needed(&client).await;
            return Ok(client);
        }

        let secret = ClientSecret::load(&self.client_secret_path)?;
        let client = Arc::new(OAuth2Client::new(secret.client_id, secret.client_secret));

        // Persist any tokens the client obtains out of band, refreshes
        // included. Save failures only cost us the cache, so they log.
        let storage = self.storage.clone();
        client.on_tokens(Box::new(move |credentials| {
            let storage = storage.clone();
            tokio::spawn(async move {
                if let Err(e) = storage.save_main(&credentials).await {
                    tracing::warn!("Failed to persist new tokens: {}", e);
                }
            });
        }));

        match self.storage.load_main().await? {
            Some(credentials) => {
                tracing::info!("Loaded credentials from token cache");
                self.check_scopes(&credentials);
                client.set_credentials(credentials);
                self.client = Some(client.clone());
                self.refresh_if_needed(&client).await;
            }
            None => {
                tracing::info!("No cached credentials, starting interactive login");
                self.login_with_browser(client.clone()).await?;
                self.client = Some(client.clone());
            }
        }

        Ok(client)
    }

    /// Drop the in-memory client and clear persisted credentials.
    ///
    /// Both steps always run; a store failure propagates.
    pub async fn clear_auth(&mut self) -> Result<()> {
        self.client = None;
        self.storage.clear_main().await
    }

    /// Force a refresh of the current client; no-op when none exists
    pub async fn refresh_token(&self) -> Result<()> {
        if let Some(client) = &self.client {
            client.refresh_access_token().await?;
        }
        Ok(())
    }

    /// Lenient scope check on cache load.
    ///
    /// Providers echo granted scopes in varying string forms, so a mismatch
    /// logs instead of forcing a spurious re-login.
    fn check_scopes(&self, credentials: &Credentials) {
        let granted: HashSet<&str> = credentials
            .scope
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .collect();

        let missing: Vec<&str> = self
            .scopes
            .iter()
            .map(String::as_str)
            .filter(|scope| !granted.contains(scope))
            .collect();

        if !missing.is_empty() {
            tracing::warn!(
                "Cached token may be missing scopes: {}",
                missing.join(", ")
            );
        }
    }

    /// Refresh proactively when the token is near expiry.
    ///
    /// Failures log and fall through: a slightly stale token may still be
    /// accepted downstream, and the next real call surfaces the problem.
    async fn refresh_if_needed(&self, client: &OAuth2Client) {
        if !client.needs_refresh() {
            return;
        }

        tracing::info!("Access token expiring soon, refreshing");
        if let Err(e) = client.refresh_access_token().await {
            tracing::warn!("Token refresh failed: {}", e);
        }
    }

    /// Run the interactive browser login flow
    async fn login_with_browser(&self, client: Arc<OAuth2Client>) -> Result<()> {
        let port = port::find_available_port().await?;
        let auth_url = self.build_auth_url(client.client_id(), &redirect_uri(port))?;

        let (server, pending) =
            CallbackServer::start(port, client, self.storage.clone()).await?;

        println!("Opening your browser to sign in...");
        println!("If it does not open, visit this URL:\n{}\n", auth_url);
        if let Err(e) = open::that(&auth_url) {
            tracing::warn!("Failed to open browser: {}", e);
        }

        let outcome = timeout(self.login_timeout, pending).await;
        // The listener goes away on every exit path of the race
        server.shutdown().await;

        match outcome {
            Err(_) => Err(Error::Timeout {
                secs: self.login_timeout.as_secs(),
            }),
            Ok(Err(_)) => Err(Error::Provider(
                "Login flow ended before a callback was received".to_string(),
            )),
            Ok(Ok(result)) => result,
        }
    }

    /// Build the provider authorization URL.
    ///
    /// `prompt=consent` is forced because providers omit the refresh token
    /// on repeat authorizations for the same principal.
    fn build_auth_url(&self, client_id: &str, redirect: &str) -> Result<String> {
        let mut url = Url::parse(GOOGLE_AUTH_URL)
            .map_err(|e| Error::Provider(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.to_string())
    }
}

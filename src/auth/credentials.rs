//! Credential shapes: provider tokens in memory, stored records on disk

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How close to expiry a token may get before it counts as expiring
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 5 * 60;

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth2 tokens in the provider's shape, as held by the in-memory client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// The access token for API requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// The refresh token for obtaining new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Scopes granted by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// When the access token expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Check if the access token expires within the buffer window.
    ///
    /// A missing expiry means the token does not expire.
    pub fn is_expiring_soon(&self) -> bool {
        match self.expires_at {
            Some(expires) => Utc::now() + Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) >= expires,
            None => false,
        }
    }

    /// Check if a refresh token is available
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// One persisted credential record in the token cache.
///
/// Timestamps are stored as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Key identifying the account this record belongs to
    pub account_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// When this record was last written
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

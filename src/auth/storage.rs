//! Single-account credential storage over the token store
//!
//! The store keeps a keyed table and could hold several accounts; this
//! adapter pins everything to one fixed key and translates between the
//! stored record and the provider's token shape.

use chrono::Utc;
use crate::Result;
use super::credentials::{Credentials, StoredCredential};
use super::store::TokenStore;

/// Account key under which the single cached principal is stored
pub const MAIN_ACCOUNT_KEY: &str = "main-account";

/// Adapter between [`TokenStore`] records and provider [`Credentials`].
///
/// Constructed once at startup and shared by handle; there is no hidden
/// global instance.
pub struct CredentialStorage {
    store: TokenStore,
}

impl CredentialStorage {
    /// Wrap a token store
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    /// Access the underlying store
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Load the cached credentials for the main account, if any.
    ///
    /// The expiry field is omitted entirely when absent; some provider
    /// clients treat an explicit zero expiry as "already expired".
    pub async fn load_main(&self) -> Result<Option<Credentials>> {
        let record = match self.store.get(MAIN_ACCOUNT_KEY).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        Ok(Some(Credentials {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            token_type: record.token_type,
            scope: record.scope,
            expires_at: record.expires_at,
        }))
    }

    /// Save credentials for the main account.
    ///
    /// Refresh responses legitimately omit the refresh token on repeat
    /// refreshes, so an incoming payload without one keeps whatever refresh
    /// token is already on record.
    pub async fn save_main(&self, credentials: &Credentials) -> Result<()> {
        let refresh_token = match credentials.refresh_token.clone() {
            Some(token) => Some(token),
            None => {
                let existing = self.store.get(MAIN_ACCOUNT_KEY).await?;
                existing.and_then(|record| record.refresh_token)
            }
        };

        let record = StoredCredential {
            account_key: MAIN_ACCOUNT_KEY.to_string(),
            access_token: credentials.access_token.clone(),
            refresh_token,
            token_type: if credentials.token_type.is_empty() {
                "Bearer".to_string()
            } else {
                credentials.token_type.clone()
            },
            scope: credentials.scope.clone(),
            expires_at: credentials.expires_at,
            updated_at: Utc::now(),
        };

        self.store.set(record).await
    }

    /// Delete the cached credentials for the main account
    pub async fn clear_main(&self) -> Result<()> {
        self.store.delete(MAIN_ACCOUNT_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn storage(tmp: &TempDir) -> CredentialStorage {
        CredentialStorage::new(TokenStore::new(tmp.path().join("token.json")))
    }

    fn creds(access: &str, refresh: Option<&str>) -> Credentials {
        Credentials {
            access_token: Some(access.to_string()),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            scope: Some("scope-a".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn test_load_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(storage(&tmp).load_main().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        storage.save_main(&creds("a1", Some("r1"))).await.unwrap();
        let loaded = storage.load_main().await.unwrap().unwrap();

        assert_eq!(loaded.access_token.as_deref(), Some("a1"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("r1"));
        assert_eq!(loaded.scope.as_deref(), Some("scope-a"));
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_save_preserves_stored_refresh_token() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        storage.save_main(&creds("a1", Some("r1"))).await.unwrap();
        // A bare access-token refresh comes back without a refresh token
        storage.save_main(&creds("a2", None)).await.unwrap();

        let loaded = storage.load_main().await.unwrap().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("a2"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_save_without_any_stored_refresh_token() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        storage.save_main(&creds("a1", None)).await.unwrap();
        storage.save_main(&creds("a2", None)).await.unwrap();

        let loaded = storage.load_main().await.unwrap().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("a2"));
        assert!(loaded.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        storage.save_main(&creds("a1", Some("r1"))).await.unwrap();
        storage.clear_main().await.unwrap();
        assert!(storage.load_main().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_without_record_fails() {
        let tmp = TempDir::new().unwrap();
        let err = storage(&tmp).clear_main().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_expiry_stays_absent() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        let mut c = creds("a1", Some("r1"));
        c.expires_at = None;
        storage.save_main(&c).await.unwrap();

        let loaded = storage.load_main().await.unwrap().unwrap();
        assert!(loaded.expires_at.is_none());
    }
}

//! Durable credential table on local disk
//!
//! The whole table is one JSON object keyed by account key, written with
//! owner-only permissions. The file is treated as a disposable cache: a
//! missing or unparseable file reads as an empty table, since re-login is
//! cheaper than crashing the tool over a corrupt cache.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use crate::Result;
use crate::error::Error;
use super::credentials::StoredCredential;

/// Credential store backed by a single JSON file.
///
/// Construct one per process and pass it by handle; load/save is not
/// cross-process locked, so concurrent writers get last-writer-wins.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store over the given backing file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate(record: &StoredCredential) -> Result<()> {
        if record.account_key.is_empty() {
            return Err(Error::InvalidRecord("account key is required".to_string()));
        }
        if record.access_token.is_none() && record.refresh_token.is_none() {
            return Err(Error::InvalidRecord(
                "access token or refresh token is required".to_string(),
            ));
        }
        if record.token_type.is_empty() {
            return Err(Error::InvalidRecord("token type is required".to_string()));
        }
        Ok(())
    }

    async fn load_table(&self) -> Result<HashMap<String, StoredCredential>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Token file does not exist");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(table) => Ok(table),
            Err(e) => {
                tracing::warn!(
                    "Token file at {} is corrupted or in an unknown format, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(HashMap::new())
            }
        }
    }

    async fn save_table(&self, table: &HashMap<String, StoredCredential>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if tokio::fs::metadata(parent).await.is_err() {
                tokio::fs::create_dir_all(parent).await?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    tokio::fs::set_permissions(parent, perms).await?;
                }
            }
        }

        let content = serde_json::to_string_pretty(table)?;
        tokio::fs::write(&self.path, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }

        Ok(())
    }

    async fn remove_file(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up the record for an account key
    pub async fn get(&self, key: &str) -> Result<Option<StoredCredential>> {
        let table = self.load_table().await?;
        Ok(table.get(key).cloned())
    }

    /// Validate and upsert a record, stamping `updated_at`
    pub async fn set(&self, record: StoredCredential) -> Result<()> {
        Self::validate(&record)?;

        let mut table = self.load_table().await?;
        let record = StoredCredential {
            updated_at: Utc::now(),
            ..record
        };
        table.insert(record.account_key.clone(), record);
        self.save_table(&table).await
    }

    /// Delete the record for an account key.
    ///
    /// Removes the backing file entirely when the table becomes empty,
    /// rather than writing an empty table.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut table = self.load_table().await?;

        if table.remove(key).is_none() {
            return Err(Error::NotFound(format!("No credentials stored for {}", key)));
        }

        if table.is_empty() {
            self.remove_file().await
        } else {
            self.save_table(&table).await
        }
    }

    /// List all account keys in the table
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let table = self.load_table().await?;
        Ok(table.keys().cloned().collect())
    }

    /// Load all records, dropping (and logging) any that fail validation
    pub async fn get_all_valid(&self) -> Result<HashMap<String, StoredCredential>> {
        let table = self.load_table().await?;

        let mut valid = HashMap::new();
        for (key, record) in table {
            match Self::validate(&record) {
                Ok(()) => {
                    valid.insert(key, record);
                }
                Err(e) => {
                    tracing::warn!("Skipping invalid credential record for {}: {}", key, e);
                }
            }
        }
        Ok(valid)
    }

    /// Remove the backing file, tolerating its prior absence
    pub async fn clear_all(&self) -> Result<()> {
        self.remove_file().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(key: &str) -> StoredCredential {
        StoredCredential {
            account_key: key.to_string(),
            access_token: Some("access-token".to_string()),
            refresh_token: Some("refresh-token".to_string()),
            token_type: "Bearer".to_string(),
            scope: Some("scope-a scope-b".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            updated_at: Utc::now() - chrono::Duration::days(1),
        }
    }

    fn store(tmp: &TempDir) -> TokenStore {
        TokenStore::new(tmp.path().join("token.json"))
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let original = record("acct");

        store.set(original.clone()).await.unwrap();
        let loaded = store.get("acct").await.unwrap().unwrap();

        assert_eq!(loaded.access_token, original.access_token);
        assert_eq!(loaded.refresh_token, original.refresh_token);
        assert_eq!(loaded.token_type, original.token_type);
        assert_eq!(loaded.scope, original.scope);
        // updated_at is stamped on write
        assert!(loaded.updated_at > original.updated_at);
    }

    #[tokio::test]
    async fn test_get_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        assert!(store.get("anything").await.unwrap().is_none());
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_rejects_record_without_tokens() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.set(record("acct")).await.unwrap();

        let mut bad = record("acct");
        bad.access_token = None;
        bad.refresh_token = None;
        let err = store.set(bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));

        // Prior state untouched
        let kept = store.get("acct").await.unwrap().unwrap();
        assert_eq!(kept.access_token.as_deref(), Some("access-token"));
    }

    #[tokio::test]
    async fn test_set_rejects_empty_key_and_token_type() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let mut bad = record("");
        bad.account_key = String::new();
        assert!(matches!(
            store.set(bad).await.unwrap_err(),
            Error::InvalidRecord(_)
        ));

        let mut bad = record("acct");
        bad.token_type = String::new();
        assert!(matches!(
            store.set(bad).await.unwrap_err(),
            Error::InvalidRecord(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_last_key_removes_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.set(record("only")).await.unwrap();
        assert!(store.path().exists());

        store.delete("only").await.unwrap();
        assert!(!store.path().exists());
        assert!(store.list_keys().await.unwrap().is_empty());
        assert!(store.get("only").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_keeps_other_records() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.set(record("a")).await.unwrap();
        store.set(record("b")).await.unwrap();
        store.delete("a").await.unwrap();

        assert!(store.path().exists());
        assert_eq!(store.list_keys().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_missing_key_fails() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let err = store.delete("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_corrupted_file_reads_as_empty_and_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        std::fs::write(store.path(), "{{{ not json").unwrap();

        assert!(store.get("acct").await.unwrap().is_none());

        store.set(record("acct")).await.unwrap();
        let loaded = store.get("acct").await.unwrap().unwrap();
        assert_eq!(loaded.account_key, "acct");
    }

    #[tokio::test]
    async fn test_legacy_shape_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        // Valid JSON, but not a credential table
        std::fs::write(store.path(), r#"["some", "legacy", "format"]"#).unwrap();

        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_valid_drops_invalid_records() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.set(record("good")).await.unwrap();

        // Sneak an invalid record past validation by editing the file
        let content = std::fs::read_to_string(store.path()).unwrap();
        let mut table: serde_json::Value = serde_json::from_str(&content).unwrap();
        table["bad"] = serde_json::json!({
            "account_key": "bad",
            "token_type": "Bearer",
            "updated_at": 1700000000000u64
        });
        std::fs::write(store.path(), serde_json::to_string(&table).unwrap()).unwrap();

        let valid = store.get_all_valid().await.unwrap();
        assert_eq!(valid.len(), 1);
        assert!(valid.contains_key("good"));
    }

    #[tokio::test]
    async fn test_clear_all_tolerates_absence() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.clear_all().await.unwrap();

        store.set(record("acct")).await.unwrap();
        store.clear_all().await.unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_written_with_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.set(record("acct")).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

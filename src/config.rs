//! Installation paths and client secret loading
//!
//! The client secret (`credentials.json`) and the token cache (`token.json`)
//! both live at the installation root, located by walking up from the
//! executable's directory.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use crate::Result;
use crate::error::Error;

/// Locate the installation root directory.
///
/// Walks up from the executable's directory looking for a `Cargo.toml`
/// marker, falling back to the current working directory when the binary
/// runs from an unexpected location.
pub fn install_root() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        let mut dir = exe.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d.join("Cargo.toml").exists() {
                return d;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Path to the OAuth client secret file
pub fn client_secret_path() -> PathBuf {
    install_root().join("credentials.json")
}

/// Path to the cached token file
pub fn token_cache_path() -> PathBuf {
    install_root().join("token.json")
}

/// OAuth client identity for the installed application
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,
}

/// On-disk shape of the client secret file: the client identity sits under
/// an `installed` property (standard for desktop apps) or `web`.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(default)]
    installed: Option<ClientSecret>,

    #[serde(default)]
    web: Option<ClientSecret>,
}

impl ClientSecret {
    /// Load and validate the client secret file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Could not find client secret at {}. Download the OAuth 2.0 Client ID JSON \
                 for a Desktop App from your provider's console and save it there.",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let file: ClientSecretFile = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        let secret = file.installed.or(file.web).ok_or_else(|| {
            Error::Config(format!(
                "Invalid client secret at {}: missing \"installed\" or \"web\" property",
                path.display()
            ))
        })?;

        if secret.client_id.is_empty() || secret.client_secret.is_empty() {
            return Err(Error::Config(format!(
                "Invalid client secret at {}: client_id and client_secret must be non-empty",
                path.display()
            )));
        }

        Ok(secret)
    }
}

//! OAuth2 authentication: session management and credential persistence
//!
//! This module provides:
//! - The durable credential store and its single-account adapter
//! - The OAuth2 token client (code exchange and refresh)
//! - The local callback listener for the installed-application flow
//! - The session manager tying cache, refresh, and interactive login together

mod callback_server;
mod client;
mod credentials;
mod manager;
mod port;
mod storage;
mod store;

pub use client::OAuth2Client;
pub use credentials::{Credentials, StoredCredential, TOKEN_EXPIRY_BUFFER_SECS};
pub use manager::AuthManager;
pub use storage::{CredentialStorage, MAIN_ACCOUNT_KEY};
pub use store::TokenStore;

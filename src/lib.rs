//! Authflow - local OAuth2 installed-application authentication
//!
//! This library obtains, caches, refreshes, and persists OAuth2 tokens for a
//! single account used by a local developer tool. The interactive login runs
//! the "installed application" flow: a temporary HTTP listener on an
//! OS-assigned port receives the authorization code redirect, the code is
//! exchanged for tokens, and the tokens land in an on-disk cache that
//! survives restarts.

pub mod auth;
pub mod config;
pub mod error;

pub use error::{Error, Result};

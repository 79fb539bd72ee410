//! Authflow CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use authflow::auth::{AuthManager, CredentialStorage, TokenStore};
use authflow::config;

/// Scopes requested by default
const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/userinfo.email",
];

#[derive(Parser)]
#[command(name = "authflow")]
#[command(about = "Local OAuth2 login and token cache for developer tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, reusing cached credentials when possible
    Login {
        /// Scope to request (repeatable; defaults to the built-in set)
        #[arg(long)]
        scope: Vec<String>,
    },

    /// Sign out and remove cached credentials
    Logout {
        /// Remove the whole token cache file, not just the main account
        #[arg(long)]
        all: bool,
    },

    /// Show the cached credential without touching the network
    Status,

    /// Force a token refresh
    Refresh,

    /// List account keys present in the token cache
    Accounts,
}

fn requested_scopes(scope: Vec<String>) -> Vec<String> {
    if scope.is_empty() {
        DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
    } else {
        scope
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let storage = Arc::new(CredentialStorage::new(TokenStore::new(
        config::token_cache_path(),
    )));

    match cli.command {
        Commands::Login { scope } => {
            let mut manager = AuthManager::new(requested_scopes(scope), storage.clone());
            let client = manager.get_authenticated_client().await?;

            match client.credentials().and_then(|c| c.expires_at) {
                Some(expires) => println!("Signed in. Access token valid until {}.", expires),
                None => println!("Signed in."),
            }
        }

        Commands::Logout { all } => {
            if all {
                storage.store().clear_all().await?;
                println!("Removed the token cache.");
            } else {
                let mut manager = AuthManager::new(Vec::new(), storage.clone());
                match manager.clear_auth().await {
                    Ok(()) => println!("Signed out and cleared cached credentials."),
                    Err(authflow::Error::NotFound(_)) => {
                        println!("No cached credentials to clear.")
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Commands::Status => match storage.load_main().await? {
            None => println!("Not signed in."),
            Some(credentials) => {
                println!("Signed in.");
                println!("  Token type:    {}", credentials.token_type);
                println!(
                    "  Refresh token: {}",
                    if credentials.can_refresh() { "yes" } else { "no" }
                );
                if let Some(scope) = &credentials.scope {
                    println!("  Scopes:        {}", scope);
                }
                match credentials.expires_at {
                    Some(expires) if credentials.is_expiring_soon() => {
                        println!("  Expires:       {} (stale, will refresh on next use)", expires)
                    }
                    Some(expires) => println!("  Expires:       {}", expires),
                    None => println!("  Expires:       never"),
                }
            }
        },

        Commands::Refresh => {
            let mut manager = AuthManager::new(
                requested_scopes(Vec::new()),
                storage.clone(),
            );
            manager.get_authenticated_client().await?;
            manager.refresh_token().await?;
            println!("Token refreshed.");
        }

        Commands::Accounts => {
            let accounts = storage.store().get_all_valid().await?;
            if accounts.is_empty() {
                println!("No accounts in the token cache.");
            } else {
                for (key, record) in accounts {
                    match record.expires_at {
                        Some(expires) => println!("{}  (expires {})", key, expires),
                        None => println!("{}", key),
                    }
                }
            }
        }
    }

    Ok(())
}

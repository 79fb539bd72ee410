//! OAuth2 callback listener
//!
//! A short-lived local HTTP listener that receives the authorization code
//! redirect, performs the code exchange, persists the resulting tokens, and
//! resolves the pending login. Lives for exactly one login attempt.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;
use crate::Result;
use crate::error::Error;
use super::client::OAuth2Client;
use super::storage::CredentialStorage;

/// Path the provider redirects to after authorization
pub const CALLBACK_PATH: &str = "/oauth2callback";

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Authorization Successful</title>
</head>
<body style="font-family: system-ui, sans-serif; text-align: center; padding-top: 15vh;">
    <h1>Authorization successful</h1>
    <p>You are signed in. You can close this tab and return to your terminal.</p>
</body>
</html>"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Authorization Failed</title>
</head>
<body style="font-family: system-ui, sans-serif; text-align: center; padding-top: 15vh;">
    <h1>Authorization failed</h1>
    <p>The sign-in did not complete. Check your terminal for details.</p>
</body>
</html>"#;

/// Build the redirect URI bound to a callback port
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{}{}", port, CALLBACK_PATH)
}

/// What a single connection amounted to
enum Served {
    /// Not the callback (wrong path); keep listening
    Ignored,
    /// The one meaningful request; the login settles with this result
    Settled(Result<()>),
}

/// Handle to the running callback listener
pub struct CallbackServer {
    handle: JoinHandle<()>,
}

impl CallbackServer {
    /// Bind the listener and start serving.
    ///
    /// Returns the server handle and the pending-login receiver, resolved
    /// `Ok(())` once a code has been exchanged and persisted, or with the
    /// provider's error. A bind failure fails the login immediately.
    pub async fn start(
        port: u16,
        client: Arc<OAuth2Client>,
        storage: Arc<CredentialStorage>,
    ) -> Result<(Self, oneshot::Receiver<Result<()>>)> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            Error::Provider(format!(
                "Failed to start callback listener on port {}: {}",
                port, e
            ))
        })?;

        tracing::info!("Callback listener on http://127.0.0.1:{}", port);

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(serve(listener, port, client, storage, tx));

        Ok((Self { handle }, rx))
    }

    /// Stop the listener and release the port.
    ///
    /// Runs on every exit path of the login race; safe to call after the
    /// accept task has already finished on its own.
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

async fn serve(
    listener: TcpListener,
    port: u16,
    client: Arc<OAuth2Client>,
    storage: Arc<CredentialStorage>,
    tx: oneshot::Sender<Result<()>>,
) {
    loop {
        let (mut socket, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Callback listener accept failed: {}", e);
                continue;
            }
        };

        match handle_connection(&mut socket, port, &client, &storage).await {
            Served::Ignored => continue,
            Served::Settled(result) => {
                let _ = tx.send(result);
                break;
            }
        }
    }
}

async fn handle_connection(
    socket: &mut TcpStream,
    port: u16,
    client: &OAuth2Client,
    storage: &CredentialStorage,
) -> Served {
    let mut buffer = vec![0u8; 4096];
    let n = match socket.read(&mut buffer).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("Failed to read callback request: {}", e);
            return Served::Ignored;
        }
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    let url = match parse_request_url(&request) {
        Some(url) => url,
        None => {
            respond(socket, "400 Bad Request", ERROR_HTML).await;
            return Served::Ignored;
        }
    };

    if url.path() != CALLBACK_PATH {
        respond(socket, "404 Not Found", "Not found").await;
        return Served::Ignored;
    }

    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(error) = error {
        respond(socket, "400 Bad Request", ERROR_HTML).await;
        return Served::Settled(Err(Error::Provider(format!(
            "Authorization failed: {}",
            error
        ))));
    }

    let code = match code {
        Some(code) => code,
        None => {
            respond(socket, "400 Bad Request", ERROR_HTML).await;
            return Served::Settled(Err(Error::Provider(
                "Callback carried neither code nor error".to_string(),
            )));
        }
    };

    match complete_login(&code, port, client, storage).await {
        Ok(()) => {
            respond(socket, "200 OK", SUCCESS_HTML).await;
            Served::Settled(Ok(()))
        }
        Err(e) => {
            respond(socket, "400 Bad Request", ERROR_HTML).await;
            Served::Settled(Err(e))
        }
    }
}

/// Exchange the code and persist the resulting tokens
async fn complete_login(
    code: &str,
    port: u16,
    client: &OAuth2Client,
    storage: &CredentialStorage,
) -> Result<()> {
    let credentials = client.exchange_code(code, &redirect_uri(port)).await?;
    storage.save_main(&credentials).await?;
    tracing::info!("Authorization code exchanged, credentials persisted");
    Ok(())
}

/// Pull the request target out of the first request line
fn parse_request_url(request: &str) -> Option<Url> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;
    Url::parse(&format!("http://localhost{}", path)).ok()
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

//! Ephemeral port allocation for the callback listener

use tokio::net::TcpListener;
use crate::Result;

/// Ask the OS for a free local port.
///
/// Binds to port 0, reads the assigned port back, and releases the socket.
/// Another process could claim the port before the callback listener binds
/// it; that narrow window is accepted for a single-user local tool.
pub async fn find_available_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_nonzero_port() {
        let port = find_available_port().await.unwrap();
        assert_ne!(port, 0);
    }

    #[tokio::test]
    async fn test_port_is_released() {
        let port = find_available_port().await.unwrap();
        // The allocated port must be bindable afterwards
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }
}

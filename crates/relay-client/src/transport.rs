//! WebSocket transport for the chat client.

use relay_core::{RelayError, RelayResult};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reject anything that is not a `ws://` or `wss://` URL.
pub fn validate_url(url: &str) -> RelayResult<()> {
    let lower = url.to_lowercase();
    if lower.starts_with("ws://") || lower.starts_with("wss://") {
        Ok(())
    } else {
        Err(RelayError::Transport(format!(
            "unsupported URL scheme: {url} (expected ws:// or wss://)"
        )))
    }
}

/// Open a WebSocket to `url`, declaring `origin` if given.
pub async fn connect(url: &str, origin: Option<&str>, timeout: Duration) -> RelayResult<WsStream> {
    validate_url(url)?;
    let mut request = url
        .into_client_request()
        .map_err(|e| RelayError::Transport(format!("invalid URL {url}: {e}")))?;
    if let Some(origin) = origin {
        let value = HeaderValue::from_str(origin)
            .map_err(|e| RelayError::Transport(format!("invalid origin {origin}: {e}")))?;
        request.headers_mut().insert("Origin", value);
    }

    let (ws, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| RelayError::Timeout)?
        .map_err(|e| RelayError::Transport(format!("WebSocket connect error: {e}")))?;
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_websocket_schemes() {
        assert!(validate_url("ws://localhost:3001").is_ok());
        assert!(validate_url("WSS://example.com/chat").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(validate_url("http://localhost:3001").is_err());
        assert!(validate_url("localhost:3001").is_err());
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(&format!("ws://{addr}"), None, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(RelayError::Transport(_))));
    }
}

//! Proxies a WebSocket upgrade to a `ws`/`wss` backend.
//!
//! # Data Flow
//! ```text
//! client upgrade ──► connect to backend (forwarded headers + subprotocols)
//!                ◄── 101 with the protocol the backend chose
//! client socket ◄──► relay ◄──► backend socket   (until either side closes)
//! ```

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use axum::http::header;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::GatewayError;
use crate::filter::{FilterChain, GatewayFilter, ServerExchange};

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound headers that belong to the client's own handshake.
fn is_handshake_header(name: &str) -> bool {
    name.starts_with("sec-websocket")
        || name == header::UPGRADE.as_str()
        || name == header::CONNECTION.as_str()
        || name == header::HOST.as_str()
}

pub struct WebsocketRoutingFilter;

#[async_trait]
impl GatewayFilter for WebsocketRoutingFilter {
    fn name(&self) -> &str {
        "WebsocketRouting"
    }

    async fn filter(
        &self,
        exchange: &mut ServerExchange,
        chain: FilterChain<'_>,
    ) -> Result<(), GatewayError> {
        let url = match &exchange.attributes().request_url {
            Some(url) if matches!(url.scheme(), "ws" | "wss") => url.clone(),
            _ => return chain.filter(exchange).await,
        };
        if !exchange.is_upgrade_requested() || !exchange.mark_routed() {
            return chain.filter(exchange).await;
        }
        let Some(upgrade) = exchange.take_upgrade() else {
            return chain.filter(exchange).await;
        };

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::Internal(format!("invalid websocket url {}: {}", url, e)))?;
        for (name, value) in exchange.request().headers() {
            if !is_handshake_header(name.as_str()) {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }
        if let Some(protocols) = exchange.request().headers().get(header::SEC_WEBSOCKET_PROTOCOL) {
            request
                .headers_mut()
                .insert(header::SEC_WEBSOCKET_PROTOCOL, protocols.clone());
        }

        let (backend, handshake) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| GatewayError::Downstream(format!("{}: {}", url, e)))?;
        tracing::debug!(url = %url, "Backend websocket connected");

        let upgrade = match handshake
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|p| p.to_str().ok())
        {
            Some(protocol) => upgrade.protocols([protocol.to_string()]),
            None => upgrade,
        };

        let switching = upgrade.on_upgrade(move |client| relay(client, backend));
        let out = exchange.response_mut();
        out.set_status(switching.status());
        for (name, value) in switching.headers() {
            out.headers_mut().insert(name.clone(), value.clone());
        }
        out.set_complete();
        Ok(())
    }
}

async fn relay(client: WebSocket, backend: BackendSocket) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, ClientMessage::Close(_));
            if backend_tx.send(to_backend(message)).await.is_err() || closing {
                break;
            }
        }
        let _ = backend_tx.close().await;
    };

    let downstream = async {
        while let Some(Ok(message)) = backend_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, ClientMessage::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = upstream => tracing::debug!("Client websocket closed"),
        _ = downstream => tracing::debug!("Backend websocket closed"),
    }
}

fn to_backend(message: ClientMessage) -> BackendMessage {
    match message {
        ClientMessage::Text(text) => BackendMessage::Text(text.as_str().to_string().into()),
        ClientMessage::Binary(data) => BackendMessage::Binary(data),
        ClientMessage::Ping(data) => BackendMessage::Ping(data),
        ClientMessage::Pong(data) => BackendMessage::Pong(data),
        ClientMessage::Close(frame) => BackendMessage::Close(frame.map(|f| BackendCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_string().into(),
        })),
    }
}

fn to_client(message: BackendMessage) -> Option<ClientMessage> {
    Some(match message {
        BackendMessage::Text(text) => ClientMessage::Text(text.as_str().to_string().into()),
        BackendMessage::Binary(data) => ClientMessage::Binary(data),
        BackendMessage::Ping(data) => ClientMessage::Ping(data),
        BackendMessage::Pong(data) => ClientMessage::Pong(data),
        BackendMessage::Close(frame) => ClientMessage::Close(frame.map(|f| ClientCloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_string().into(),
        })),
        BackendMessage::Frame(_) => return None,
    })
}

//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::{Gateway, GatewayConfig, HttpServer};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Request head as a mock backend saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

async fn read_head(socket: &mut TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Some(SeenRequest {
        method,
        target,
        headers,
    })
}

async fn write_response(socket: &mut TcpStream, status: u16, extra_headers: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        status,
        body.len(),
        extra_headers,
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Backend answering every request with a JSON echo of its head.
pub async fn start_echo_backend() -> SocketAddr {
    start_programmable_backend(|seen| async move {
        let headers: serde_json::Map<String, serde_json::Value> = seen
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        let body = json!({
            "method": seen.method,
            "target": seen.target,
            "headers": headers,
        });
        (200, "X-Backend: echo\r\n".to_string(), body.to_string())
    })
    .await
}

/// Backend whose response is computed per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                if let Some(seen) = read_head(&mut socket).await {
                    let (status, headers, body) = f(seen).await;
                    write_response(&mut socket, status, &headers, &body).await;
                }
            });
        }
    });
    addr
}

/// Backend that sleeps before answering.
pub async fn start_slow_backend(delay: Duration) -> SocketAddr {
    start_programmable_backend(move |_| async move {
        tokio::time::sleep(delay).await;
        (200, String::new(), "{}".to_string())
    })
    .await
}

/// WebSocket backend echoing text frames with an `echo:` prefix.
pub async fn start_websocket_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    use tokio_tungstenite::tungstenite::Message;
                    match message {
                        Message::Text(text) => {
                            let reply = format!("echo:{}", text.as_str());
                            if ws.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });
    addr
}

/// Gateway listening on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Gateway,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = Gateway::builder(config).build().await.unwrap();
    serve(gateway).await
}

pub async fn serve(gateway: Gateway) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(&gateway);
    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending()).await;
    });
    TestGateway { addr, gateway }
}

/// Parse a TOML config, with `{backend}`-style placeholders already filled in.
pub fn config(toml: &str) -> GatewayConfig {
    api_gateway::config::parse_config(toml).unwrap()
}

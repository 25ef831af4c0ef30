//! WebSocket upgrades relayed to a `ws://` backend.

mod common;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use common::{config, start_gateway, start_websocket_echo_backend};

#[tokio::test]
async fn test_frames_are_relayed_both_ways() {
    let backend = start_websocket_echo_backend().await;
    let gw = start_gateway(config(
        &r#"
        [[routes]]
        id = "chat"
        uri = "ws://BACKEND"
        predicates = ["Path=/chat/**"]
        "#
        .replace("BACKEND", &backend.to_string()),
    ))
    .await;

    let (mut socket, response) = tokio_tungstenite::connect_async(format!("ws://{}/chat/room", gw.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 101);

    socket.send(Message::Text("hello".into())).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "echo:hello");

    socket.close(None).await.unwrap();
}

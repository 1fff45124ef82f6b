//! The client against an in-process WebSocket server.

use futures::{SinkExt, StreamExt};
use pokepro_core::config::OneBotConfig;
use pokepro_core::PlatformClient;
use pokepro_onebot::OneBotClient;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn events_flow_in_and_actions_are_answered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (auth_tx, auth_rx) = oneshot::channel::<Option<String>>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = auth_tx.send(auth);
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();

        let heartbeat = json!({"post_type": "meta_event", "meta_event_type": "heartbeat", "self_id": 1000, "time": 1});
        ws.send(Message::Text(heartbeat.to_string())).await.unwrap();
        let poke = json!({
            "post_type": "notice", "notice_type": "notify", "sub_type": "poke",
            "self_id": 1000, "user_id": 7, "target_id": 1000, "group_id": 55, "time": 1
        });
        ws.send(Message::Text(poke.to_string())).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let req: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(req["action"], "group_poke");
            let resp = json!({"status": "ok", "retcode": 0, "data": null, "echo": req["echo"]});
            ws.send(Message::Text(resp.to_string())).await.unwrap();
        }
    });

    let config = OneBotConfig {
        ws_url: format!("ws://{}", addr),
        access_token: Some("secret".into()),
        action_timeout_secs: 5,
    };
    let (client, mut events) = OneBotClient::connect(&config).unwrap();

    assert_eq!(auth_rx.await.unwrap().as_deref(), Some("Bearer secret"));

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event["sub_type"], "poke");
    assert_eq!(event["post_type"], "notice");

    client.group_poke(55, 7).await.unwrap();
    assert_eq!(client.pending_count().await, 0);
}

#[tokio::test]
async fn actions_that_timed_out_offline_are_not_replayed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = OneBotConfig {
        ws_url: format!("ws://{}", addr),
        access_token: None,
        action_timeout_secs: 1,
    };
    let (client, _events) = OneBotClient::connect(&config).unwrap();

    // Nobody is listening yet, so this waits in the queue until its caller gives up.
    assert!(client.friend_poke(7).await.is_err());

    let listener = TcpListener::bind(addr).await.unwrap();
    let (connected_tx, connected_rx) = oneshot::channel::<()>();
    let (first_tx, first_rx) = oneshot::channel::<Value>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = connected_tx.send(());

        let mut first_tx = Some(first_tx);
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let req: Value = serde_json::from_str(&text).unwrap();
            let resp = json!({"status": "ok", "retcode": 0, "data": null, "echo": req["echo"]});
            if let Some(tx) = first_tx.take() {
                let _ = tx.send(req);
            }
            ws.send(Message::Text(resp.to_string())).await.unwrap();
        }
    });

    tokio::time::timeout(Duration::from_secs(10), connected_rx)
        .await
        .unwrap()
        .unwrap();
    client.group_poke(55, 7).await.unwrap();

    let first = first_rx.await.unwrap();
    assert_eq!(first["action"], "group_poke");
    assert_eq!(first["params"]["group_id"], 55);
}

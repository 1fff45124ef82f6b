use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pokepro_core::config::OneBotConfig;
use pokepro_core::{GroupId, MemberInfo, PlatformClient, Reply, Scope, UserId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;
use uuid::Uuid;

use crate::error::ActionError;
use crate::event::{self, ActionRequest, ActionResponse, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An encoded action waiting for the socket, with the moment its caller
/// stops waiting for the response.
#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub payload: String,
    pub deadline: Instant,
}

impl QueuedAction {
    /// The caller already gave up; sending now would act behind its back.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Echo → waiting caller.
type Pending = Arc<RwLock<HashMap<String, oneshot::Sender<ActionResponse>>>>;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Delay before reconnect attempt `attempt` (0-based): 1s, 2s, 4s ... capped.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(MAX_RECONNECT_DELAY)
}

enum ConnectionEnd {
    Lost,
    Shutdown,
}

/// Forward WebSocket client for a OneBot v11 implementation.
///
/// Actions are written to the socket task through a channel and matched to
/// their responses by `echo`. Events other than heartbeats and action
/// responses are forwarded raw on the receiver returned by [`connect`].
///
/// [`connect`]: OneBotClient::connect
pub struct OneBotClient {
    outgoing: mpsc::Sender<QueuedAction>,
    pending: Pending,
    timeout: Duration,
}

impl OneBotClient {
    pub fn connect(config: &OneBotConfig) -> Result<(Arc<Self>, mpsc::Receiver<Value>)> {
        let url = Url::parse(&config.ws_url).context("Invalid OneBot WS URL")?;
        let (out_tx, out_rx) = mpsc::channel::<QueuedAction>(64);
        let (event_tx, event_rx) = mpsc::channel::<Value>(256);

        let client = Arc::new(Self::with_channel(
            out_tx,
            Duration::from_secs(config.action_timeout_secs.max(1)),
        ));
        tokio::spawn(run_socket(
            url,
            config.access_token.clone(),
            out_rx,
            event_tx,
            client.pending.clone(),
        ));
        Ok((client, event_rx))
    }

    /// Client over an arbitrary outgoing channel. Responses have to be fed
    /// back with [`resolve`](Self::resolve).
    pub fn with_channel(outgoing: mpsc::Sender<QueuedAction>, timeout: Duration) -> Self {
        Self {
            outgoing,
            pending: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Hand a response to the caller waiting on its echo.
    pub async fn resolve(&self, response: ActionResponse) -> bool {
        resolve_pending(&self.pending, response).await
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Send an action and wait for its response `data`.
    pub async fn call_action(&self, action: &str, params: Value) -> Result<Value, ActionError> {
        let echo = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&ActionRequest {
            action: action.to_string(),
            params,
            echo: echo.clone(),
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(echo.clone(), tx);
        tracing::debug!("OneBot: -> {} ({})", action, echo);

        let queued = QueuedAction {
            payload,
            deadline: Instant::now() + self.timeout,
        };
        let exchange = async {
            self.outgoing
                .send(queued)
                .await
                .map_err(|_| ActionError::Disconnected)?;
            rx.await.map_err(|_| ActionError::Disconnected)
        };

        let result = tokio::time::timeout(self.timeout, exchange).await;
        if !matches!(result, Ok(Ok(_))) {
            self.pending.write().await.remove(&echo);
        }

        match result {
            Ok(Ok(resp)) if resp.is_ok() => Ok(resp.data),
            Ok(Ok(resp)) => Err(ActionError::Failed {
                action: action.to_string(),
                retcode: resp.retcode,
                message: resp.error_message(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ActionError::Timeout {
                action: action.to_string(),
            }),
        }
    }
}

async fn resolve_pending(pending: &Pending, response: ActionResponse) -> bool {
    let Some(echo) = response.echo_key() else {
        return false;
    };
    match pending.write().await.remove(&echo) {
        Some(tx) => tx.send(response).is_ok(),
        None => {
            tracing::debug!("OneBot: response for unknown echo {}", echo);
            false
        }
    }
}

async fn run_socket(
    url: Url,
    access_token: Option<String>,
    mut outgoing: mpsc::Receiver<QueuedAction>,
    events: mpsc::Sender<Value>,
    pending: Pending,
) {
    let mut attempt = 0u32;
    loop {
        tracing::info!("Connecting to OneBot at {}...", url);
        match open(&url, access_token.as_deref()).await {
            Ok(stream) => {
                tracing::info!("Connected to OneBot");
                attempt = 0;
                let end = handle_connection(stream, &mut outgoing, &events, &pending).await;
                // Callers still waiting will never see their response.
                pending.write().await.clear();
                match end {
                    Ok(ConnectionEnd::Shutdown) => {
                        tracing::info!("OneBot socket task stopped");
                        return;
                    }
                    Ok(ConnectionEnd::Lost) => tracing::warn!("OneBot connection closed"),
                    Err(e) => tracing::error!("OneBot connection error: {:#}", e),
                }
            }
            Err(e) => {
                tracing::error!("Failed to connect to OneBot: {:#}", e);
            }
        }

        if events.is_closed() {
            return;
        }
        let wait = reconnect_delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::info!("Reconnecting to OneBot in {}s", wait.as_secs());
        tokio::time::sleep(wait).await;
    }
}

async fn open(url: &Url, access_token: Option<&str>) -> Result<WsStream> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }
    let (stream, _) = connect_async(request).await?;
    Ok(stream)
}

async fn handle_connection(
    stream: WsStream,
    outgoing: &mut mpsc::Receiver<QueuedAction>,
    events: &mpsc::Sender<Value>,
    pending: &Pending,
) -> Result<ConnectionEnd> {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
                    Ok(Frame::Response(resp)) => {
                        resolve_pending(pending, resp).await;
                    }
                    Ok(Frame::Heartbeat) => {}
                    Ok(Frame::Event(value)) => {
                        if events.send(value).await.is_err() {
                            let _ = write.close().await;
                            return Ok(ConnectionEnd::Shutdown);
                        }
                    }
                    Err(e) => tracing::debug!("OneBot: ignored unparseable frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Lost),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            queued = outgoing.recv() => match queued {
                Some(queued) if queued.is_expired() => {
                    tracing::debug!("OneBot: dropped action whose caller already timed out");
                }
                Some(queued) => write.send(Message::Text(queued.payload)).await?,
                None => {
                    let _ = write.close().await;
                    return Ok(ConnectionEnd::Shutdown);
                }
            },
        }
    }
}

#[async_trait]
impl PlatformClient for OneBotClient {
    async fn group_poke(&self, group: GroupId, user: UserId) -> Result<()> {
        self.call_action("group_poke", json!({ "group_id": group, "user_id": user }))
            .await?;
        Ok(())
    }

    async fn friend_poke(&self, user: UserId) -> Result<()> {
        self.call_action("friend_poke", json!({ "user_id": user })).await?;
        Ok(())
    }

    async fn set_group_ban(&self, group: GroupId, user: UserId, duration: Duration) -> Result<()> {
        self.call_action(
            "set_group_ban",
            json!({ "group_id": group, "user_id": user, "duration": duration.as_secs() }),
        )
        .await?;
        Ok(())
    }

    async fn get_group_member_list(&self, group: GroupId) -> Result<Vec<UserId>> {
        let data = self
            .call_action("get_group_member_list", json!({ "group_id": group }))
            .await?;
        Ok(event::member_ids(&data))
    }

    async fn get_group_msg_history(&self, group: GroupId) -> Result<Vec<UserId>> {
        let data = self
            .call_action("get_group_msg_history", json!({ "group_id": group }))
            .await?;
        Ok(event::history_senders(&data))
    }

    async fn get_group_member_info(&self, group: GroupId, user: UserId) -> Result<MemberInfo> {
        let data = self
            .call_action(
                "get_group_member_info",
                json!({ "group_id": group, "user_id": user, "no_cache": false }),
            )
            .await?;
        Ok(event::member_info(&data))
    }

    async fn get_stranger_info(&self, user: UserId) -> Result<MemberInfo> {
        let data = self
            .call_action("get_stranger_info", json!({ "user_id": user }))
            .await?;
        Ok(event::member_info(&data))
    }

    async fn send_reply(&self, scope: Scope, user: UserId, reply: &Reply) -> Result<()> {
        let message = serde_json::to_value(event::render_reply(reply))?;
        match scope {
            Scope::Group(group) => {
                self.call_action("send_group_msg", json!({ "group_id": group, "message": message }))
                    .await?
            }
            Scope::Direct => {
                self.call_action("send_private_msg", json!({ "user_id": user, "message": message }))
                    .await?
            }
        };
        Ok(())
    }
}

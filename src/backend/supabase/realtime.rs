//! Postgres change notifications over the platform's Phoenix channel socket.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    backend::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, Subscription},
    error::BackendError,
};

#[derive(Debug, Clone)]
pub struct RealtimeClient {
    endpoint: Url,
    api_key: String,
    heartbeat: Duration,
    reconnect_delay: Duration,
}

impl RealtimeClient {
    pub fn new(
        project_url: &Url,
        api_key: &str,
        heartbeat: Duration,
        reconnect_delay: Duration,
    ) -> Result<Self, BackendError> {
        let mut endpoint = project_url.clone();
        let scheme = if project_url.scheme() == "http" { "ws" } else { "wss" };
        endpoint
            .set_scheme(scheme)
            .map_err(|_| BackendError::Realtime(format!("cannot derive socket url from {project_url}")))?;
        endpoint.set_path("/realtime/v1/websocket");
        endpoint
            .query_pairs_mut()
            .clear()
            .append_pair("apikey", api_key)
            .append_pair("vsn", "1.0.0");
        Ok(Self {
            endpoint,
            api_key: api_key.to_string(),
            heartbeat,
            reconnect_delay,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> Result<Subscription<ChangeEvent>, BackendError> {
        let (tx, rx) = mpsc::channel(32);
        let client = self.clone();
        let channel = filter.channel.clone();
        let task = tokio::spawn(async move { client.run(filter, tx).await });
        Ok(Subscription::new(rx, move || {
            tracing::debug!(channel = %channel, "realtime channel released");
            task.abort();
        }))
    }
}

impl RealtimeClient {
    /// Keeps the channel joined until the subscriber goes away, reconnecting
    /// after a fixed delay whenever the socket drops. Every join after the
    /// first one is reported as a [`ChangeKind::Resync`] event.
    async fn run(self, filter: ChangeFilter, tx: mpsc::Sender<ChangeEvent>) {
        let mut reconnecting = false;
        loop {
            match self.session(&filter, &tx, reconnecting).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(channel = %filter.channel, error = %err, "realtime connection lost");
                }
            }
            if tx.is_closed() {
                return;
            }
            reconnecting = true;
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(
        &self,
        filter: &ChangeFilter,
        tx: &mpsc::Sender<ChangeEvent>,
        reconnecting: bool,
    ) -> Result<(), BackendError> {
        let (socket, _) = connect_async(self.endpoint.as_str()).await.map_err(socket_error)?;
        let (mut sink, mut stream) = socket.split();
        let topic = format!("realtime:{}", filter.channel);
        let join_ref: u64 = 1;
        let mut next_ref = join_ref;

        sink.send(Message::text(join_message(&topic, filter, &self.api_key, join_ref).to_string()))
            .await
            .map_err(socket_error)?;
        tracing::info!(topic = %topic, table = %filter.table, "realtime channel joining");

        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    let frame = json!({
                        "topic": "phoenix",
                        "event": "heartbeat",
                        "payload": {},
                        "ref": next_ref.to_string(),
                    });
                    sink.send(Message::text(frame.to_string())).await.map_err(socket_error)?;
                }
                frame = stream.next() => match frame {
                    None => return Err(BackendError::Realtime("socket closed".into())),
                    Some(Err(err)) => return Err(socket_error(err)),
                    Some(Ok(Message::Close(_))) => {
                        return Err(BackendError::Realtime("server closed the socket".into()));
                    }
                    Some(Ok(Message::Text(text))) => {
                        let event = match parse_frame(text.as_str(), &topic, join_ref, filter)? {
                            Incoming::Change(event) => Some(event),
                            Incoming::Joined => {
                                tracing::info!(topic = %topic, reconnecting, "realtime channel joined");
                                resync_event(filter, reconnecting)
                            }
                            Incoming::Ignored => None,
                        };
                        if let Some(event) = event {
                            if tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

/// A rejoin may have missed changes, so it is reported like one.
fn resync_event(filter: &ChangeFilter, reconnecting: bool) -> Option<ChangeEvent> {
    reconnecting.then(|| ChangeEvent {
        table: filter.table.clone(),
        kind: ChangeKind::Resync,
    })
}

fn socket_error(err: tokio_tungstenite::tungstenite::Error) -> BackendError {
    BackendError::Realtime(err.to_string())
}

fn join_message(topic: &str, filter: &ChangeFilter, api_key: &str, join_ref: u64) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": filter.schema,
                    "table": filter.table,
                }],
            },
            "access_token": api_key,
        },
        "ref": join_ref.to_string(),
        "join_ref": join_ref.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Change(ChangeEvent),
    /// The server accepted our join.
    Joined,
    Ignored,
}

/// Classifies one socket frame. Join rejections end the session.
fn parse_frame(
    text: &str,
    topic: &str,
    join_ref: u64,
    filter: &ChangeFilter,
) -> Result<Incoming, BackendError> {
    let frame: Frame = serde_json::from_str(text)?;
    if frame.topic != topic {
        return Ok(Incoming::Ignored);
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let kind = data["type"].as_str().and_then(ChangeKind::parse);
            let table = data["table"].as_str().unwrap_or(&filter.table);
            Ok(kind.map_or(Incoming::Ignored, |kind| {
                Incoming::Change(ChangeEvent {
                    table: table.to_string(),
                    kind,
                })
            }))
        }
        "phx_reply" if frame.payload["status"] == "error" => Err(BackendError::Realtime(format!(
            "join rejected: {}",
            frame.payload["response"]
        ))),
        "phx_reply"
            if frame.payload["status"] == "ok"
                && frame.reference.as_deref() == Some(join_ref.to_string().as_str()) =>
        {
            Ok(Incoming::Joined)
        }
        "system" if frame.payload["status"] == "error" => {
            tracing::warn!(payload = %frame.payload, "realtime system error");
            Ok(Incoming::Ignored)
        }
        "phx_close" => Err(BackendError::Realtime("channel closed".into())),
        _ => Ok(Incoming::Ignored),
    }
}

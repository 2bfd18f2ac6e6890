use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use circle_types::events::{ChangeEvent, ChangeKind};
use circle_types::{Filter, Row, Table};

use crate::{BackendError, Result, Subscription};

/// Phoenix channels drop sockets that stay silent for ~60s.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Envelope of the Phoenix channel protocol used by the realtime service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: ChangeKind,
    table: String,
    #[serde(default)]
    record: Option<Row>,
    #[serde(default)]
    old_record: Option<Row>,
}

pub fn topic(table: Table) -> String {
    format!("realtime:{}", table)
}

/// Build the `phx_join` that asks for `postgres_changes` on one table.
pub fn join_message(table: Table, filter: Option<&Filter>, access_token: Option<&str>) -> PhoenixMessage {
    let mut change = json!({
        "event": "*",
        "schema": "public",
        "table": table.as_str(),
    });
    if let Some(filter) = filter {
        change["filter"] = Value::String(format!("{}={}", filter.column, filter.rest_value()));
    }

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    PhoenixMessage {
        topic: topic(table),
        event: "phx_join".into(),
        payload,
        reference: Some("1".into()),
    }
}

fn heartbeat(seq: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".into(),
        event: "heartbeat".into(),
        payload: json!({}),
        reference: Some(seq.to_string()),
    }
}

/// Turn a raw websocket frame into a change event, if it carries one.
pub fn decode_change(text: &str) -> Option<ChangeEvent> {
    let msg: PhoenixMessage = serde_json::from_str(text).ok()?;
    if msg.event != "postgres_changes" {
        return None;
    }
    let payload: ChangePayload = match serde_json::from_value(msg.payload) {
        Ok(p) => p,
        Err(e) => {
            warn!("Unreadable postgres_changes payload on {}: {}", msg.topic, e);
            return None;
        }
    };
    let table = Table::parse(&payload.data.table)?;

    Some(ChangeEvent {
        table,
        kind: payload.data.kind,
        record: payload.data.record.unwrap_or_default(),
        old_record: payload.data.old_record.unwrap_or_default(),
    })
}

/// Connect, join the channel, and spawn the task that feeds the subscription.
pub async fn open(url: Url, join: PhoenixMessage, table: Table) -> Result<Subscription> {
    let (socket, _) = connect_async(url.as_str())
        .await
        .map_err(|e| BackendError::Realtime(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(serde_json::to_string(&join)?.into()))
        .await
        .map_err(|e| BackendError::Realtime(e.to_string()))?;
    info!("Joined realtime channel {}", join.topic);

    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        let mut seq: u64 = 1;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            warn!("Realtime socket error on {}: {}", table, e);
                            break;
                        }
                        None => break,
                    };
                    match frame {
                        Message::Text(text) => {
                            if let Some(event) = decode_change(text.as_str()) {
                                if event.table != table {
                                    continue;
                                }
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                _ = ticker.tick() => {
                    seq += 1;
                    let text = match serde_json::to_string(&heartbeat(seq)) {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
        }

        debug!("Realtime channel {} closed", table);
    });

    Ok(Subscription::new(rx, task))
}

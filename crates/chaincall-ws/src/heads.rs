//! `eth_subscribe("newHeads")` as a stream of block numbers.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

/// Reconnect settings for [`NewHeads`].
#[derive(Debug, Clone)]
pub struct NewHeadsConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for NewHeadsConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Block numbers pushed by a node over WebSocket.
///
/// Best effort: a background task keeps the connection (reconnecting with
/// backoff) and forwards each head's number. Nothing is buffered across
/// reconnects. Dropping the stream closes the connection.
pub struct NewHeads {
    rx: mpsc::UnboundedReceiver<u64>,
    task: JoinHandle<()>,
}

impl NewHeads {
    /// Start listening on `url`. Must be called inside a tokio runtime.
    pub fn connect(url: impl Into<String>, config: NewHeadsConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(heads_task(url.into(), tx, config));
        Self { rx, task }
    }
}

impl Stream for NewHeads {
    type Item = u64;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u64>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for NewHeads {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn heads_task(url: String, tx: mpsc::UnboundedSender<u64>, config: NewHeadsConfig) {
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::info!(url = %url, "subscribing to newHeads");

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Err(e) => {
                tracing::warn!(error = %e, "WS connect failed, retrying in {backoff:?}");
            }
            Ok((ws_stream, _)) => {
                backoff = config.reconnect_initial;
                let (mut sink, mut stream) = ws_stream.split();

                let subscribe = json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "eth_subscribe",
                    "params": ["newHeads"],
                });
                let subscribed = sink
                    .send(Message::Text(subscribe.to_string().into()))
                    .await
                    .is_ok();

                if subscribed {
                    loop {
                        tokio::select! {
                            _ = tx.closed() => return,
                            msg = stream.next() => match msg {
                                None => break,
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "WS receive error");
                                    break;
                                }
                                Some(Ok(Message::Text(text))) => {
                                    if let Some(block) = parse_head(text.as_str()) {
                                        tracing::trace!(block, "new head");
                                        if tx.send(block).is_err() {
                                            return;
                                        }
                                    }
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    let _ = sink.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(Message::Close(_))) => break,
                                _ => {}
                            }
                        }
                    }
                }

                tracing::warn!(url = %url, "WS disconnected, reconnecting in {backoff:?}");
            }
        }

        if tx.is_closed() {
            return;
        }
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

/// Block number of an `eth_subscription` newHeads notification.
pub fn parse_head(text: &str) -> Option<u64> {
    let val: Value = serde_json::from_str(text).ok()?;
    if val.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return None;
    }
    let number = val.get("params")?.get("result")?.get("number")?.as_str()?;
    u64::from_str_radix(number.strip_prefix("0x").unwrap_or(number), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notification() {
        let msg = r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{"number":"0x1b4","hash":"0x00"}}}"#;
        assert_eq!(parse_head(msg), Some(436));
    }

    #[test]
    fn ignores_subscribe_response() {
        assert_eq!(parse_head(r#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#), None);
    }

    #[test]
    fn ignores_garbage() {
        assert_eq!(parse_head("not json"), None);
        assert_eq!(
            parse_head(r#"{"method":"eth_subscription","params":{"result":{"number":"0xzz"}}}"#),
            None
        );
    }
}

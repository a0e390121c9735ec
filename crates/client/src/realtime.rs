//! WebSocket push subscription

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use redeemdesk_shared::{ClientEvent, ServerEvent};
use std::time::Duration;
use tokio_retry::Retry;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::{
    backend::{PushSource, PushStream},
    error::{ClientError, ClientResult},
};

/// Delays for `attempts` retries growing linearly: `base`, `2 * base`, ...
pub fn linear_backoff(base: Duration, attempts: usize) -> impl Iterator<Item = Duration> {
    (1..=attempts).map(move |n| base.saturating_mul(n as u32))
}

/// Subscribe with linear backoff; `None` once every retry has failed
pub async fn subscribe_with_retry(
    push: &dyn PushSource,
    conversation_id: Uuid,
    base_delay: Duration,
    attempts: usize,
) -> Option<PushStream> {
    let strategy = linear_backoff(base_delay, attempts);

    let result = Retry::spawn(strategy, || async {
        push.subscribe(conversation_id).await.map_err(|e| {
            tracing::debug!(
                conversation_id = %conversation_id,
                error = %e,
                "Push subscription failed"
            );
            e
        })
    })
    .await;

    match result {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::info!(
                conversation_id = %conversation_id,
                error = %e,
                "Giving up on push subscription, polling only"
            );
            None
        }
    }
}

/// [`PushSource`] over the service's `/ws/chat` endpoint
#[derive(Debug, Clone)]
pub struct WsPushSource {
    ws_url: String,
    customer_id: String,
    handshake_timeout: Duration,
}

impl WsPushSource {
    pub fn new(ws_url: impl Into<String>, customer_id: impl Into<String>, handshake_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            customer_id: customer_id.into(),
            handshake_timeout,
        }
    }

    fn connect_url(&self) -> ClientResult<String> {
        let url = reqwest::Url::parse_with_params(&self.ws_url, &[("customer_id", &self.customer_id)])
            .map_err(|e| ClientError::Validation(format!("invalid WebSocket URL: {}", e)))?;
        Ok(url.into())
    }

    async fn open(&self, conversation_id: Uuid) -> ClientResult<PushStream> {
        let (mut socket, _) = connect_async(self.connect_url()?).await?;

        let subscribe = serde_json::to_string(&ClientEvent::Subscribe { conversation_id })?;
        socket.send(Message::Text(subscribe.into())).await?;

        // Wait for the server to confirm before handing the stream out
        while let Some(frame) = socket.next().await {
            match decode_frame(frame?) {
                Some(Ok(ServerEvent::Subscribed { conversation_id: confirmed }))
                    if confirmed == conversation_id =>
                {
                    tracing::debug!(conversation_id = %conversation_id, "Push subscription confirmed");
                    break;
                }
                Some(Ok(ServerEvent::Error { message })) => {
                    return Err(ClientError::Subscription(message));
                }
                Some(Err(e)) => return Err(e),
                _ => {}
            }
        }

        let stream = socket.filter_map(|frame| async move {
            match frame {
                Ok(frame) => decode_frame(frame),
                Err(e) => Some(Err(e.into())),
            }
        });

        Ok(stream.boxed())
    }
}

/// Decode a text frame into an event; control frames yield nothing
fn decode_frame(frame: Message) -> Option<ClientResult<ServerEvent>> {
    match frame {
        Message::Text(text) => Some(serde_json::from_str(text.as_str()).map_err(ClientError::from)),
        Message::Close(_) => Some(Err(ClientError::Subscription("connection closed".into()))),
        _ => None,
    }
}

#[async_trait]
impl PushSource for WsPushSource {
    async fn subscribe(&self, conversation_id: Uuid) -> ClientResult<PushStream> {
        tokio::time::timeout(self.handshake_timeout, self.open(conversation_id))
            .await
            .map_err(|_| ClientError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_delays() {
        let delays: Vec<u64> = linear_backoff(Duration::from_secs(2), 3)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 6]);
    }

    #[test]
    fn test_decode_frame() {
        let event = decode_frame(Message::Text(r#"{"type":"pong"}"#.into()));
        assert!(matches!(event, Some(Ok(ServerEvent::Pong))));

        assert!(decode_frame(Message::Ping(Vec::new().into())).is_none());
        assert!(matches!(
            decode_frame(Message::Text("not json".into())),
            Some(Err(ClientError::Json(_)))
        ));
    }

    #[test]
    fn test_connect_url_encodes_customer_id() {
        let source = WsPushSource::new(
            "ws://localhost:3000/api/v1/ws/chat",
            "player&one",
            Duration::from_secs(5),
        );
        assert_eq!(
            source.connect_url().unwrap(),
            "ws://localhost:3000/api/v1/ws/chat?customer_id=player%26one"
        );
    }
}

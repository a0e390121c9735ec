//! Entry point wiring configuration to backends

use std::sync::Arc;

use crate::{
    backend::{DeskBackend, PushSource},
    bot::ScriptedBot,
    config::ClientConfig,
    error::{ClientError, ClientResult},
    http::HttpBackend,
    queue::QueueLookup,
    realtime::WsPushSource,
    sync::ConversationSync,
};

/// Redeemdesk client; offline when no API URL is configured
pub struct DeskClient {
    config: ClientConfig,
    backend: Option<Arc<dyn DeskBackend>>,
    push: Option<Arc<dyn PushSource>>,
}

impl DeskClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let backend: Option<Arc<dyn DeskBackend>> = match &config.api_url {
            Some(url) => Some(Arc::new(HttpBackend::new(url, config.request_timeout)?)),
            None => {
                tracing::warn!("No API URL configured, chat and queue lookup are unavailable");
                None
            }
        };

        Ok(Self {
            config,
            backend,
            push: None,
        })
    }

    /// Build from `REDEEMDESK_API_URL`
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// Use the given backends instead of HTTP and WebSocket
    pub fn with_backends(
        config: ClientConfig,
        backend: Arc<dyn DeskBackend>,
        push: Option<Arc<dyn PushSource>>,
    ) -> Self {
        Self {
            config,
            backend: Some(backend),
            push,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_offline(&self) -> bool {
        self.backend.is_none()
    }

    fn backend(&self) -> ClientResult<Arc<dyn DeskBackend>> {
        self.backend.clone().ok_or(ClientError::Offline)
    }

    /// Open (or resume) the customer's chat
    pub async fn open_chat(
        &self,
        customer_id: &str,
        customer_name: &str,
    ) -> ClientResult<ConversationSync> {
        let backend = self.backend()?;

        let push = match &self.push {
            Some(push) => Some(Arc::clone(push)),
            None => self.config.ws_url().map(|url| {
                Arc::new(WsPushSource::new(url, customer_id.trim(), self.config.request_timeout))
                    as Arc<dyn PushSource>
            }),
        };

        ConversationSync::open(backend, push, &self.config, customer_id, customer_name).await
    }

    /// Scripted bot using the configured delay
    pub fn bot(&self) -> ScriptedBot {
        ScriptedBot::new(self.config.bot_delay)
    }

    pub fn queue(&self) -> ClientResult<QueueLookup> {
        Ok(QueueLookup::new(self.backend()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    #[tokio::test]
    async fn test_offline_client_reports_unavailable() {
        let client = DeskClient::new(ClientConfig::default()).unwrap();
        assert!(client.is_offline());

        let err = client.open_chat("player", "Player").await.err().unwrap();
        assert!(matches!(err, ClientError::Offline));
        assert_eq!(err.user_message(), "ระบบแชทยังไม่พร้อมใช้งานในขณะนี้");
        assert!(client.queue().is_err());
    }

    #[tokio::test]
    async fn test_customer_ids_share_a_conversation() {
        let backend = Arc::new(InMemoryBackend::new());
        let client = DeskClient::with_backends(ClientConfig::default(), backend.clone(), None);

        let first = client.open_chat("Player One", "Player One").await.unwrap();
        let second = client.open_chat(" PLAYERONE ", "").await.unwrap();

        assert_eq!(first.conversation().id, second.conversation().id);
        assert_eq!(backend.conversation_count(), 1);
    }
}

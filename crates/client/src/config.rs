//! Client configuration

use std::env;
use std::time::Duration;

/// Tunables for the chat client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Redeemdesk API; `None` means offline mode
    pub api_url: Option<String>,
    /// Interval of the fallback poll
    pub poll_interval: Duration,
    /// Minimum gap between two customer sends
    pub send_guard: Duration,
    /// Artificial delay before a scripted bot message
    pub bot_delay: Duration,
    /// Subscription retries after the first failure
    pub reconnect_attempts: usize,
    /// Retry n waits `n * reconnect_base_delay`
    pub reconnect_base_delay: Duration,
    /// Per-request timeout (HTTP) and handshake timeout (WebSocket)
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            poll_interval: Duration::from_secs(10),
            send_guard: Duration::from_secs(1),
            bot_delay: Duration::from_secs(1),
            reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at the given API base URL
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: normalize_url(&api_url.into()),
            ..Self::default()
        }
    }

    /// Load from `REDEEMDESK_API_URL` and optional `REDEEMDESK_POLL_INTERVAL_SECS`
    pub fn from_env() -> Self {
        let mut config = Self {
            api_url: env::var("REDEEMDESK_API_URL")
                .ok()
                .and_then(|url| normalize_url(&url)),
            ..Self::default()
        };

        if let Some(secs) = env::var("REDEEMDESK_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.poll_interval = Duration::from_secs(secs);
        }

        config
    }

    pub fn is_offline(&self) -> bool {
        self.api_url.is_none()
    }

    /// WebSocket endpoint derived from the API URL
    pub fn ws_url(&self) -> Option<String> {
        let api_url = self.api_url.as_deref()?;
        let ws_base = if let Some(rest) = api_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = api_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            api_url.to_string()
        };
        Some(format!("{}/api/v1/ws/chat", ws_base))
    }
}

fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

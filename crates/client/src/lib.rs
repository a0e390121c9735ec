//! Redeemdesk client library
//!
//! Customer-side logic for the support chat and the queue lookup:
//! - [`ConversationSync`]: find-or-create a conversation and keep its message
//!   log in sync (push + poll, reconnects with linear backoff)
//! - [`ScriptedBot`]: the account-help script driven by the quick reply
//! - [`QueueLookup`]: substring search over queue items

pub mod backend;
pub mod bot;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod queue;
pub mod realtime;
pub mod sync;

pub use backend::{DeskBackend, OutgoingMessage, PushSource, PushStream};
pub use bot::{BotState, ScriptedBot};
pub use client::DeskClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpBackend;
pub use memory::InMemoryBackend;
pub use queue::{summary_line, LookupOutcome, QueueLookup};
pub use realtime::WsPushSource;
pub use sync::{ConversationSync, MessageLog, SendError, SendGuard, SyncEvent};

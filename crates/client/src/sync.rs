//! Conversation synchronizer
//!
//! One spawned task owns the message log. Push events, the fallback poll, and
//! the results of local sends all flow into that task, so the log has exactly
//! one writer. Polls are reconciled into the log (union by message id) rather
//! than replacing it.
//!
//! Observers read the log through a `watch` channel and receive [`SyncEvent`]s
//! for things worth reacting to (a new message should scroll into view).

use futures::{future::BoxFuture, FutureExt, StreamExt};
use redeemdesk_shared::{
    validate_customer_id, ChatMessage, Conversation, ConversationStatus, MessageBody, SenderRole,
    ServerEvent,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::{
    backend::{DeskBackend, OutgoingMessage, PushSource, PushStream},
    config::ClientConfig,
    error::{ClientError, ClientResult},
    realtime::subscribe_with_retry,
};

const EVENT_CAPACITY: usize = 64;
const BOT_SENDER_ID: &str = "bot";

// =============================================================================
// Message log
// =============================================================================

fn sort_key(message: &ChatMessage) -> (OffsetDateTime, Uuid) {
    (message.created_at, message.id)
}

/// Outcome of reconciling a fetched snapshot into the log
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Messages that were not in the log before
    pub added: Vec<ChatMessage>,
    /// Existing messages whose read flag flipped
    pub read_updates: usize,
}

impl Reconciled {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || self.read_updates > 0
    }
}

/// Ordered, de-duplicated message list of one conversation
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    ids: HashSet<Uuid>,
}

impl MessageLog {
    pub fn new(initial: Vec<ChatMessage>) -> Self {
        let mut log = Self::default();
        log.reconcile(initial);
        log
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    /// Insert a message; `false` if its id is already present
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }

        let out_of_order = self
            .messages
            .last()
            .is_some_and(|last| sort_key(last) > sort_key(&message));
        self.messages.push(message);
        if out_of_order {
            self.messages.sort_by_key(sort_key);
        }
        true
    }

    /// Union a fetched snapshot into the log.
    ///
    /// Nothing already in the log is removed. Read flags only move from unread
    /// to read, so a stale snapshot cannot undo a receipt.
    pub fn reconcile(&mut self, fetched: Vec<ChatMessage>) -> Reconciled {
        let mut outcome = Reconciled::default();

        for message in fetched {
            if self.ids.contains(&message.id) {
                if message.is_read {
                    if let Some(existing) = self
                        .messages
                        .iter_mut()
                        .find(|m| m.id == message.id && !m.is_read)
                    {
                        existing.is_read = true;
                        outcome.read_updates += 1;
                    }
                }
            } else if self.insert(message.clone()) {
                outcome.added.push(message);
            }
        }

        outcome
    }

    /// Flag the given messages as read; returns how many changed
    pub fn mark_read(&mut self, ids: &[Uuid]) -> usize {
        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut changed = 0;
        for message in self.messages.iter_mut() {
            if !message.is_read && ids.contains(&message.id) {
                message.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Unread admin and bot messages
    pub fn unread_from_staff(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_role.is_staff_side() && !m.is_read)
            .count()
    }
}

// =============================================================================
// Send guard
// =============================================================================

/// Rejects a send that follows the previous one too closely
#[derive(Debug)]
pub struct SendGuard {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl SendGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Stamp a send attempt; `false` if it comes within the guard interval
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = *last {
            if now.duration_since(previous) < self.min_interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

// =============================================================================
// Public handle
// =============================================================================

/// Notifications for observers of a conversation
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A message entered the log; scroll it into view
    NewMessage(ChatMessage),
    /// The other side read these messages
    MessagesRead(Vec<Uuid>),
    StatusChanged(ConversationStatus),
}

/// A failed send, carrying the text to restore into the input box
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SendError {
    pub error: ClientError,
    pub restored_text: Option<String>,
}

impl SendError {
    fn new(error: ClientError, restored_text: Option<String>) -> Self {
        Self {
            error,
            restored_text,
        }
    }

    /// Thai toast text for the failure
    pub fn user_message(&self) -> &'static str {
        self.error.user_message()
    }
}

enum Command {
    Apply(ChatMessage),
    MarkRead(Vec<Uuid>),
    Refresh(oneshot::Sender<ClientResult<()>>),
}

/// Handle to a synchronized conversation.
///
/// Dropping the handle stops the owner task, which cancels the poll timer and
/// the push subscription. Responses that arrive afterwards are discarded.
pub struct ConversationSync {
    conversation: Conversation,
    backend: Arc<dyn DeskBackend>,
    commands: mpsc::UnboundedSender<Command>,
    log_rx: watch::Receiver<Vec<ChatMessage>>,
    events_tx: broadcast::Sender<SyncEvent>,
    guard: SendGuard,
    task: JoinHandle<()>,
}

impl ConversationSync {
    /// Find or create the customer's conversation and start synchronizing it
    pub async fn open(
        backend: Arc<dyn DeskBackend>,
        push: Option<Arc<dyn PushSource>>,
        config: &ClientConfig,
        customer_id: &str,
        customer_name: &str,
    ) -> ClientResult<Self> {
        let normalized = validate_customer_id(customer_id)?;
        let display_name = match customer_name.trim() {
            "" => customer_id.trim(),
            name => name,
        };

        let conversation = backend.open_conversation(&normalized, display_name).await?;
        let initial = backend.list_messages(conversation.id, &normalized).await?;
        let log = MessageLog::new(initial);

        let (log_tx, log_rx) = watch::channel(log.messages().to_vec());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let worker = SyncWorker {
            conversation_id: conversation.id,
            customer_id: conversation.customer_id.clone(),
            backend: Arc::clone(&backend),
            log,
            log_tx,
            events_tx: events_tx.clone(),
        };
        let task = tokio::spawn(worker.run(commands_rx, push, config.clone()));

        tracing::info!(
            conversation_id = %conversation.id,
            customer_id = %conversation.customer_id,
            "Conversation synchronizer started"
        );

        Ok(Self {
            conversation,
            backend,
            commands: commands_tx,
            log_rx,
            events_tx,
            guard: SendGuard::new(config.send_guard),
            task,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Current snapshot of the message log
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log_rx.borrow().clone()
    }

    /// Receiver that changes whenever the log does
    pub fn watch(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.log_rx.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    fn outgoing(&self, sender_role: SenderRole, sender_id: Option<&str>, body: MessageBody) -> OutgoingMessage {
        OutgoingMessage {
            customer_id: self.conversation.customer_id.clone(),
            sender_role,
            sender_id: sender_id.map(String::from),
            body,
        }
    }

    /// Send through the backend, then hand the stored message to the owner task
    async fn deliver(&self, outgoing: OutgoingMessage) -> ClientResult<ChatMessage> {
        let message = self
            .backend
            .send_message(self.conversation.id, &outgoing)
            .await?;

        self.commands
            .send(Command::Apply(message.clone()))
            .map_err(|_| ClientError::Closed)?;

        Ok(message)
    }

    /// Send a customer text message.
    ///
    /// On failure the original text comes back in [`SendError::restored_text`].
    pub async fn send_text(&self, text: &str) -> Result<ChatMessage, SendError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SendError::new(
                ClientError::Validation("message is empty".into()),
                Some(text.to_string()),
            ));
        }
        if !self.guard.try_acquire() {
            return Err(SendError::new(ClientError::TooFast, Some(text.to_string())));
        }

        let outgoing = self.outgoing(SenderRole::Customer, None, MessageBody::Text(trimmed.to_string()));
        self.deliver(outgoing).await.map_err(|e| {
            tracing::warn!(
                conversation_id = %self.conversation.id,
                error = %e,
                "Failed to send chat message"
            );
            SendError::new(e, Some(text.to_string()))
        })
    }

    /// Upload an image and send it as a customer message
    pub async fn send_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ChatMessage, SendError> {
        if !self.guard.try_acquire() {
            return Err(SendError::new(ClientError::TooFast, None));
        }

        let result = async {
            let url = self.backend.upload_image(file_name, content_type, bytes).await?;
            let outgoing = self.outgoing(SenderRole::Customer, None, MessageBody::Image(url));
            self.deliver(outgoing).await
        }
        .await;

        result.map_err(|e| {
            tracing::warn!(
                conversation_id = %self.conversation.id,
                error = %e,
                "Failed to send image message"
            );
            SendError::new(e, None)
        })
    }

    /// Send a scripted bot message (not subject to the send guard)
    pub async fn send_bot(&self, text: &str) -> ClientResult<ChatMessage> {
        let outgoing = self.outgoing(
            SenderRole::Bot,
            Some(BOT_SENDER_ID),
            MessageBody::Text(text.to_string()),
        );
        self.deliver(outgoing).await
    }

    /// Mark admin and bot messages read; returns how many were updated
    pub async fn mark_read(&self) -> ClientResult<usize> {
        let ids = self
            .backend
            .mark_read(self.conversation.id, &self.conversation.customer_id)
            .await?;
        let count = ids.len();

        if count > 0 {
            self.commands
                .send(Command::MarkRead(ids))
                .map_err(|_| ClientError::Closed)?;
        }
        Ok(count)
    }

    /// Poll immediately instead of waiting for the next tick
    pub async fn refresh(&self) -> ClientResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Refresh(reply_tx))
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Stop synchronizing
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ConversationSync {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(conversation_id = %self.conversation.id, "Conversation synchronizer stopped");
    }
}

// =============================================================================
// Owner task
// =============================================================================

struct SyncWorker {
    conversation_id: Uuid,
    customer_id: String,
    backend: Arc<dyn DeskBackend>,
    log: MessageLog,
    log_tx: watch::Sender<Vec<ChatMessage>>,
    events_tx: broadcast::Sender<SyncEvent>,
}

type ConnectFuture = BoxFuture<'static, Option<PushStream>>;

fn connect(push: &Arc<dyn PushSource>, conversation_id: Uuid, config: &ClientConfig) -> ConnectFuture {
    let push = Arc::clone(push);
    let base_delay = config.reconnect_base_delay;
    let attempts = config.reconnect_attempts;

    async move { subscribe_with_retry(push.as_ref(), conversation_id, base_delay, attempts).await }
        .boxed()
}

async fn wait_connect(pending: &mut Option<ConnectFuture>) -> Option<PushStream> {
    match pending {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_event(stream: &mut Option<PushStream>) -> Option<ClientResult<ServerEvent>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl SyncWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        push: Option<Arc<dyn PushSource>>,
        config: ClientConfig,
    ) {
        let mut poll = interval_at(Instant::now() + config.poll_interval, config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stream: Option<PushStream> = None;
        let mut connecting = push
            .as_ref()
            .map(|push| connect(push, self.conversation_id, &config));

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Apply(message)) => self.apply_message(message),
                    Some(Command::MarkRead(ids)) => self.apply_read(&ids),
                    Some(Command::Refresh(reply)) => {
                        let result = self.poll().await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                _ = poll.tick() => {
                    if let Err(e) = self.poll().await {
                        tracing::warn!(
                            conversation_id = %self.conversation_id,
                            error = %e,
                            "Message poll failed"
                        );
                    }
                }
                subscribed = wait_connect(&mut connecting) => {
                    connecting = None;
                    stream = subscribed;
                }
                event = next_event(&mut stream) => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(ClientError::Json(e))) => {
                        tracing::warn!(error = %e, "Ignoring undecodable push event");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            conversation_id = %self.conversation_id,
                            error = %e,
                            "Push subscription failed, reconnecting"
                        );
                        stream = None;
                        connecting = push.as_ref().map(|push| connect(push, self.conversation_id, &config));
                    }
                    None => {
                        tracing::info!(
                            conversation_id = %self.conversation_id,
                            "Push subscription closed, reconnecting"
                        );
                        stream = None;
                        connecting = push.as_ref().map(|push| connect(push, self.conversation_id, &config));
                    }
                },
            }
        }
    }

    fn publish(&self) {
        self.log_tx.send_replace(self.log.messages().to_vec());
    }

    fn notify(&self, event: SyncEvent) {
        // No observers is fine
        let _ = self.events_tx.send(event);
    }

    fn apply_message(&mut self, message: ChatMessage) {
        if message.conversation_id != self.conversation_id {
            tracing::debug!(message_id = %message.id, "Ignoring message for another conversation");
            return;
        }

        if self.log.insert(message.clone()) {
            self.publish();
            self.notify(SyncEvent::NewMessage(message));
        }
    }

    fn apply_read(&mut self, ids: &[Uuid]) {
        if self.log.mark_read(ids) > 0 {
            self.publish();
            self.notify(SyncEvent::MessagesRead(ids.to_vec()));
        }
    }

    fn handle_event(&mut self, event: ServerEvent) {
        if event
            .conversation_id()
            .is_some_and(|id| id != self.conversation_id)
        {
            tracing::debug!("Ignoring push event for another conversation");
            return;
        }

        match event {
            ServerEvent::NewMessage { message, .. } => self.apply_message(message),
            ServerEvent::MessagesRead { message_ids, .. } => self.apply_read(&message_ids),
            ServerEvent::ConversationUpdated { status, .. } => {
                tracing::info!(
                    conversation_id = %self.conversation_id,
                    status = status.as_str(),
                    "Conversation status changed"
                );
                self.notify(SyncEvent::StatusChanged(status));
            }
            ServerEvent::Error { message } => {
                tracing::warn!(error = %message, "Push server reported an error");
            }
            ServerEvent::Connected { .. } | ServerEvent::Subscribed { .. } | ServerEvent::Pong => {}
        }
    }

    async fn poll(&mut self) -> ClientResult<()> {
        let fetched = self
            .backend
            .list_messages(self.conversation_id, &self.customer_id)
            .await?;

        let outcome = self.log.reconcile(fetched);
        if outcome.is_changed() {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                added = outcome.added.len(),
                read_updates = outcome.read_updates,
                "Poll reconciled messages"
            );
            self.publish();
        }
        for message in outcome.added {
            self.notify(SyncEvent::NewMessage(message));
        }
        Ok(())
    }
}

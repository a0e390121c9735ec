//! Scripted bot for account help requests
//!
//! `idle → asking_name → asking_password → waiting_admin`, started by the
//! quick-reply button. The customer's answers are sent as ordinary customer
//! messages so the admin sees them; the bot's prompts follow after a short
//! artificial delay.

use redeemdesk_shared::{contains_thai, ChatMessage};
use std::time::Duration;

use crate::sync::{ConversationSync, SendError};

/// Label of the quick-reply button; also sent as the customer's message
pub const QUICK_REPLY_LABEL: &str = "ขอความช่วยเหลือเรื่องบัญชีเกม";

pub const ASK_NAME: &str = "กรุณาพิมพ์ชื่อผู้ใช้ในเกมของคุณ (ภาษาอังกฤษเท่านั้น)";
pub const INVALID_NAME: &str = "ชื่อผู้ใช้ต้องเป็นภาษาอังกฤษเท่านั้น กรุณาพิมพ์ใหม่อีกครั้ง";
pub const ASK_PASSWORD: &str = "กรุณาพิมพ์รหัสผ่านของบัญชีเกม";
pub const WAIT_ADMIN: &str = "ได้รับข้อมูลเรียบร้อยแล้ว กรุณารอแอดมินติดต่อกลับสักครู่";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BotState {
    #[default]
    Idle,
    AskingName,
    AskingPassword,
    WaitingAdmin,
}

/// True if the answer is usable as an in-game name
pub fn is_valid_game_name(answer: &str) -> bool {
    let answer = answer.trim();
    !answer.is_empty() && !contains_thai(answer)
}

#[derive(Debug, Clone)]
pub struct ScriptedBot {
    state: BotState,
    delay: Duration,
    game_name: Option<String>,
}

impl ScriptedBot {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: BotState::Idle,
            delay,
            game_name: None,
        }
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    /// Name accepted in the `asking_name` step
    pub fn game_name(&self) -> Option<&str> {
        self.game_name.as_deref()
    }

    /// Begin (or restart) the script; returns the first prompt
    pub fn start(&mut self) -> &'static str {
        self.state = BotState::AskingName;
        self.game_name = None;
        ASK_NAME
    }

    /// Feed a customer answer; returns the bot's reply, if any.
    ///
    /// In `idle` and `waiting_admin` the text is meant for the admin and the
    /// bot stays silent.
    pub fn advance(&mut self, answer: &str) -> Option<&'static str> {
        match self.state {
            BotState::Idle | BotState::WaitingAdmin => None,
            BotState::AskingName => {
                if is_valid_game_name(answer) {
                    self.game_name = Some(answer.trim().to_string());
                    self.state = BotState::AskingPassword;
                    Some(ASK_PASSWORD)
                } else {
                    Some(INVALID_NAME)
                }
            }
            BotState::AskingPassword => {
                self.state = BotState::WaitingAdmin;
                Some(WAIT_ADMIN)
            }
        }
    }

    async fn reply(&self, sync: &ConversationSync, text: &str) -> Result<ChatMessage, SendError> {
        tokio::time::sleep(self.delay).await;
        sync.send_bot(text).await.map_err(|error| {
            tracing::warn!(error = %error, "Failed to send bot message");
            SendError {
                error,
                restored_text: None,
            }
        })
    }

    /// Handle the quick-reply button.
    ///
    /// The script only starts once the first prompt is stored.
    pub async fn quick_reply(&mut self, sync: &ConversationSync) -> Result<(), SendError> {
        sync.send_text(QUICK_REPLY_LABEL).await?;
        self.reply(sync, ASK_NAME).await?;
        self.start();
        Ok(())
    }

    /// Send a typed customer message and let the bot react to it.
    ///
    /// The state only advances once both the customer's message and the bot's
    /// reply are stored.
    pub async fn handle_text(
        &mut self,
        sync: &ConversationSync,
        text: &str,
    ) -> Result<ChatMessage, SendError> {
        let sent = sync.send_text(text).await?;

        let before = (self.state, self.game_name.clone());
        if let Some(reply) = self.advance(text) {
            if let Err(err) = self.reply(sync, reply).await {
                // Without its prompt the customer would be stuck in the next step
                (self.state, self.game_name) = before;
                return Err(err);
            }
            tracing::debug!(state = ?self.state, "Bot advanced");
        }
        Ok(sent)
    }
}

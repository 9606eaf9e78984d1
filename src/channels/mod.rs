//! Channel abstraction for message I/O.

pub mod telegram;

pub use telegram::TelegramChannel;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// One button in an action menu: a display label plus the opaque payload
/// echoed back when the user presses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub data: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A transport-agnostic action menu, rendered as an inline keyboard on
/// Telegram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    pub rows: Vec<Vec<MenuButton>>,
}

/// An inbound event from the transport, keyed by chat.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub chat_id: i64,
    pub kind: EventKind,
}

/// What the user did.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// A slash command, e.g. `/start`.
    Command(String),
    /// Plain text that is not a command.
    Text(String),
    /// A photo or document upload; `file_id` fetches the bytes.
    Upload { file_id: String },
    /// An inline keyboard button press.
    Callback {
        id: String,
        message_id: i64,
        data: String,
    },
}

pub type EventStream = Pin<Box<dyn Stream<Item = ChannelEvent> + Send>>;

/// Message I/O seam between the orchestrator and the transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin listening; yields one event at a time.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send plain text to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;

    /// Send text with an attached action menu.
    async fn send_menu(&self, chat_id: i64, text: &str, menu: &Menu) -> Result<(), ChannelError>;

    /// Replace the text (and menu) of a previously sent menu message.
    async fn edit_menu(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), ChannelError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn ack_action(&self, callback_id: &str) -> Result<(), ChannelError>;

    /// Download the bytes of an uploaded file.
    async fn fetch_upload(&self, file_id: &str) -> Result<Vec<u8>, ChannelError>;

    /// Deliver a finished document to the chat.
    async fn deliver_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;
}

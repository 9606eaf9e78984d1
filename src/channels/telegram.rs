//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Bot API implementation over reqwest; no bot framework. Updates
//! (messages, uploads, button presses) are normalized into `ChannelEvent`s
//! so the conversation logic never touches wire JSON.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::channels::{Channel, ChannelEvent, EventKind, EventStream, Menu};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        )
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    /// Register the bot's command menu (`setMyCommands`).
    pub async fn set_my_commands(
        &self,
        commands: &[(&str, &str)],
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "commands": commands
                .iter()
                .map(|(command, description)| serde_json::json!({
                    "command": command,
                    "description": description,
                }))
                .collect::<Vec<_>>(),
        });

        let resp = self
            .client
            .post(self.api_url("setMyCommands"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("setMyCommands failed: {err}"),
            });
        }
        Ok(())
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            // The keyboard goes on the final chunk only
            let markup = if i == last { reply_markup.as_ref() } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(markup) = reply_markup {
            markdown_body["reply_markup"] = markup.clone();
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            plain_body["reply_markup"] = markup.clone();
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
                ),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        let Some(event) = parse_update(update, &allowed_users) else {
                            continue;
                        };

                        if tx.send(event).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        self.send_message(chat_id, text, None).await
    }

    async fn send_menu(&self, chat_id: i64, text: &str, menu: &Menu) -> Result<(), ChannelError> {
        self.send_message(chat_id, text, Some(keyboard_markup(menu)))
            .await
    }

    async fn edit_menu(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        menu: Option<&Menu>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(menu) = menu {
            body["reply_markup"] = keyboard_markup(menu);
        }

        let resp = self
            .client
            .post(self.api_url("editMessageText"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            return Ok(());
        }

        // The original message may be too old to edit; fall back to sending
        let status = resp.status();
        tracing::warn!(status = ?status, "editMessageText failed; sending a new message");
        self.send_message(chat_id, text, menu.map(keyboard_markup))
            .await
    }

    async fn ack_action(&self, callback_id: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": callback_id }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("answerCallbackQuery failed: {err}"),
            });
        }
        Ok(())
    }

    async fn fetch_upload(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        // getFile resolves the file_id to a server-side path
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        let data: serde_json::Value =
            resp.json().await.map_err(|e| ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: format!("getFile returned no file_path for {file_id}"),
            })?;

        let file_resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !file_resp.status().is_success() {
            return Err(ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: format!("file download returned {}", file_resp.status()),
            });
        }

        let bytes = file_resp
            .bytes()
            .await
            .map_err(|e| ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        Ok(bytes.to_vec())
    }

    async fn deliver_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendDocument failed: {err}"),
            });
        }

        tracing::info!("Telegram document sent to {chat_id}: {file_name}");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Render a menu as Telegram inline keyboard markup.
fn keyboard_markup(menu: &Menu) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = menu
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| {
                    serde_json::json!({
                        "text": button.label,
                        "callback_data": button.data,
                    })
                })
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Normalize one Bot API update into a `ChannelEvent`.
///
/// Returns `None` for updates from unauthorized users and for update shapes
/// this bot does not handle.
fn parse_update(update: &serde_json::Value, allowed_users: &[String]) -> Option<ChannelEvent> {
    if let Some(query) = update.get("callback_query") {
        let from = query.get("from")?;
        if !sender_allowed(from, allowed_users) {
            warn_unauthorized(from);
            return None;
        }
        let message = query.get("message")?;
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)?;
        let message_id = message
            .get("message_id")
            .and_then(serde_json::Value::as_i64)?;
        let id = query.get("id").and_then(serde_json::Value::as_str)?;
        let data = query.get("data").and_then(serde_json::Value::as_str)?;

        return Some(ChannelEvent {
            chat_id,
            kind: EventKind::Callback {
                id: id.to_string(),
                message_id,
                data: data.to_string(),
            },
        });
    }

    let message = update.get("message")?;
    let from = message.get("from")?;
    if !sender_allowed(from, allowed_users) {
        warn_unauthorized(from);
        return None;
    }
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;

    // Uploads: take the largest photo rendition, or the raw document
    if let Some(photos) = message.get("photo").and_then(serde_json::Value::as_array) {
        let file_id = photos
            .last()
            .and_then(|p| p.get("file_id"))
            .and_then(serde_json::Value::as_str)?;
        return Some(ChannelEvent {
            chat_id,
            kind: EventKind::Upload {
                file_id: file_id.to_string(),
            },
        });
    }
    if let Some(file_id) = message
        .get("document")
        .and_then(|d| d.get("file_id"))
        .and_then(serde_json::Value::as_str)
    {
        return Some(ChannelEvent {
            chat_id,
            kind: EventKind::Upload {
                file_id: file_id.to_string(),
            },
        });
    }

    let text = message.get("text").and_then(serde_json::Value::as_str)?;
    let kind = if text.starts_with('/') {
        EventKind::Command(normalize_command(text))
    } else {
        EventKind::Text(text.to_string())
    };

    Some(ChannelEvent { chat_id, kind })
}

/// Check the sender's username and numeric id against the allowlist.
fn sender_allowed(from: &serde_json::Value, allowed_users: &[String]) -> bool {
    let username = from
        .get("username")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .get("id")
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string());

    allowed_users.iter().any(|u| {
        u == "*" || u == username || user_id.as_deref() == Some(u.as_str())
    })
}

fn warn_unauthorized(from: &serde_json::Value) {
    tracing::warn!(
        "Telegram: ignoring update from unauthorized user: username={}, user_id={}",
        from.get("username")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown"),
        from.get("id")
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    );
}

/// Strip arguments and the `@botname` suffix from a command, lowercased.
fn normalize_command(text: &str) -> String {
    let first = text.split_whitespace().next().unwrap_or(text);
    let bare = first.split('@').next().unwrap_or(first);
    bare.to_lowercase()
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let chunk = &remaining[..max_len];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(max_len);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { max_len } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use crate::channels::MenuButton;

    fn any_user() -> Vec<String> {
        vec!["*".to_string()]
    }

    // ── Basic channel tests ─────────────────────────────────────────

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into(), any_user());
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into(), vec![]);
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            ch.file_url("documents/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/documents/file_1.jpg"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        let ch = TelegramChannel::new("t".into(), any_user());
        assert!(ch.is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = TelegramChannel::new("t".into(), vec!["alice".into(), "bob".into()]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        let ch = TelegramChannel::new("t".into(), vec![]);
        assert!(!ch.is_user_allowed("anyone"));
    }

    #[test]
    fn sender_allowed_by_numeric_id() {
        let from = serde_json::json!({"username": "unknown_name", "id": 123456789});
        assert!(sender_allowed(&from, &["123456789".to_string()]));
        assert!(!sender_allowed(&from, &["987654321".to_string()]));
    }

    // ── Update parsing tests ────────────────────────────────────────

    fn message_update(body: serde_json::Value) -> serde_json::Value {
        let mut message = serde_json::json!({
            "from": {"username": "alice", "id": 42},
            "chat": {"id": 99},
        });
        message
            .as_object_mut()
            .unwrap()
            .extend(body.as_object().unwrap().clone());
        serde_json::json!({"update_id": 1, "message": message})
    }

    #[test]
    fn parse_command_update() {
        let update = message_update(serde_json::json!({"text": "/start"}));
        let event = parse_update(&update, &any_user()).unwrap();
        assert_eq!(event.chat_id, 99);
        match event.kind {
            EventKind::Command(cmd) => assert_eq!(cmd, "/start"),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn parse_command_strips_mention_and_args() {
        let update = message_update(serde_json::json!({"text": "/Start@doc_bot now"}));
        let event = parse_update(&update, &any_user()).unwrap();
        match event.kind {
            EventKind::Command(cmd) => assert_eq!(cmd, "/start"),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn parse_text_update() {
        let update = message_update(serde_json::json!({"text": "hello"}));
        let event = parse_update(&update, &any_user()).unwrap();
        assert!(matches!(event.kind, EventKind::Text(t) if t == "hello"));
    }

    #[test]
    fn parse_photo_takes_largest_rendition() {
        let update = message_update(serde_json::json!({
            "photo": [
                {"file_id": "small", "width": 90},
                {"file_id": "medium", "width": 320},
                {"file_id": "large", "width": 1280},
            ]
        }));
        let event = parse_update(&update, &any_user()).unwrap();
        match event.kind {
            EventKind::Upload { file_id } => assert_eq!(file_id, "large"),
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn parse_document_upload() {
        let update = message_update(serde_json::json!({
            "document": {"file_id": "doc-1", "file_name": "scan.jpg"}
        }));
        let event = parse_update(&update, &any_user()).unwrap();
        assert!(matches!(event.kind, EventKind::Upload { file_id } if file_id == "doc-1"));
    }

    #[test]
    fn parse_callback_update() {
        let update = serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-7",
                "from": {"username": "alice", "id": 42},
                "data": "skip_stage",
                "message": {"message_id": 555, "chat": {"id": 99}},
            }
        });
        let event = parse_update(&update, &any_user()).unwrap();
        assert_eq!(event.chat_id, 99);
        match event.kind {
            EventKind::Callback {
                id,
                message_id,
                data,
            } => {
                assert_eq!(id, "cb-7");
                assert_eq!(message_id, 555);
                assert_eq!(data, "skip_stage");
            }
            other => panic!("expected callback, got {other:?}"),
        }
    }

    #[test]
    fn parse_drops_unauthorized_sender() {
        let update = message_update(serde_json::json!({"text": "/start"}));
        assert!(parse_update(&update, &["bob".to_string()]).is_none());
        // But alice's numeric id matches
        assert!(parse_update(&update, &["42".to_string()]).is_some());
    }

    #[test]
    fn parse_ignores_unhandled_shapes() {
        let update = serde_json::json!({
            "update_id": 3,
            "message": {
                "from": {"username": "alice", "id": 42},
                "chat": {"id": 99},
                "sticker": {"file_id": "stick-1"},
            }
        });
        assert!(parse_update(&update, &any_user()).is_none());
    }

    // ── Keyboard rendering tests ────────────────────────────────────

    #[test]
    fn keyboard_markup_shape() {
        let menu = Menu {
            rows: vec![
                vec![MenuButton::new("➕ Add", "add_photo")],
                vec![
                    MenuButton::new("⬅️ Back", "previous_stage"),
                    MenuButton::new("Skip ➡️", "skip_stage"),
                ],
            ],
        };
        let markup = keyboard_markup(&menu);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0]["text"], "➕ Add");
        assert_eq!(rows[0][0]["callback_data"], "add_photo");
        assert_eq!(rows[1][1]["callback_data"], "skip_stage");
    }

    // ── Command normalization tests ─────────────────────────────────

    #[test]
    fn normalize_command_variants() {
        assert_eq!(normalize_command("/start"), "/start");
        assert_eq!(normalize_command("/START"), "/start");
        assert_eq!(normalize_command("/done@my_bot"), "/done");
        assert_eq!(normalize_command("/cancel please"), "/cancel");
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[tokio::test]
    async fn telegram_deliver_document_network_error() {
        let ch = TelegramChannel::new("fake-token".into(), any_user());
        let result = ch
            .deliver_document(123456, b"%PDF-1.3 test".to_vec(), "combined.pdf", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn telegram_fetch_upload_network_error() {
        let ch = TelegramChannel::new("fake-token".into(), any_user());
        assert!(ch.fetch_upload("some-file-id").await.is_err());
    }
}

//! CollectManager — wires the state machine, collector, and assembler to a
//! channel.
//!
//! Each inbound event is handled to completion before the next one, so a
//! session is never mutated concurrently. Every failure is converted into a
//! user-visible message; nothing propagates past this boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{Channel, ChannelEvent, EventKind, Menu};
use crate::error::Error;

use super::assembler::{self, AssemblyOutcome, ScratchGuard};
use super::collector::UploadCollector;
use super::prompts;
use super::session::{Session, SessionStore};
use super::stages::StageList;
use super::state::{Action, ConversationState, Effect, transition};

/// How to emit a response: a new message, or an edit of the menu message the
/// user just pressed a button on.
#[derive(Debug, Clone, Copy)]
enum ReplyTo {
    New,
    Edit { message_id: i64 },
}

/// Top-level orchestrator for the collection conversation.
pub struct CollectManager {
    channel: Arc<dyn Channel>,
    sessions: SessionStore,
    stages: StageList,
    collector: UploadCollector,
    scratch_dir: PathBuf,
}

impl CollectManager {
    pub fn new(channel: Arc<dyn Channel>, stages: StageList, scratch_dir: PathBuf) -> Self {
        Self {
            channel,
            sessions: SessionStore::new(),
            stages,
            collector: UploadCollector::new(scratch_dir.clone()),
            scratch_dir,
        }
    }

    /// Consume the channel's event stream until it ends.
    pub async fn run(&self) -> Result<(), Error> {
        let mut events = self.channel.start().await?;
        while let Some(event) = events.next().await {
            self.handle_event(event).await;
        }
        tracing::info!("channel event stream ended");
        Ok(())
    }

    /// Handle one inbound event to completion.
    ///
    /// Returns the assembly outcome when this event finished a collection,
    /// which keeps the terminal path observable in tests.
    pub async fn handle_event(&self, event: ChannelEvent) -> Option<AssemblyOutcome> {
        let chat_id = event.chat_id;
        match event.kind {
            EventKind::Command(command) => {
                let Some(action) = Action::from_command(&command) else {
                    self.send_text(chat_id, prompts::idle_hint()).await;
                    return None;
                };
                self.handle_action(chat_id, action, None, ReplyTo::New).await
            }
            EventKind::Callback {
                id,
                message_id,
                data,
            } => {
                // Stop the client spinner even if the press goes nowhere
                if let Err(e) = self.channel.ack_action(&id).await {
                    tracing::debug!("callback ack failed: {e}");
                }
                let Some(action) = Action::from_callback_data(&data) else {
                    tracing::warn!(%data, "unknown callback data");
                    return None;
                };
                self.handle_action(chat_id, action, None, ReplyTo::Edit { message_id })
                    .await
            }
            EventKind::Upload { file_id } => {
                self.handle_action(chat_id, Action::Upload, Some(file_id), ReplyTo::New)
                    .await
            }
            EventKind::Text(_) => {
                if self.sessions.state(chat_id).await == ConversationState::Idle {
                    self.send_text(chat_id, prompts::idle_hint()).await;
                }
                None
            }
        }
    }

    async fn handle_action(
        &self,
        chat_id: i64,
        action: Action,
        upload: Option<String>,
        reply: ReplyTo,
    ) -> Option<AssemblyOutcome> {
        let state = self.sessions.state(chat_id).await;
        let t = transition(state, action);
        tracing::debug!(chat_id, %state, ?action, next = %t.next, "transition");

        match t.effect {
            Effect::Restart => {
                self.restart(chat_id).await;
                self.emit_stage_prompt(chat_id, reply).await;
                None
            }
            Effect::AwaitFiles => {
                self.sessions
                    .with_session(chat_id, |s| s.state = t.next)
                    .await;
                self.reply(chat_id, reply, prompts::await_files(), None).await;
                None
            }
            Effect::Navigate(nav) => {
                let moved = self
                    .sessions
                    .with_session(chat_id, |s| {
                        s.stage_index = self.stages.apply(nav, s.stage_index);
                        s.state = t.next;
                    })
                    .await;
                if moved.is_some() {
                    self.emit_stage_prompt(chat_id, reply).await;
                }
                None
            }
            Effect::StoreUpload => {
                self.store_upload(chat_id, upload).await;
                None
            }
            Effect::Assemble => Some(self.finish(chat_id, reply).await),
            Effect::Discard => {
                self.discard(chat_id).await;
                self.reply(chat_id, reply, prompts::cancelled(), None).await;
                None
            }
            Effect::None => None,
        }
    }

    /// Create a fresh session, purging any blobs the replaced one held.
    async fn restart(&self, chat_id: i64) {
        if let Some(mut old) = self.sessions.begin(chat_id).await {
            purge_uploads(&mut old);
        }
    }

    /// Drop the session without assembling; its blobs go with it.
    async fn discard(&self, chat_id: i64) {
        if let Some(mut old) = self.sessions.remove(chat_id).await {
            purge_uploads(&mut old);
        }
    }

    /// Download, persist, and record one upload; report the running total.
    async fn store_upload(&self, chat_id: i64, file_id: Option<String>) {
        let Some(file_id) = file_id else {
            return;
        };

        let bytes = match self.channel.fetch_upload(&file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // Transient: nothing recorded, the user can retry
                tracing::warn!(chat_id, "upload fetch failed: {e}");
                self.send_text(chat_id, &prompts::upload_failed(&e.to_string()))
                    .await;
                return;
            }
        };

        let total = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(&chat_id) else {
                return;
            };
            self.collector.accept(session, &bytes).await
        };

        match total {
            Ok(total) => {
                if let Err(e) = self
                    .channel
                    .send_menu(chat_id, &prompts::upload_feedback(total), &prompts::upload_menu())
                    .await
                {
                    tracing::warn!(chat_id, "send failed: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(chat_id, "upload persist failed: {e}");
                self.send_text(chat_id, &prompts::upload_failed(&e.to_string()))
                    .await;
            }
        }
    }

    /// Terminal transition: combine everything, deliver, clean up.
    ///
    /// The scratch guard owns every source blob and the artifact, so all of
    /// them are removed whichever way this returns.
    async fn finish(&self, chat_id: i64, reply: ReplyTo) -> AssemblyOutcome {
        let uploads = match self.sessions.remove(chat_id).await {
            Some(mut session) => session.take_uploads(),
            None => Vec::new(),
        };

        let mut guard = ScratchGuard::new();
        for upload in &uploads {
            guard.track(upload.path.clone());
        }

        if uploads.is_empty() {
            self.reply(chat_id, reply, prompts::nothing_to_assemble(), None)
                .await;
            return AssemblyOutcome::Empty;
        }

        self.reply(chat_id, reply, &prompts::combining(uploads.len()), None)
            .await;

        let out_path = self.scratch_dir.join(format!("{chat_id}_combined.pdf"));
        guard.track(out_path.clone());
        let sources: Vec<PathBuf> = uploads.iter().map(|u| u.path.clone()).collect();

        match assembler::combine(sources, out_path.clone()).await {
            Ok(page_count) => match self.deliver(chat_id, &out_path).await {
                Ok(()) => {
                    if let Err(e) = self
                        .channel
                        .send_menu(chat_id, prompts::document_ready(), &prompts::start_over_menu())
                        .await
                    {
                        tracing::warn!(chat_id, "send failed: {e}");
                    }
                    tracing::info!(chat_id, page_count, "document delivered");
                    AssemblyOutcome::Document { page_count }
                }
                Err(reason) => {
                    tracing::warn!(chat_id, "delivery failed: {reason}");
                    self.send_text(chat_id, &prompts::assembly_failed(&reason))
                        .await;
                    AssemblyOutcome::Failed { reason }
                }
            },
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(chat_id, "assembly failed: {reason}");
                self.send_text(chat_id, &prompts::assembly_failed(&reason))
                    .await;
                AssemblyOutcome::Failed { reason }
            }
        }
    }

    async fn deliver(&self, chat_id: i64, artifact: &Path) -> Result<(), String> {
        let bytes = tokio::fs::read(artifact).await.map_err(|e| e.to_string())?;
        self.channel
            .deliver_document(
                chat_id,
                bytes,
                "collected_documents.pdf",
                Some("Here is your combined document."),
            )
            .await
            .map_err(|e| e.to_string())
    }

    /// Re-emit the prompt and menu for the session's current stage.
    async fn emit_stage_prompt(&self, chat_id: i64, reply: ReplyTo) {
        let Some(index) = self
            .sessions
            .with_session(chat_id, |s| s.stage_index)
            .await
        else {
            return;
        };
        let text = prompts::stage_prompt(&self.stages, index);
        let menu = prompts::stage_menu(index, self.stages.len());
        self.reply(chat_id, reply, &text, Some(&menu)).await;
    }

    async fn reply(&self, chat_id: i64, reply: ReplyTo, text: &str, menu: Option<&Menu>) {
        let result = match (reply, menu) {
            (ReplyTo::Edit { message_id }, _) => {
                self.channel.edit_menu(chat_id, message_id, text, menu).await
            }
            (ReplyTo::New, Some(menu)) => self.channel.send_menu(chat_id, text, menu).await,
            (ReplyTo::New, None) => self.channel.send_text(chat_id, text).await,
        };
        if let Err(e) = result {
            tracing::warn!(chat_id, "send failed: {e}");
        }
    }

    async fn send_text(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.channel.send_text(chat_id, text).await {
            tracing::warn!(chat_id, "send failed: {e}");
        }
    }
}

/// Delete every blob a dropped session still owns.
fn purge_uploads(session: &mut Session) {
    let mut guard = ScratchGuard::new();
    for upload in session.take_uploads() {
        guard.track(upload.path);
    }
    // guard drop removes the files
}

// ── Tests ───────────────────────────────────────────────────────────

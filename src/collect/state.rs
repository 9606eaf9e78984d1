//! Conversation state machine — explicit states, actions, and transitions.
//!
//! The transition table is a pure function with no transport or I/O
//! concerns; the orchestrator executes the `Effect` each transition names.

use serde::{Deserialize, Serialize};

use super::stages::Nav;

/// The states of the collection conversation.
///
/// `Idle` means no session exists for the chat. The other two drive which
/// inputs are accepted: button actions in `ChoosingAction`, file uploads
/// (plus the add-more/next buttons) in `UploadingFiles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    ChoosingAction,
    UploadingFiles,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::ChoosingAction => "choosing_action",
            Self::UploadingFiles => "uploading_files",
        };
        write!(f, "{s}")
    }
}

/// Every inbound trigger, as an explicit tagged variant.
///
/// Commands (`/start`, `/done`, `/cancel`) and button callback data both map
/// into this one type, so the transition table below is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    StartOver,
    Done,
    Cancel,
    AddPhoto,
    Previous,
    Skip,
    Finish,
    AddMore,
    NextStage,
    /// A raw file/photo arrived.
    Upload,
}

impl Action {
    /// Callback data used for inline keyboard buttons.
    pub fn callback_data(&self) -> Option<&'static str> {
        let data = match self {
            Self::AddPhoto => "add_photo",
            Self::Previous => "previous_stage",
            Self::Skip => "skip_stage",
            Self::Finish => "finish",
            Self::AddMore => "add_more",
            Self::NextStage => "next_stage_after_add",
            Self::StartOver => "start_over",
            _ => return None,
        };
        Some(data)
    }

    /// Parse inline keyboard callback data.
    pub fn from_callback_data(data: &str) -> Option<Self> {
        match data {
            "add_photo" => Some(Self::AddPhoto),
            "previous_stage" => Some(Self::Previous),
            "skip_stage" => Some(Self::Skip),
            "finish" => Some(Self::Finish),
            "add_more" => Some(Self::AddMore),
            "next_stage_after_add" => Some(Self::NextStage),
            "start_over" => Some(Self::StartOver),
            _ => None,
        }
    }

    /// Parse a slash command (arguments and bot mentions stripped).
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "/start" => Some(Self::Start),
            "/done" => Some(Self::Done),
            "/cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// The side effect the orchestrator must run for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Discard any existing session, create a fresh one, prompt stage 0.
    Restart,
    /// Acknowledge and wait for file uploads.
    AwaitFiles,
    /// Persist the incoming file and report the running total.
    StoreUpload,
    /// Apply a navigation action and re-emit the stage prompt.
    Navigate(Nav),
    /// Run document assembly, deliver, and clear the session.
    Assemble,
    /// Discard the session without assembling.
    Discard,
    /// Nothing to do; the input is ignored in this state.
    None,
}

/// Result of a transition: the new state plus the effect to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub effect: Effect,
}

/// The complete `(state, action) -> (state, effect)` table.
///
/// `Start`/`StartOver`, `Cancel`, and `Done` are accepted from every state;
/// a mid-conversation start overwrites the session rather than merging.
pub fn transition(state: ConversationState, action: Action) -> Transition {
    use Action::*;
    use ConversationState::*;

    let (next, effect) = match (state, action) {
        (_, Start) | (_, StartOver) => (ChoosingAction, Effect::Restart),
        (_, Cancel) => (Idle, Effect::Discard),
        (_, Done) => (Idle, Effect::Assemble),

        (ChoosingAction, AddPhoto) => (UploadingFiles, Effect::AwaitFiles),
        (ChoosingAction, Previous) => (ChoosingAction, Effect::Navigate(Nav::Previous)),
        (ChoosingAction, Skip) => (ChoosingAction, Effect::Navigate(Nav::Skip)),
        (ChoosingAction, Finish) | (UploadingFiles, Finish) => (Idle, Effect::Assemble),

        (UploadingFiles, Upload) => (UploadingFiles, Effect::StoreUpload),
        (UploadingFiles, AddMore) => (UploadingFiles, Effect::AwaitFiles),
        (UploadingFiles, NextStage) => (ChoosingAction, Effect::Navigate(Nav::Advance)),

        (s, _) => (s, Effect::None),
    };

    Transition { next, effect }
}

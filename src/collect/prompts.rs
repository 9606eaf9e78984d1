//! User-facing prompt text and action menus.
//!
//! Everything here is a pure function of the stage position, so menu shape
//! and wording are testable without a transport.

use crate::channels::{Menu, MenuButton};

use super::stages::StageList;
use super::state::Action;

fn button(label: &str, action: Action) -> MenuButton {
    // Only actions with callback data are ever placed on a menu
    MenuButton::new(label, action.callback_data().unwrap_or_default())
}

/// The instruction message for a stage.
pub fn stage_prompt(stages: &StageList, index: usize) -> String {
    format!(
        "➡️ **{}**\n\nWhat would you like to do?",
        stages.label(index)
    )
}

/// The action menu for a stage.
///
/// Always offers Add; Back only past the first stage; Skip everywhere but
/// the last stage, where Finish takes its place.
pub fn stage_menu(index: usize, stage_count: usize) -> Menu {
    let mut rows = vec![vec![button("➕ Add photo/document", Action::AddPhoto)]];

    let mut nav_row = Vec::new();
    if index > 0 {
        nav_row.push(button("⬅️ Back", Action::Previous));
    }
    if index + 1 < stage_count {
        nav_row.push(button("Skip ➡️", Action::Skip));
    } else {
        nav_row.push(button("🏁 Finish", Action::Finish));
    }
    rows.push(nav_row);

    Menu { rows }
}

/// Menu offered after each accepted upload.
pub fn upload_menu() -> Menu {
    Menu {
        rows: vec![
            vec![button("➕ Add another file", Action::AddMore)],
            vec![button("Next stage ➡️", Action::NextStage)],
        ],
    }
}

/// Menu offered after a successful delivery.
pub fn start_over_menu() -> Menu {
    Menu {
        rows: vec![vec![button("🔄 Start a new collection", Action::StartOver)]],
    }
}

pub fn await_files() -> &'static str {
    "Okay, send your files..."
}

pub fn upload_feedback(total: usize) -> String {
    format!("✅ File accepted! Collected so far: {total}.")
}

pub fn combining(count: usize) -> String {
    format!("Great! Combining {count} files into one PDF...")
}

pub fn document_ready() -> &'static str {
    "Your document is ready. Want to start over?"
}

pub fn nothing_to_assemble() -> &'static str {
    "No files were collected, so there is nothing to assemble. Send /start to begin a new collection."
}

pub fn cancelled() -> &'static str {
    "Collection cancelled. Send /start to begin again."
}

pub fn assembly_failed(reason: &str) -> String {
    format!("Something went wrong while building the document: {reason}")
}

pub fn upload_failed(reason: &str) -> String {
    format!("Couldn't save that file ({reason}). Please try sending it again.")
}

pub fn idle_hint() -> &'static str {
    "Send /start to begin a new document collection."
}

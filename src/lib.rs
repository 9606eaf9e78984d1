//! Doc Collect — Telegram document-collection assistant.

pub mod channels;
pub mod collect;
pub mod config;
pub mod error;

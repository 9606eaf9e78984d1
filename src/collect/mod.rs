//! Document collection — the conversational collect-and-assemble flow.
//!
//! The user walks a fixed sequence of stages, uploading photos/documents at
//! each one. The conversation state machine in `state` decides what every
//! input means; `manager` executes the effects against a channel; `assembler`
//! turns the accepted uploads into one combined PDF at the end.

pub mod assembler;
pub mod collector;
pub mod manager;
pub mod prompts;
pub mod session;
pub mod stages;
pub mod state;

pub use assembler::{AssemblyOutcome, ScratchGuard};
pub use collector::UploadCollector;
pub use manager::CollectManager;
pub use session::{Session, SessionStore, StoredUpload};
pub use stages::{Nav, StageList};
pub use state::{Action, ConversationState, Effect, Transition, transition};

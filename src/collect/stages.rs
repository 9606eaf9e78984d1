//! Stage sequencer — the fixed, ordered list of collection steps.

use crate::error::ConfigError;

/// Default collection stages. Overridable via `DOC_COLLECT_STAGES`.
pub const DEFAULT_STAGES: &[&str] = &[
    "1. Land plot status photo",
    "2. Urban planning permit photo",
    "3. Architectural plan photo",
    "4. Utility connection terms photo",
    "5. 📄 Property register extract",
    "6. State expertise report photo",
    "7. License photo",
    "8. Tax documents photo",
];

/// A navigation action within the stage sequence.
///
/// `finish` is deliberately not a navigation action — it terminates the
/// collection and is handled by the conversation state machine instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    /// Go back one stage (clamped at the first stage).
    Previous,
    /// Skip the current stage without uploading.
    Skip,
    /// Move on after uploading files to the current stage.
    Advance,
}

/// The ordered, read-only list of collection stages.
///
/// Shared by all sessions; defined once at process start.
#[derive(Debug, Clone)]
pub struct StageList {
    labels: Vec<String>,
}

impl StageList {
    /// Build a stage list from display labels. At least one label is required.
    pub fn new(labels: Vec<String>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "stages".into(),
                message: "at least one stage label is required".into(),
            });
        }
        Ok(Self { labels })
    }

    /// The default eight-stage configuration.
    pub fn default_list() -> Self {
        Self {
            labels: DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Index of the final stage.
    pub fn last_index(&self) -> usize {
        self.labels.len() - 1
    }

    /// Display label for a stage index.
    pub fn label(&self, index: usize) -> &str {
        self.labels
            .get(index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Apply a navigation action to an index, clamping at both boundaries.
    ///
    /// Advancing past the last stage stays at the last stage; the menu there
    /// offers Finish as the only forward option.
    pub fn apply(&self, nav: Nav, index: usize) -> usize {
        match nav {
            Nav::Previous => index.saturating_sub(1),
            Nav::Skip | Nav::Advance => (index + 1).min(self.last_index()),
        }
    }
}

impl Default for StageList {
    fn default() -> Self {
        Self::default_list()
    }
}

//! Configuration, read from the environment at startup.

use std::path::PathBuf;

use crate::collect::StageList;
use crate::error::ConfigError;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Allowed usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Transient storage for uploads and the generated artifact.
    pub scratch_dir: PathBuf,
    /// The ordered collection stages.
    pub stages: StageList,
}

impl BotConfig {
    /// Read configuration from the environment.
    ///
    /// `TELEGRAM_BOT_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| {
            ConfigError::MissingRequired {
                key: "TELEGRAM_BOT_TOKEN".into(),
                hint: "export TELEGRAM_BOT_TOKEN=<token from @BotFather>".into(),
            }
        })?;

        let allowed_users: Vec<String> = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let scratch_dir = std::env::var("DOC_COLLECT_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./scratch"));

        let stages = match std::env::var("DOC_COLLECT_STAGES") {
            Ok(raw) => {
                let labels: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                StageList::new(labels).map_err(|_| ConfigError::InvalidValue {
                    key: "DOC_COLLECT_STAGES".into(),
                    message: "expected a comma-separated list of stage labels".into(),
                })?
            }
            Err(_) => StageList::default_list(),
        };

        Ok(Self {
            bot_token,
            allowed_users,
            scratch_dir,
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_parse_from_comma_list() {
        let labels: Vec<String> = "1. First, 2. Second ,,3. Third"
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let stages = StageList::new(labels).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages.label(1), "2. Second");
    }
}

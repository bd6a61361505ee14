//! Keyword-list output moderation.
//!
//! Config shape:
//! `{"keywords": "a\nb", "outputs_config": {"enabled": true, "preset_response": "..."}}`

use serde::Deserialize;

use super::{ModerationAction, ModerationError, ModerationOutputsResult, OutputModerator};

/// Rule type handled by [`KeywordModerator`].
pub const RULE_TYPE: &str = "keywords";

/// Maximum total length of the keywords field.
const MAX_KEYWORDS_CHARS: usize = 10_000;

/// Maximum number of keyword rows.
const MAX_KEYWORD_ROWS: usize = 100;

#[derive(Debug, Deserialize)]
struct KeywordsConfig {
    #[serde(default)]
    keywords: String,
    #[serde(default)]
    outputs_config: OutputsConfig,
}

#[derive(Debug, Default, Deserialize)]
struct OutputsConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    preset_response: String,
}

/// Flags output containing any configured keyword (case-insensitive).
///
/// Rows are matched as written; only empty rows are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordModerator {
    keywords: Vec<String>,
    outputs_enabled: bool,
    preset_response: String,
}

impl KeywordModerator {
    /// Build from rule configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModerationError::InvalidConfig`] if the config does not
    /// parse, the keyword list is empty or too large, or outputs moderation
    /// is enabled without a preset response.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ModerationError> {
        let invalid = |detail: String| ModerationError::InvalidConfig {
            rule: RULE_TYPE.to_owned(),
            detail,
        };

        let parsed: KeywordsConfig =
            serde_json::from_value(config.clone()).map_err(|e| invalid(e.to_string()))?;

        if parsed.keywords.trim().is_empty() {
            return Err(invalid("keywords is required".to_owned()));
        }
        if parsed.keywords.chars().count() > MAX_KEYWORDS_CHARS {
            return Err(invalid(format!(
                "keywords length must be at most {MAX_KEYWORDS_CHARS} characters"
            )));
        }

        let keywords: Vec<String> = parsed
            .keywords
            .split('\n')
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
            .collect();
        if keywords.len() > MAX_KEYWORD_ROWS {
            return Err(invalid(format!(
                "at most {MAX_KEYWORD_ROWS} keyword rows are allowed"
            )));
        }

        let outputs = parsed.outputs_config;
        if outputs.enabled && outputs.preset_response.is_empty() {
            return Err(invalid(
                "outputs_config.preset_response is required when enabled".to_owned(),
            ));
        }

        Ok(Self {
            keywords,
            outputs_enabled: outputs.enabled,
            preset_response: outputs.preset_response,
        })
    }

    fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl OutputModerator for KeywordModerator {
    fn moderate_outputs(&self, text: &str) -> Result<ModerationOutputsResult, ModerationError> {
        if !self.outputs_enabled {
            return Ok(ModerationOutputsResult::pass());
        }
        Ok(ModerationOutputsResult {
            flagged: self.matches(text),
            action: ModerationAction::DirectOutput,
            preset_response: self.preset_response.clone(),
            text: String::new(),
        })
    }
}

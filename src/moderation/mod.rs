//! Output moderation.
//!
//! - [`OutputModerator`]: judges one piece of text against a rule
//! - [`keywords::KeywordModerator`]: the built-in `"keywords"` rule
//! - [`output::OutputModeration`]: buffers streamed output, moderates it in
//!   the background and publishes replacements to the task queue
//! - [`ModerationHandlerFactory`]: builds handlers from an app's rule
//! - [`gate::ModerationGate`]: the pipeline's one-shot view of a handler

pub mod gate;
pub mod keywords;
pub mod output;

pub use self::gate::ModerationGate;
pub use self::keywords::KeywordModerator;
pub use self::output::OutputModeration;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::QueueManager;

// ---------------------------------------------------------------------------
// Rule and result types
// ---------------------------------------------------------------------------

/// A moderation rule: a rule type plus its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationRule {
    /// Rule type (e.g. `"keywords"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Rule-specific configuration.
    pub config: serde_json::Value,
}

/// What to do with flagged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    /// Replace the whole answer with the preset response.
    DirectOutput,
    /// Replace the moderated text with [`ModerationOutputsResult::text`].
    Overridden,
}

/// Verdict for one piece of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutputsResult {
    /// Whether the text violates the rule.
    pub flagged: bool,
    /// Action to take when flagged.
    pub action: ModerationAction,
    /// Replacement for [`ModerationAction::DirectOutput`].
    #[serde(default)]
    pub preset_response: String,
    /// Replacement for [`ModerationAction::Overridden`].
    #[serde(default)]
    pub text: String,
}

impl ModerationOutputsResult {
    /// A verdict that lets the text through.
    pub fn pass() -> Self {
        Self {
            flagged: false,
            action: ModerationAction::DirectOutput,
            preset_response: String::new(),
            text: String::new(),
        }
    }

    /// The text that should replace the moderated output, if flagged.
    pub fn replacement(&self) -> Option<&str> {
        if !self.flagged {
            return None;
        }
        match self.action {
            ModerationAction::DirectOutput => Some(&self.preset_response),
            ModerationAction::Overridden => Some(&self.text),
        }
    }
}

/// Errors from moderation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModerationError {
    /// No moderator is registered for the rule type.
    #[error("unknown moderation rule type: {0}")]
    UnknownRule(String),

    /// The rule configuration is invalid.
    #[error("invalid {rule} moderation config: {detail}")]
    InvalidConfig {
        /// Rule type.
        rule: String,
        /// What is wrong.
        detail: String,
    },

    /// Moderating a piece of text failed.
    #[error("moderation failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Judges output text against one rule.
pub trait OutputModerator: Send + Sync {
    /// Moderate `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ModerationError::Failed`] if the text cannot be judged.
    fn moderate_outputs(&self, text: &str) -> Result<ModerationOutputsResult, ModerationError>;
}

/// A per-task output moderation handler.
pub trait OutputModerationHandler: Send + Sync {
    /// Append a streamed token to the moderation buffer.
    fn append_new_token(&mut self, token: &str);

    /// Stop background moderation.
    fn stop(&mut self);

    /// Moderate the full completion and return the text to deliver.
    ///
    /// When `public_event` is set and the completion is flagged, a
    /// replacement event is also published to the task queue.
    fn moderation_completion(&mut self, completion: &str, public_event: bool) -> String;

    /// The direct-output replacement, once the buffer has been flagged.
    fn final_output(&self) -> Option<String>;

    /// Whether the answer must be replaced by [`Self::final_output`].
    fn should_direct_output(&self) -> bool {
        self.final_output().is_some()
    }
}

/// Builds output moderation handlers for a task.
pub trait ModerationHandlerFactory: Send + Sync {
    /// Create a handler bound to tenant, app, rule and queue.
    ///
    /// # Errors
    ///
    /// Returns [`ModerationError`] if the rule is unknown or misconfigured.
    fn create(
        &self,
        tenant_id: &str,
        app_id: &str,
        rule: ModerationRule,
        queue_manager: Arc<dyn QueueManager>,
    ) -> Result<Box<dyn OutputModerationHandler>, ModerationError>;
}

// ---------------------------------------------------------------------------
// Default factory
// ---------------------------------------------------------------------------

/// Default number of new characters buffered between background checks.
pub const DEFAULT_BUFFER_SIZE: usize = 300;

/// Default pause between background checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Tuning for the background moderation worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationSettings {
    /// New characters to accumulate before a background check.
    pub buffer_size: usize,
    /// Pause between checks.
    pub check_interval: Duration,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Resolve the moderator for a rule type.
///
/// # Errors
///
/// Returns [`ModerationError::UnknownRule`] for unsupported types and
/// [`ModerationError::InvalidConfig`] for malformed configuration.
pub fn moderator_for_rule(
    rule: &ModerationRule,
) -> Result<Arc<dyn OutputModerator>, ModerationError> {
    match rule.kind.as_str() {
        keywords::RULE_TYPE => Ok(Arc::new(KeywordModerator::from_config(&rule.config)?)),
        other => Err(ModerationError::UnknownRule(other.to_owned())),
    }
}

/// Factory producing [`OutputModeration`] handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModerationFactory {
    settings: ModerationSettings,
}

impl DefaultModerationFactory {
    /// Create a factory with explicit worker settings.
    pub fn new(settings: ModerationSettings) -> Self {
        Self { settings }
    }
}

impl ModerationHandlerFactory for DefaultModerationFactory {
    fn create(
        &self,
        tenant_id: &str,
        app_id: &str,
        rule: ModerationRule,
        queue_manager: Arc<dyn QueueManager>,
    ) -> Result<Box<dyn OutputModerationHandler>, ModerationError> {
        let moderator = moderator_for_rule(&rule)?;
        Ok(Box::new(OutputModeration::new(
            tenant_id,
            app_id,
            rule,
            moderator,
            queue_manager,
            self.settings,
        )))
    }
}

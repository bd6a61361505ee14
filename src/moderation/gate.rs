//! One-shot moderation gate owned by a task pipeline.

use super::OutputModerationHandler;

/// State of a task's output moderation.
///
/// A gate starts [`Active`](Self::Active) when the app enables moderation,
/// otherwise [`Disabled`](Self::Disabled). Finishing an active gate consumes
/// its handler; every later finish returns `None`.
#[derive(Default)]
pub enum ModerationGate {
    /// A handler is attached and will moderate the completion.
    Active(Box<dyn OutputModerationHandler>),
    /// The handler already moderated the completion and was discarded.
    Consumed,
    /// Moderation is not configured for this app.
    #[default]
    Disabled,
}

impl std::fmt::Debug for ModerationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Active(_) => "Active",
            Self::Consumed => "Consumed",
            Self::Disabled => "Disabled",
        };
        f.write_str(state)
    }
}

impl ModerationGate {
    /// Whether a handler is attached.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Feed a streamed token to the handler, if any.
    pub fn append_token(&mut self, token: &str) {
        if let Self::Active(handler) = self {
            handler.append_new_token(token);
        }
    }

    /// Whether the handler has decided to replace the whole answer.
    pub fn should_direct_output(&self) -> bool {
        match self {
            Self::Active(handler) => handler.should_direct_output(),
            Self::Consumed | Self::Disabled => false,
        }
    }

    /// The handler's direct-output replacement, if decided.
    pub fn final_output(&self) -> Option<String> {
        match self {
            Self::Active(handler) => handler.final_output(),
            Self::Consumed | Self::Disabled => None,
        }
    }

    /// Stop the handler, moderate `completion` and discard the handler.
    ///
    /// Returns `None` when no moderation was applied (gate disabled or
    /// already consumed).
    pub fn finish(&mut self, completion: &str) -> Option<String> {
        match std::mem::replace(self, Self::Consumed) {
            Self::Active(mut handler) => {
                handler.stop();
                Some(handler.moderation_completion(completion, false))
            }
            other => {
                *self = other;
                None
            }
        }
    }
}

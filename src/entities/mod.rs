//! Typed entities shared by the pipeline and its collaborators.
//!
//! - Generation-request descriptor ([`AppGenerateEntity`]) and app configuration
//! - Queue events ([`queue`])
//! - Stream responses emitted to the client ([`stream`])

pub mod queue;
pub mod stream;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of one streaming generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random task id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// App configuration
// ---------------------------------------------------------------------------

/// Sensitive-word avoidance settings attached to an app.
///
/// Presence of this block enables output moderation for the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitiveWordAvoidance {
    /// Moderation rule type (e.g. `"keywords"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Rule-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Per-app configuration carried by a generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Owning tenant.
    pub tenant_id: String,
    /// App identifier.
    pub app_id: String,
    /// Output moderation settings; `None` disables moderation.
    pub sensitive_word_avoidance: Option<SensitiveWordAvoidance>,
}

// ---------------------------------------------------------------------------
// Generation request
// ---------------------------------------------------------------------------

/// Surface a generation request was invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeFrom {
    /// Public service API.
    #[default]
    ServiceApi,
    /// Published web app.
    WebApp,
    /// Explore page.
    Explore,
    /// App debugger in the console.
    Debugger,
}

/// Descriptor of one generation request.
///
/// The task id is fixed at construction and only exposed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppGenerateEntity {
    task_id: TaskId,
    /// App configuration, including the optional moderation rule.
    pub app_config: AppConfig,
    /// Where the request came from.
    pub invoke_from: InvokeFrom,
    /// Whether the client asked for a streamed response.
    pub stream: bool,
}

impl AppGenerateEntity {
    /// Create a descriptor with a freshly generated task id.
    pub fn new(app_config: AppConfig, invoke_from: InvokeFrom, stream: bool) -> Self {
        Self::with_task_id(TaskId::new(), app_config, invoke_from, stream)
    }

    /// Create a descriptor for an already-assigned task id.
    pub fn with_task_id(
        task_id: TaskId,
        app_config: AppConfig,
        invoke_from: InvokeFrom,
        stream: bool,
    ) -> Self {
        Self {
            task_id,
            app_config,
            invoke_from,
            stream,
        }
    }

    /// The task id.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

/// The principal a task generates for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerateUser {
    /// A console account.
    Account {
        /// Account id.
        id: String,
    },
    /// An end user of a published app.
    EndUser {
        /// End-user id.
        id: String,
        /// Client session identifier.
        session_id: String,
    },
}

impl GenerateUser {
    /// The user's id, whatever its kind.
    pub fn id(&self) -> &str {
        match self {
            Self::Account { id } | Self::EndUser { id, .. } => id,
        }
    }
}

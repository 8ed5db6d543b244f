//! Tool call state machine types.
//!
//! Each call is a tagged union replaced (never mutated) on every
//! transition:
//!
//! ```text
//! Validating ──> Scheduled ────────> Executing ──> Success
//!           └──> AwaitingApproval ──┘         └──> Error
//!           └────────────────────────────────────> Error / Cancelled
//! ```
//!
//! Terminal states (`Success`, `Error`, `Cancelled`) never transition
//! again; a batch is complete once every call in it is terminal.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crucible_tools::{ConfirmationDetails, Tool};
use crucible_types::{Part, ToolCallRequest};

use crate::response::encode_error_part;

/// Model-facing error text for a user-rejected confirmation.
pub const REJECTION_MESSAGE: &str = "User rejected function call.";

/// The normalized outcome of one tool call, ready for the conversation
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResponse {
    pub call_id: String,
    /// Function-response envelope plus any trailing binary parts.
    pub parts: Vec<Part>,
    /// Optional human-readable summary for the UI.
    pub display: Option<String>,
    /// Set when the call failed or was cancelled.
    pub error: Option<String>,
}

impl ToolCallResponse {
    /// Build a well-formed error response carrying `message`.
    #[must_use]
    pub fn error(tool_name: &str, call_id: &str, message: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            parts: vec![encode_error_part(tool_name, call_id, message)],
            display: Some(message.to_string()),
            error: Some(message.to_string()),
        }
    }

    /// The synthetic response for a confirmation the user rejected.
    #[must_use]
    pub fn rejected(tool_name: &str, call_id: &str) -> Self {
        Self::error(tool_name, call_id, REJECTION_MESSAGE)
    }
}

/// One tracked tool call.
#[derive(Clone)]
pub enum ToolCall {
    /// Request received, registry lookup and validation in progress.
    Validating { request: ToolCallRequest },
    /// Validated; no confirmation required; execution imminent.
    Scheduled {
        request: ToolCallRequest,
        tool: Arc<dyn Tool>,
    },
    /// Validated, but execution is suspended until a confirmation
    /// decision arrives.
    AwaitingApproval {
        request: ToolCallRequest,
        tool: Arc<dyn Tool>,
        confirmation: ConfirmationDetails,
    },
    /// The tool is running.
    Executing {
        request: ToolCallRequest,
        tool: Arc<dyn Tool>,
        started_at: Instant,
        /// Accumulated live output, published best-effort while running.
        live_output: Option<String>,
    },
    /// Terminal: the tool ran to completion.
    Success {
        request: ToolCallRequest,
        tool: Arc<dyn Tool>,
        response: ToolCallResponse,
        started_at: Instant,
        finished_at: Instant,
    },
    /// Terminal: lookup, validation, execution, or confirmation failed.
    Error {
        request: ToolCallRequest,
        tool: Option<Arc<dyn Tool>>,
        response: ToolCallResponse,
        started_at: Option<Instant>,
        finished_at: Instant,
    },
    /// Terminal: the batch token was signalled before the call started.
    Cancelled {
        request: ToolCallRequest,
        tool: Option<Arc<dyn Tool>>,
        response: ToolCallResponse,
        reason: String,
    },
}

impl ToolCall {
    #[must_use]
    pub fn validating(request: ToolCallRequest) -> Self {
        Self::Validating { request }
    }

    /// The originating request, in any state.
    #[must_use]
    pub fn request(&self) -> &ToolCallRequest {
        match self {
            Self::Validating { request }
            | Self::Scheduled { request, .. }
            | Self::AwaitingApproval { request, .. }
            | Self::Executing { request, .. }
            | Self::Success { request, .. }
            | Self::Error { request, .. }
            | Self::Cancelled { request, .. } => request,
        }
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.request().call_id
    }

    /// Whether this call has reached `Success`, `Error`, or `Cancelled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }

    #[must_use]
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Validating { .. } => "validating",
            Self::Scheduled { .. } => "scheduled",
            Self::AwaitingApproval { .. } => "awaiting_approval",
            Self::Executing { .. } => "executing",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// The final response, once terminal.
    #[must_use]
    pub fn response(&self) -> Option<&ToolCallResponse> {
        match self {
            Self::Success { response, .. }
            | Self::Error { response, .. }
            | Self::Cancelled { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Wall-clock duration of a successfully executed call.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Success {
                started_at,
                finished_at,
                ..
            } => Some(finished_at.duration_since(*started_at)),
            Self::Error {
                started_at: Some(started_at),
                finished_at,
                ..
            } => Some(finished_at.duration_since(*started_at)),
            _ => None,
        }
    }

    #[must_use]
    pub fn live_output(&self) -> Option<&str> {
        match self {
            Self::Executing { live_output, .. } => live_output.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn confirmation(&self) -> Option<&ConfirmationDetails> {
        match self {
            Self::AwaitingApproval { confirmation, .. } => Some(confirmation),
            _ => None,
        }
    }
}

impl fmt::Debug for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCall")
            .field("status", &self.status_name())
            .field("call_id", &self.call_id())
            .field("tool", &self.request().name)
            .finish_non_exhaustive()
    }
}

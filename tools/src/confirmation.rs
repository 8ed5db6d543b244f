//! Confirmation types - what a tool asks the user before executing, and
//! the decision that comes back.
//!
//! Confirmation details are plain data. The decision is routed back
//! through the scheduler as an outcome value plus an optional payload,
//! so it stays serializable and independent of the object graph that
//! produced it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;

use crate::ToolError;

/// The user's decision on a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Approve this call only.
    ProceedOnce,
    /// Approve and remember the approval for the rest of the session.
    ProceedAlways,
    /// Approve everything from this server (protocol tools).
    ProceedAlwaysServer,
    /// Approve this specific tool for the rest of the session.
    ProceedAlwaysTool,
    /// Open the proposed content in the user's editor before deciding.
    ModifyWithEditor,
    /// Reject the call.
    Cancel,
}

impl ConfirmationOutcome {
    /// Whether this outcome authorizes execution.
    #[must_use]
    pub fn is_proceed(self) -> bool {
        matches!(
            self,
            Self::ProceedOnce | Self::ProceedAlways | Self::ProceedAlwaysServer | Self::ProceedAlwaysTool
        )
    }
}

/// Optional data accompanying a confirmation decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPayload {
    /// User-edited replacement for the tool's proposed content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
}

/// What the user is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationDetails {
    /// A file modification, shown as a diff.
    Edit {
        title: String,
        file_name: String,
        file_path: PathBuf,
        file_diff: String,
        original_content: String,
        new_content: String,
        /// Set while the user has the proposed content open in an editor.
        is_modifying: bool,
    },
    /// A shell command.
    Exec {
        title: String,
        command: String,
        root_command: String,
    },
    /// An externally discovered protocol tool.
    Mcp {
        title: String,
        server_name: String,
        tool_name: String,
        tool_display_name: String,
    },
    /// A generic prompt, optionally listing URLs that will be fetched.
    Info {
        title: String,
        prompt: String,
        urls: Vec<String>,
    },
}

impl ConfirmationDetails {
    /// Build an edit confirmation, rendering the diff from the contents.
    #[must_use]
    pub fn edit(
        file_name: impl Into<String>,
        file_path: impl Into<PathBuf>,
        original_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let original_content = original_content.into();
        let new_content = new_content.into();
        let file_diff = render_unified_diff(&file_name, &original_content, &new_content);
        Self::Edit {
            title: format!("Confirm edit: {file_name}"),
            file_name,
            file_path: file_path.into(),
            file_diff,
            original_content,
            new_content,
            is_modifying: false,
        }
    }

    #[must_use]
    pub fn exec(command: impl Into<String>) -> Self {
        let command = command.into();
        let root_command = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self::Exec {
            title: format!("Confirm shell command: {root_command}"),
            command,
            root_command,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Edit { title, .. }
            | Self::Exec { title, .. }
            | Self::Mcp { title, .. }
            | Self::Info { title, .. } => title,
        }
    }
}

/// The inline-edit confirmation contract.
///
/// Lets the scheduler rebuild a tool's arguments from user-edited content
/// instead of the model's original proposal. Tools without this
/// capability cannot participate in inline-edit confirmation.
pub trait ModifyContext: Send + Sync {
    /// Path of the file the proposed change targets.
    fn file_path(&self, args: &Value) -> Option<PathBuf>;

    /// The content currently on disk (or empty for a new file).
    fn current_content(&self, args: &Value) -> Result<String, ToolError>;

    /// The content the tool proposes to write.
    fn proposed_content(&self, args: &Value) -> Result<String, ToolError>;

    /// Rebuild the tool's arguments from user-modified content.
    fn updated_params(&self, original_content: &str, modified_content: &str, args: &Value)
    -> Value;
}

/// Session-scoped allowlist of pre-approved confirmation keys.
///
/// Injected per scheduler instance so concurrent sessions never leak
/// "always allow" state into each other. Keys are tool-defined (a root
/// command, a server name, a tool name).
#[derive(Debug, Default)]
pub struct AllowlistStore {
    entries: Mutex<HashSet<String>>,
}

impl AllowlistStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, key: impl Into<String>) {
        let key = key.into();
        tracing::debug!(key = %key, "allowlisting confirmation key for session");
        self.lock().insert(key);
    }

    #[must_use]
    pub fn is_allowed(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Format a unified diff between old and new content for confirmation
/// prompts.
#[must_use]
pub fn render_unified_diff(file_name: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    diff.unified_diff()
        .context_radius(3)
        .header(&format!("a/{file_name}"), &format!("b/{file_name}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{AllowlistStore, ConfirmationDetails, ConfirmationOutcome, render_unified_diff};

    #[test]
    fn proceed_outcomes_authorize_execution() {
        assert!(ConfirmationOutcome::ProceedOnce.is_proceed());
        assert!(ConfirmationOutcome::ProceedAlwaysTool.is_proceed());
        assert!(!ConfirmationOutcome::Cancel.is_proceed());
        assert!(!ConfirmationOutcome::ModifyWithEditor.is_proceed());
    }

    #[test]
    fn edit_confirmation_carries_rendered_diff() {
        let details =
            ConfirmationDetails::edit("notes.txt", "/tmp/notes.txt", "one\ntwo\n", "one\nthree\n");
        let ConfirmationDetails::Edit {
            file_diff,
            is_modifying,
            ..
        } = &details
        else {
            panic!("expected edit details");
        };
        assert!(file_diff.contains("-two"));
        assert!(file_diff.contains("+three"));
        assert!(!is_modifying);
    }

    #[test]
    fn exec_confirmation_extracts_root_command() {
        let details = ConfirmationDetails::exec("git push origin main");
        let ConfirmationDetails::Exec { root_command, .. } = &details else {
            panic!("expected exec details");
        };
        assert_eq!(root_command, "git");
    }

    #[test]
    fn allowlist_is_per_instance() {
        let a = AllowlistStore::new();
        let b = AllowlistStore::new();
        a.allow("git");
        assert!(a.is_allowed("git"));
        assert!(!b.is_allowed("git"));
    }

    #[test]
    fn identical_content_diffs_to_nothing() {
        let diff = render_unified_diff("f.txt", "same\n", "same\n");
        assert!(!diff.contains('+'));
    }
}

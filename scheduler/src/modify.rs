//! Inline and editor-driven modification of a parked tool call.
//!
//! Both paths rebuild the call's arguments through the tool's
//! [`ModifyContext`] and leave the original request untouched; a
//! modified call is a new request value, not a mutation.

use std::io;
use std::sync::Arc;

use tokio::task;
use tracing::warn;

use crucible_tools::{ConfirmationDetails, Tool, ToolError};
use crucible_types::ToolCallRequest;

use crate::call::ToolCall;
use crate::scheduler::Inner;

/// Opens proposed content in the user's preferred editor and returns
/// what they saved.
///
/// Implementations block (they wait on an interactive process); the
/// scheduler always calls them from a blocking task.
pub trait EditorProvider: Send + Sync {
    fn edit(&self, file_name: &str, current_content: &str, proposed_content: &str)
    -> io::Result<String>;
}

/// Default provider for sessions without an editor configured.
#[derive(Debug, Default)]
pub struct NoEditor;

impl EditorProvider for NoEditor {
    fn edit(&self, _file_name: &str, _current: &str, _proposed: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no editor configured for this session",
        ))
    }
}

/// Rebuild a request from user-edited content delivered inline with a
/// proceed decision.
///
/// Tools without a [`ModifyContext`] cannot honor the payload; the
/// original request is kept and the payload dropped with a warning.
pub(crate) fn apply_inline_modification(
    request: &ToolCallRequest,
    tool: &dyn Tool,
    confirmation: &ConfirmationDetails,
    new_content: &str,
) -> Result<ToolCallRequest, ToolError> {
    let Some(modify) = tool.modify_context() else {
        warn!(
            call_id = %request.call_id,
            tool = %request.name,
            "inline modification payload for a tool without modify support"
        );
        return Ok(request.clone());
    };
    let original = match confirmation {
        ConfirmationDetails::Edit {
            original_content, ..
        } => original_content.clone(),
        _ => modify.current_content(&request.args)?,
    };
    let updated = modify.updated_params(&original, new_content, &request.args);
    Ok(request.with_args(updated))
}

/// Run the `ModifyWithEditor` flow for a parked call.
///
/// The call stays in `AwaitingApproval` throughout: marked as modifying
/// while the editor is open, then re-parked with a fresh diff built from
/// whatever the user saved. A failed editor session restores the
/// original confirmation.
pub(crate) async fn run_editor_flow(
    inner: &Arc<Inner>,
    request: &ToolCallRequest,
    tool: &Arc<dyn Tool>,
    confirmation: &ConfirmationDetails,
) {
    let call_id = request.call_id.clone();
    let Some(modify) = tool.modify_context() else {
        warn!(call_id = %call_id, tool = %request.name, "tool does not support editor modification");
        return;
    };
    let ConfirmationDetails::Edit {
        file_name,
        file_path,
        original_content,
        new_content,
        ..
    } = confirmation
    else {
        warn!(call_id = %call_id, tool = %request.name, "editor modification on a non-edit confirmation");
        return;
    };

    let mut modifying = confirmation.clone();
    if let ConfirmationDetails::Edit { is_modifying, .. } = &mut modifying {
        *is_modifying = true;
    }
    inner.transition(
        &call_id,
        ToolCall::AwaitingApproval {
            request: request.clone(),
            tool: Arc::clone(tool),
            confirmation: modifying,
        },
    );

    let edited = {
        let editor = Arc::clone(&inner.editor);
        let file_name = file_name.clone();
        let current = original_content.clone();
        let proposed = new_content.clone();
        task::spawn_blocking(move || editor.edit(&file_name, &current, &proposed)).await
    };

    match edited {
        Ok(Ok(modified)) => {
            let updated = modify.updated_params(original_content, &modified, &request.args);
            let request = request.with_args(updated);
            let confirmation =
                ConfirmationDetails::edit(file_name, file_path, original_content, modified);
            inner.transition(
                &call_id,
                ToolCall::AwaitingApproval {
                    request,
                    tool: Arc::clone(tool),
                    confirmation,
                },
            );
        }
        Ok(Err(err)) => {
            warn!(call_id = %call_id, error = %err, "editor session failed, keeping original proposal");
            inner.transition(
                &call_id,
                ToolCall::AwaitingApproval {
                    request: request.clone(),
                    tool: Arc::clone(tool),
                    confirmation: confirmation.clone(),
                },
            );
        }
        Err(err) => {
            warn!(call_id = %call_id, error = %err, "editor task panicked, keeping original proposal");
            inner.transition(
                &call_id,
                ToolCall::AwaitingApproval {
                    request: request.clone(),
                    tool: Arc::clone(tool),
                    confirmation: confirmation.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{EditorProvider, NoEditor};

    #[test]
    fn no_editor_reports_unsupported() {
        let err = NoEditor.edit("f.txt", "a", "b").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}

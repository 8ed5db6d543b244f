//! The `Tool` trait and per-call execution context.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crucible_types::ToolResult;

use crate::confirmation::{
    AllowlistStore, ConfirmationDetails, ConfirmationOutcome, ModifyContext,
};
use crate::{ToolError, validate_args};

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + 'a>>;

/// Confirmation-probe future type alias.
pub type ConfirmFut<'a> =
    Pin<Box<dyn Future<Output = Result<Option<ConfirmationDetails>, ToolError>> + Send + 'a>>;

/// One chunk of live output emitted while a tool executes.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub call_id: String,
    pub chunk: String,
}

/// Per-call tool context.
///
/// Carries the batch cancellation token (advisory: tools should check it
/// at their own suspension points) and a best-effort live-output channel.
#[derive(Debug)]
pub struct ToolCtx {
    pub call_id: String,
    pub token: CancellationToken,
    pub output_tx: Option<mpsc::Sender<OutputChunk>>,
}

impl ToolCtx {
    #[must_use]
    pub fn new(call_id: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            call_id: call_id.into(),
            token,
            output_tx: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, tx: mpsc::Sender<OutputChunk>) -> Self {
        self.output_tx = Some(tx);
        self
    }

    /// Emit a live output chunk. Delivery is best-effort: a full channel
    /// drops the chunk rather than blocking the tool.
    pub fn emit(&self, chunk: impl Into<String>) {
        if let Some(tx) = &self.output_tx {
            let _ = tx.try_send(OutputChunk {
                call_id: self.call_id.clone(),
                chunk: chunk.into(),
            });
        }
    }
}

/// A named capability invokable by the model.
///
/// Implementations cover shell execution, file search, file read/write,
/// web fetch, and externally discovered protocol tools; the scheduler
/// depends only on this narrow surface.
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable name for the UI.
    fn display_name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn schema(&self) -> Value;

    /// Validate arguments before scheduling. The default validates
    /// against [`Tool::schema`]; tools may override for bespoke checks.
    fn validate_params(&self, args: &Value) -> Result<(), ToolError> {
        validate_args(&self.schema(), args)
    }

    /// Whether this invocation needs user confirmation before executing.
    ///
    /// `None` means proceed without asking. The probe may touch the
    /// filesystem (e.g. to build an edit diff), hence the future.
    fn should_confirm<'a>(
        &'a self,
        _args: &'a Value,
        _token: &'a CancellationToken,
    ) -> ConfirmFut<'a> {
        Box::pin(std::future::ready(Ok(None)))
    }

    /// Execute the tool. Cooperative cancellation via `ctx.token` is the
    /// tool's own responsibility; the scheduler never kills in-flight work.
    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a>;

    /// Inline-edit confirmation support, if this tool offers it.
    fn modify_context(&self) -> Option<&dyn ModifyContext> {
        None
    }

    /// Session-scoped bookkeeping for a confirmation decision, invoked by
    /// the scheduler before it acts on the outcome. "Always allow" style
    /// outcomes belong in the injected [`AllowlistStore`], never in static
    /// tool state.
    fn record_decision(
        &self,
        _args: &Value,
        _outcome: ConfirmationOutcome,
        _allowlist: &AllowlistStore,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{OutputChunk, ToolCtx};

    #[test]
    fn emit_without_channel_is_a_noop() {
        let ctx = ToolCtx::new("call-1", CancellationToken::new());
        ctx.emit("ignored");
    }

    #[tokio::test]
    async fn emit_drops_chunks_when_channel_full() {
        let (tx, mut rx) = mpsc::channel::<OutputChunk>(1);
        let ctx = ToolCtx::new("call-1", CancellationToken::new()).with_output(tx);
        ctx.emit("first");
        ctx.emit("dropped");
        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.chunk, "first");
        assert_eq!(chunk.call_id, "call-1");
        assert!(rx.try_recv().is_err());
    }
}

//! The tool call scheduler - takes a batch of model-issued requests,
//! validates them, routes confirmations, executes concurrently, and
//! reports one terminal outcome per call.
//!
//! Per-call failures never escape [`ToolScheduler::schedule`] or
//! [`ToolScheduler::handle_confirmation_response`]; every failure is
//! folded into that call's terminal state so the conversation can
//! continue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crucible_tools::{
    AllowlistStore, ConfirmationDetails, ConfirmationOutcome, ConfirmationPayload, OutputChunk,
    Tool, ToolCtx, ToolError, ToolRegistry,
};
use crucible_types::ToolCallRequest;

use crate::call::{ToolCall, ToolCallResponse};
use crate::modify::{EditorProvider, NoEditor, apply_inline_modification, run_editor_flow};
use crate::response::encode_response_parts;
use crate::telemetry::{CallMetric, NoopTelemetry, TelemetrySink};

/// Minimum interval between live-output snapshot publications.
pub(crate) const LIVE_OUTPUT_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

const LIVE_OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Invoked with a full batch snapshot on every state change.
pub type UpdateHandler = Arc<dyn Fn(&[ToolCall]) + Send + Sync>;

/// Invoked exactly once per batch, when every call is terminal.
pub type CompletionHandler = Arc<dyn Fn(Vec<ToolCall>) + Send + Sync>;

/// Scheduler misuse errors. Per-call failures are never surfaced here.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("a tool call batch is already in flight")]
    BatchInFlight,
}

struct Batch {
    calls: Vec<ToolCall>,
    token: CancellationToken,
    /// Cancelled when the batch completes; stops the abort watcher.
    done: CancellationToken,
}

pub(crate) struct Inner {
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) allowlist: Arc<AllowlistStore>,
    pub(crate) editor: Arc<dyn EditorProvider>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) on_update: UpdateHandler,
    pub(crate) on_complete: CompletionHandler,
    batch: Mutex<Option<Batch>>,
}

/// Schedules one batch of tool calls at a time.
///
/// Holds no call state beyond the lifetime of the current batch; once
/// the completion handler has consumed the calls, the scheduler is
/// ready for the next batch.
#[derive(Clone)]
pub struct ToolScheduler {
    inner: Arc<Inner>,
}

/// Builder for [`ToolScheduler`] collaborators.
pub struct ToolSchedulerBuilder {
    registry: Arc<ToolRegistry>,
    on_update: UpdateHandler,
    on_complete: CompletionHandler,
    editor: Arc<dyn EditorProvider>,
    telemetry: Arc<dyn TelemetrySink>,
    allowlist: Arc<AllowlistStore>,
}

impl ToolSchedulerBuilder {
    /// Source of the preferred interactive editor for `ModifyWithEditor`.
    #[must_use]
    pub fn editor(mut self, editor: Arc<dyn EditorProvider>) -> Self {
        self.editor = editor;
        self
    }

    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Session-scoped allowlist shared with the tools' bookkeeping.
    #[must_use]
    pub fn allowlist(mut self, allowlist: Arc<AllowlistStore>) -> Self {
        self.allowlist = allowlist;
        self
    }

    #[must_use]
    pub fn build(self) -> ToolScheduler {
        ToolScheduler {
            inner: Arc::new(Inner {
                registry: self.registry,
                allowlist: self.allowlist,
                editor: self.editor,
                telemetry: self.telemetry,
                on_update: self.on_update,
                on_complete: self.on_complete,
                batch: Mutex::new(None),
            }),
        }
    }
}

impl ToolScheduler {
    /// Create a scheduler with default collaborators (no editor, no
    /// telemetry, a fresh allowlist).
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        on_update: UpdateHandler,
        on_complete: CompletionHandler,
    ) -> Self {
        Self::builder(registry, on_update, on_complete).build()
    }

    #[must_use]
    pub fn builder(
        registry: Arc<ToolRegistry>,
        on_update: UpdateHandler,
        on_complete: CompletionHandler,
    ) -> ToolSchedulerBuilder {
        ToolSchedulerBuilder {
            registry,
            on_update,
            on_complete,
            editor: Arc::new(NoEditor),
            telemetry: Arc::new(NoopTelemetry),
            allowlist: Arc::new(AllowlistStore::new()),
        }
    }

    /// Schedule a batch of tool call requests.
    ///
    /// Each request is resolved, validated, and confirmation-checked by
    /// its own worker; auto-approved calls execute concurrently. An
    /// empty batch is already complete: the completion handler still
    /// fires, once, with an empty snapshot.
    pub fn schedule(
        &self,
        requests: Vec<ToolCallRequest>,
        token: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        let inner = &self.inner;
        if requests.is_empty() {
            if inner.lock_batch().is_some() {
                return Err(SchedulerError::BatchInFlight);
            }
            (inner.on_complete)(Vec::new());
            return Ok(());
        }

        let done = CancellationToken::new();
        {
            let mut slot = inner.lock_batch();
            if slot.is_some() {
                return Err(SchedulerError::BatchInFlight);
            }
            let calls = requests
                .iter()
                .cloned()
                .map(ToolCall::validating)
                .collect();
            *slot = Some(Batch {
                calls,
                token: token.clone(),
                done: done.clone(),
            });
        }
        debug!(count = requests.len(), "scheduling tool call batch");
        inner.publish();

        // Calls parked in AwaitingApproval have no worker; adopt them if
        // the batch is aborted so the batch still completes.
        {
            let watcher = Arc::clone(inner);
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = done.cancelled() => {}
                    () = token.cancelled() => watcher.cancel_parked_calls(),
                }
            });
        }

        for request in requests {
            let worker = Arc::clone(inner);
            let token = token.clone();
            tokio::spawn(async move { worker.run_call(request, token).await });
        }
        Ok(())
    }

    /// Deliver the user's decision for a call in `AwaitingApproval`.
    ///
    /// A no-op (with a warning) for calls that are not awaiting
    /// approval - already resolved, cancelled, or unknown.
    pub async fn handle_confirmation_response(
        &self,
        call_id: &str,
        outcome: ConfirmationOutcome,
        payload: Option<ConfirmationPayload>,
    ) {
        let inner = &self.inner;
        let parked = {
            let slot = inner.lock_batch();
            slot.as_ref().and_then(|batch| {
                batch.calls.iter().find_map(|call| match call {
                    ToolCall::AwaitingApproval {
                        request,
                        tool,
                        confirmation,
                    } if request.call_id == call_id => Some((
                        request.clone(),
                        Arc::clone(tool),
                        confirmation.clone(),
                        batch.token.clone(),
                    )),
                    _ => None,
                })
            })
        };
        let Some((request, tool, confirmation, token)) = parked else {
            warn!(
                call_id,
                ?outcome,
                "confirmation response for a call that is not awaiting approval"
            );
            return;
        };

        // Tool-side bookkeeping (e.g. adding a root command to the
        // session allowlist) happens before the scheduler acts.
        tool.record_decision(&request.args, outcome, &inner.allowlist);

        match outcome {
            ConfirmationOutcome::Cancel => {
                let response = ToolCallResponse::rejected(&request.name, call_id);
                inner.telemetry.record(CallMetric {
                    tool_name: request.name.clone(),
                    call_id: call_id.to_string(),
                    duration: None,
                    success: false,
                    outcome: Some(outcome),
                });
                inner.transition(
                    call_id,
                    ToolCall::Error {
                        request,
                        tool: Some(tool),
                        response,
                        started_at: None,
                        finished_at: Instant::now(),
                    },
                );
            }
            ConfirmationOutcome::ModifyWithEditor => {
                run_editor_flow(inner, &request, &tool, &confirmation).await;
            }
            _ => {
                let request = match payload.and_then(|p| p.new_content) {
                    Some(new_content) => {
                        match apply_inline_modification(
                            &request,
                            tool.as_ref(),
                            &confirmation,
                            &new_content,
                        ) {
                            Ok(updated) => updated,
                            Err(err) => {
                                inner.finish_error(&request, Some(tool), &err.to_string());
                                return;
                            }
                        }
                    }
                    None => request,
                };
                // Claim the call before spawning; a duplicated decision
                // delivery then finds it no longer parked and is a no-op.
                if !inner.claim_approved(call_id, &request, &tool) {
                    warn!(call_id, ?outcome, "confirmation decision already consumed");
                    return;
                }
                let inner = Arc::clone(inner);
                tokio::spawn(async move {
                    inner.execute_call(request, tool, token, Some(outcome)).await;
                });
            }
        }
    }
}

impl Inner {
    fn lock_batch(&self) -> MutexGuard<'_, Option<Batch>> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let snapshot = self.lock_batch().as_ref().map(|b| b.calls.clone());
        if let Some(snapshot) = snapshot {
            (self.on_update)(&snapshot);
        }
    }

    /// Replace a call's state, publish the new snapshot, and fire the
    /// completion handler if this was the batch's last open call.
    ///
    /// Returns whether the transition was applied; transitions out of a
    /// terminal state are ignored.
    pub(crate) fn transition(&self, call_id: &str, next: ToolCall) -> bool {
        let (snapshot, finished) = {
            let mut slot = self.lock_batch();
            let Some(batch) = slot.as_mut() else {
                return false;
            };
            let Some(call) = batch.calls.iter_mut().find(|c| c.call_id() == call_id) else {
                warn!(call_id, "state transition for unknown call");
                return false;
            };
            if call.is_terminal() {
                debug!(
                    call_id,
                    from = call.status_name(),
                    to = next.status_name(),
                    "ignoring transition out of terminal state"
                );
                return false;
            }
            debug!(
                call_id,
                from = call.status_name(),
                to = next.status_name(),
                "tool call transition"
            );
            *call = next;
            let snapshot = batch.calls.clone();
            let finished = if batch.calls.iter().all(ToolCall::is_terminal) {
                batch.done.cancel();
                slot.take().map(|b| b.calls)
            } else {
                None
            };
            (snapshot, finished)
        };
        (self.on_update)(&snapshot);
        if let Some(calls) = finished {
            debug!(count = calls.len(), "tool call batch complete");
            (self.on_complete)(calls);
        }
        true
    }

    /// Atomically move a parked call to `Scheduled` on an approval.
    ///
    /// Returns false when the call is no longer awaiting approval, so a
    /// duplicated decision delivery cannot start a second execution.
    fn claim_approved(
        &self,
        call_id: &str,
        request: &ToolCallRequest,
        tool: &Arc<dyn Tool>,
    ) -> bool {
        let snapshot = {
            let mut slot = self.lock_batch();
            let Some(batch) = slot.as_mut() else {
                return false;
            };
            let Some(call) = batch.calls.iter_mut().find(|c| c.call_id() == call_id) else {
                return false;
            };
            if !matches!(call, ToolCall::AwaitingApproval { .. }) {
                return false;
            }
            debug!(call_id, "approved tool call claimed for execution");
            *call = ToolCall::Scheduled {
                request: request.clone(),
                tool: Arc::clone(tool),
            };
            batch.calls.clone()
        };
        (self.on_update)(&snapshot);
        true
    }

    /// Park a validated call until a confirmation decision arrives.
    ///
    /// The token check happens under the batch lock, so a confirmation
    /// probe that outlives the abort sweep still terminates `Cancelled`
    /// instead of parking a call nobody will ever resolve.
    fn park_awaiting(
        &self,
        request: ToolCallRequest,
        tool: Arc<dyn Tool>,
        confirmation: ConfirmationDetails,
        token: &CancellationToken,
    ) {
        let snapshot = {
            let mut slot = self.lock_batch();
            if token.is_cancelled() {
                None
            } else {
                let Some(batch) = slot.as_mut() else { return };
                let Some(call) = batch
                    .calls
                    .iter_mut()
                    .find(|c| c.call_id() == request.call_id)
                else {
                    return;
                };
                if call.is_terminal() {
                    return;
                }
                debug!(call_id = %request.call_id, "tool call awaiting approval");
                *call = ToolCall::AwaitingApproval {
                    request: request.clone(),
                    tool: Arc::clone(&tool),
                    confirmation,
                };
                Some(batch.calls.clone())
            }
        };
        match snapshot {
            Some(snapshot) => (self.on_update)(&snapshot),
            None => self.finish_cancelled(
                &request,
                Some(tool),
                "Batch was cancelled during the confirmation check",
            ),
        }
    }

    fn update_live_output(&self, call_id: &str, output: &str) {
        let snapshot = {
            let mut slot = self.lock_batch();
            let Some(batch) = slot.as_mut() else { return };
            let Some(call) = batch.calls.iter_mut().find(|c| c.call_id() == call_id) else {
                return;
            };
            let ToolCall::Executing { live_output, .. } = call else {
                return;
            };
            *live_output = Some(output.to_string());
            batch.calls.clone()
        };
        (self.on_update)(&snapshot);
    }

    /// One worker per request: lookup, validate, confirmation-check,
    /// then execute or park.
    async fn run_call(self: Arc<Self>, request: ToolCallRequest, token: CancellationToken) {
        let call_id = request.call_id.clone();

        let Some(tool) = self.registry.get(&request.name) else {
            let message = ToolError::NotFound {
                name: request.name.clone(),
            }
            .to_string();
            self.finish_error(&request, None, &message);
            return;
        };

        if let Err(err) = tool.validate_params(&request.args) {
            self.finish_error(&request, Some(tool), &err.to_string());
            return;
        }

        if token.is_cancelled() {
            self.finish_cancelled(
                &request,
                Some(tool),
                "Batch was cancelled before the call could start",
            );
            return;
        }

        let confirmation = match tool.should_confirm(&request.args, &token).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                self.finish_error(&request, Some(tool), &err.to_string());
                return;
            }
        };

        match confirmation {
            Some(details) => {
                // Parked until handle_confirmation_response delivers a
                // decision; execution must not start before then.
                self.park_awaiting(request, tool, details, &token);
            }
            None => {
                if !self.transition(
                    &call_id,
                    ToolCall::Scheduled {
                        request: request.clone(),
                        tool: Arc::clone(&tool),
                    },
                ) {
                    return;
                }
                self.execute_call(request, tool, token, None).await;
            }
        }
    }

    /// Run the tool, streaming live output, and settle the terminal
    /// state. Never invoked with a signalled token.
    pub(crate) async fn execute_call(
        self: &Arc<Self>,
        request: ToolCallRequest,
        tool: Arc<dyn Tool>,
        token: CancellationToken,
        outcome: Option<ConfirmationOutcome>,
    ) {
        let call_id = request.call_id.clone();

        if token.is_cancelled() {
            self.finish_cancelled(
                &request,
                Some(tool),
                "Batch was cancelled before execution started",
            );
            return;
        }

        let started_at = Instant::now();
        if !self.transition(
            &call_id,
            ToolCall::Executing {
                request: request.clone(),
                tool: Arc::clone(&tool),
                started_at,
                live_output: None,
            },
        ) {
            return;
        }

        let (tx, rx) = mpsc::channel::<OutputChunk>(LIVE_OUTPUT_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_live_output(Arc::clone(self), call_id.clone(), rx));

        let mut ctx = ToolCtx::new(call_id.clone(), token.clone()).with_output(tx);
        let result = tool.execute(request.args.clone(), &mut ctx).await;
        // Close the output channel so the forwarder drains and exits.
        drop(ctx);
        let _ = forwarder.await;

        let duration = started_at.elapsed();
        match result {
            Ok(result) => {
                let parts = encode_response_parts(&request.name, &call_id, result.llm_content);
                let response = ToolCallResponse {
                    call_id: call_id.clone(),
                    parts,
                    display: result.display,
                    error: None,
                };
                self.telemetry.record(CallMetric {
                    tool_name: request.name.clone(),
                    call_id: call_id.clone(),
                    duration: Some(duration),
                    success: true,
                    outcome,
                });
                self.transition(
                    &call_id,
                    ToolCall::Success {
                        request,
                        tool,
                        response,
                        started_at,
                        finished_at: Instant::now(),
                    },
                );
            }
            Err(err) => {
                let message = err.to_string();
                let response = ToolCallResponse::error(&request.name, &call_id, &message);
                self.telemetry.record(CallMetric {
                    tool_name: request.name.clone(),
                    call_id: call_id.clone(),
                    duration: Some(duration),
                    success: false,
                    outcome,
                });
                self.transition(
                    &call_id,
                    ToolCall::Error {
                        request,
                        tool: Some(tool),
                        response,
                        started_at: Some(started_at),
                        finished_at: Instant::now(),
                    },
                );
            }
        }
    }

    pub(crate) fn finish_error(
        &self,
        request: &ToolCallRequest,
        tool: Option<Arc<dyn Tool>>,
        message: &str,
    ) {
        let response = ToolCallResponse::error(&request.name, &request.call_id, message);
        self.telemetry.record(CallMetric {
            tool_name: request.name.clone(),
            call_id: request.call_id.clone(),
            duration: None,
            success: false,
            outcome: None,
        });
        self.transition(
            &request.call_id,
            ToolCall::Error {
                request: request.clone(),
                tool,
                response,
                started_at: None,
                finished_at: Instant::now(),
            },
        );
    }

    fn finish_cancelled(
        &self,
        request: &ToolCallRequest,
        tool: Option<Arc<dyn Tool>>,
        reason: &str,
    ) {
        let message = format!("[Operation Cancelled] {reason}");
        let response = ToolCallResponse::error(&request.name, &request.call_id, &message);
        self.telemetry.record(CallMetric {
            tool_name: request.name.clone(),
            call_id: request.call_id.clone(),
            duration: None,
            success: false,
            outcome: None,
        });
        self.transition(
            &request.call_id,
            ToolCall::Cancelled {
                request: request.clone(),
                tool,
                response,
                reason: reason.to_string(),
            },
        );
    }

    /// Resolve every call parked in `AwaitingApproval` after the batch
    /// token fires. Worker-owned states observe the token themselves.
    fn cancel_parked_calls(&self) {
        let parked: Vec<(ToolCallRequest, Arc<dyn Tool>)> = {
            let slot = self.lock_batch();
            let Some(batch) = slot.as_ref() else { return };
            batch
                .calls
                .iter()
                .filter_map(|call| match call {
                    ToolCall::AwaitingApproval { request, tool, .. } => {
                        Some((request.clone(), Arc::clone(tool)))
                    }
                    _ => None,
                })
                .collect()
        };
        for (request, tool) in parked {
            self.finish_cancelled(
                &request,
                Some(tool),
                "Batch was cancelled while awaiting approval",
            );
        }
    }
}

/// Drain a tool's live output, republishing the accumulated text at
/// most once per [`LIVE_OUTPUT_INTERVAL`]. Whatever accumulated by
/// completion is always delivered in full.
async fn forward_live_output(
    inner: Arc<Inner>,
    call_id: String,
    mut rx: mpsc::Receiver<OutputChunk>,
) {
    let mut accumulated = String::new();
    let mut last_publish: Option<Instant> = None;
    while let Some(chunk) = rx.recv().await {
        accumulated.push_str(&chunk.chunk);
        if last_publish.is_none_or(|t| t.elapsed() >= LIVE_OUTPUT_INTERVAL) {
            inner.update_live_output(&call_id, &accumulated);
            last_publish = Some(Instant::now());
        }
    }
    if !accumulated.is_empty() {
        inner.update_live_output(&call_id, &accumulated);
    }
}

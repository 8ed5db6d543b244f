//! Fire-and-forget metric counters for tool calls.
//!
//! Sinks must never block or fail the scheduling flow; a slow or broken
//! sink is a defect in the sink, not something the scheduler absorbs.

use std::time::Duration;

use crucible_tools::ConfirmationOutcome;

/// One terminal tool call, as seen by the metrics layer.
#[derive(Debug, Clone)]
pub struct CallMetric {
    pub tool_name: String,
    pub call_id: String,
    /// Execution wall time; `None` when the call never executed.
    pub duration: Option<Duration>,
    pub success: bool,
    /// The confirmation decision, when the call went through one.
    pub outcome: Option<ConfirmationOutcome>,
}

/// Session/telemetry sink for per-call counters.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, metric: CallMetric);
}

/// Discards every metric.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _metric: CallMetric) {}
}

/// Emits each metric as a `tracing` event.
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, metric: CallMetric) {
        tracing::debug!(
            tool = %metric.tool_name,
            call_id = %metric.call_id,
            duration_ms = metric.duration.map(|d| d.as_millis() as u64),
            success = metric.success,
            outcome = ?metric.outcome,
            "tool call finished"
        );
    }
}

//! Tool call scheduling for Crucible.
//!
//! Takes the batch of function calls a model emits in one turn and
//! drives each call through validation, user confirmation, concurrent
//! execution, and response encoding. The conversation layer observes
//! progress through an update handler and collects the finished batch
//! through a completion handler; per-call failures are folded into the
//! calls themselves rather than surfaced as scheduler errors.

mod call;
mod modify;
mod response;
mod scheduler;
mod telemetry;

pub use call::{REJECTION_MESSAGE, ToolCall, ToolCallResponse};
pub use modify::{EditorProvider, NoEditor};
pub use response::{
    EXECUTION_SUCCEEDED_MESSAGE, binary_ack, encode_error_part, encode_response_parts,
};
pub use scheduler::{
    CompletionHandler, SchedulerError, ToolScheduler, ToolSchedulerBuilder, UpdateHandler,
};
pub use telemetry::{CallMetric, NoopTelemetry, TelemetrySink, TracingTelemetry};

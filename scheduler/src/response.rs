//! Response encoding - reshapes a tool's raw result into the
//! function-response parts the conversation layer sends back to the
//! model.
//!
//! Pure: no side effects, deterministic for every content shape.

use crucible_types::{FunctionResponsePayload, LlmContent, Part};

/// Generic envelope text for results that cannot be summarized inline.
pub const EXECUTION_SUCCEEDED_MESSAGE: &str = "Tool execution succeeded.";

/// Acknowledgement text emitted alongside a binary part.
#[must_use]
pub fn binary_ack(mime_type: &str) -> String {
    format!("Binary content of type {mime_type} was processed.")
}

fn output_part(tool_name: &str, call_id: &str, output: impl Into<String>) -> Part {
    Part::function_response(call_id, tool_name, FunctionResponsePayload::output(output))
}

/// Build the function-response part for a failed call.
#[must_use]
pub fn encode_error_part(tool_name: &str, call_id: &str, message: &str) -> Part {
    Part::function_response(call_id, tool_name, FunctionResponsePayload::error(message))
}

/// Normalize a tool's raw content into model-consumable parts.
///
/// The first part is always the function-response envelope; binary
/// content follows byte-for-byte unchanged as separate parts.
#[must_use]
pub fn encode_response_parts(tool_name: &str, call_id: &str, content: LlmContent) -> Vec<Part> {
    match content {
        // A bare string is the output verbatim, empty string included.
        LlmContent::Text(text) => vec![output_part(tool_name, call_id, text)],
        LlmContent::Part(part) => encode_single(tool_name, call_id, part),
        LlmContent::Parts(mut parts) => match parts.len() {
            0 => vec![output_part(tool_name, call_id, EXECUTION_SUCCEEDED_MESSAGE)],
            1 => encode_single(tool_name, call_id, parts.remove(0)),
            _ => {
                // Mixed or multi-part content: generic envelope, then
                // every original part in order.
                let mut out = Vec::with_capacity(parts.len() + 1);
                out.push(output_part(tool_name, call_id, EXECUTION_SUCCEEDED_MESSAGE));
                out.extend(parts);
                out
            }
        },
    }
}

fn encode_single(tool_name: &str, call_id: &str, part: Part) -> Vec<Part> {
    if let Some(text) = part.as_text() {
        return vec![output_part(tool_name, call_id, text)];
    }
    if let Some(mime_type) = part.binary_mime_type() {
        let ack = binary_ack(mime_type);
        return vec![output_part(tool_name, call_id, ack), part];
    }
    // Neither text nor binary (e.g. a nested function response): the
    // generic envelope stands alone.
    vec![output_part(tool_name, call_id, EXECUTION_SUCCEEDED_MESSAGE)]
}

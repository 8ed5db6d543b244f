//! Shared data model for Crucible - tool-call requests, content parts,
//! and the function-response envelope.
//!
//! Everything here serializes in the provider wire casing (`inlineData`,
//! `mimeType`, ...) so parts round-trip byte-for-byte between the model
//! layer and the scheduler.

use serde::{Deserialize, Serialize};

/// One model-issued request to invoke a tool.
///
/// Immutable once created. `call_id` uniquely identifies the invocation
/// within its batch (not globally) and round-trips unchanged into the
/// final function response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    /// Identifier used to match the response back to this call.
    pub call_id: String,
    /// The name of the tool being called.
    pub name: String,
    /// The arguments to pass to the tool, as parsed JSON.
    pub args: serde_json::Value,
    /// Whether the request originated from the client rather than the model.
    #[serde(default)]
    pub is_client_initiated: bool,
    /// Identifier of the prompt that produced this request.
    #[serde(default)]
    pub prompt_id: String,
}

impl ToolCallRequest {
    /// Create a new model-initiated request.
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
            is_client_initiated: false,
            prompt_id: String::new(),
        }
    }

    #[must_use]
    pub fn with_prompt_id(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = prompt_id.into();
        self
    }

    /// Replace the arguments, keeping everything else.
    ///
    /// Used when an inline-edit confirmation rewrites the proposed args;
    /// the original request object is never mutated in place.
    #[must_use]
    pub fn with_args(&self, args: serde_json::Value) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }
}

/// Inline binary data (base64 payload plus mime type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// Reference to externally stored binary data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// Payload of a function response: either successful output or an error
/// message. Serializes as `{"output": ...}` / `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionResponsePayload {
    Output { output: String },
    Error { error: String },
}

impl FunctionResponsePayload {
    #[must_use]
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output {
            output: text.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// The model-facing envelope summarizing one tool call's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    /// The `call_id` of the request this responds to.
    pub id: String,
    /// The tool name (providers require it to match the call).
    pub name: String,
    pub response: FunctionResponsePayload,
}

/// One content block exchanged with the model.
///
/// Untagged: the JSON shape is distinguished by which field is present,
/// matching the provider wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    Text {
        text: String,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    #[must_use]
    pub fn file_data(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self::FileData {
            file_data: FileData {
                mime_type: mime_type.into(),
                file_uri: file_uri.into(),
            },
        }
    }

    #[must_use]
    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: FunctionResponsePayload,
    ) -> Self {
        Self::FunctionResponse {
            function_response: FunctionResponse {
                id: id.into(),
                name: name.into(),
                response,
            },
        }
    }

    /// The text of a pure-text part, if this is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Mime type of a binary (inline or file-reference) part.
    #[must_use]
    pub fn binary_mime_type(&self) -> Option<&str> {
        match self {
            Self::InlineData { inline_data } => Some(&inline_data.mime_type),
            Self::FileData { file_data } => Some(&file_data.mime_type),
            _ => None,
        }
    }
}

/// Raw content a tool hands back: a bare string, a single part, or a
/// list of parts mixing text and binary data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    Part(Part),
    Parts(Vec<Part>),
}

impl From<String> for LlmContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for LlmContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Part> for LlmContent {
    fn from(part: Part) -> Self {
        Self::Part(part)
    }
}

impl From<Vec<Part>> for LlmContent {
    fn from(parts: Vec<Part>) -> Self {
        Self::Parts(parts)
    }
}

/// The result of executing a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Content destined for the model, normalized later by the
    /// response encoder.
    pub llm_content: LlmContent,
    /// Optional human-readable summary for the UI layer.
    pub display: Option<String>,
}

impl ToolResult {
    /// Create a text-only result.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            llm_content: LlmContent::Text(content.into()),
            display: None,
        }
    }

    #[must_use]
    pub fn new(llm_content: impl Into<LlmContent>) -> Self {
        Self {
            llm_content: llm_content.into(),
            display: None,
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{FunctionResponsePayload, LlmContent, Part, ToolCallRequest};

    #[test]
    fn text_part_serializes_flat() {
        let part = Part::text("hello");
        assert_eq!(serde_json::to_value(&part).unwrap(), json!({"text": "hello"}));
    }

    #[test]
    fn inline_data_uses_wire_casing() {
        let part = Part::inline_data("image/png", "abc");
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"inlineData": {"mimeType": "image/png", "data": "abc"}})
        );
    }

    #[test]
    fn function_response_payload_shapes() {
        let ok = FunctionResponsePayload::output("done");
        let err = FunctionResponsePayload::error("boom");
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"output": "done"}));
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({"error": "boom"}));
        assert!(!ok.is_error());
        assert!(err.is_error());
    }

    #[test]
    fn part_deserializes_by_field_presence() {
        let part: Part =
            serde_json::from_value(json!({"inlineData": {"mimeType": "image/jpeg", "data": "d"}}))
                .unwrap();
        assert_eq!(part.binary_mime_type(), Some("image/jpeg"));

        let part: Part = serde_json::from_value(json!({"text": "hi"})).unwrap();
        assert_eq!(part.as_text(), Some("hi"));
    }

    #[test]
    fn llm_content_untagged_roundtrip() {
        let content: LlmContent = serde_json::from_value(json!("bare string")).unwrap();
        assert_eq!(content, LlmContent::Text("bare string".to_string()));

        let content: LlmContent =
            serde_json::from_value(json!([{"text": "a"}, {"text": "b"}])).unwrap();
        assert_eq!(
            content,
            LlmContent::Parts(vec![Part::text("a"), Part::text("b")])
        );
    }

    #[test]
    fn with_args_preserves_identity() {
        let request = ToolCallRequest::new("call-1", "edit", json!({"path": "a.txt"}))
            .with_prompt_id("prompt-9");
        let rewritten = request.with_args(json!({"path": "b.txt"}));
        assert_eq!(rewritten.call_id, "call-1");
        assert_eq!(rewritten.prompt_id, "prompt-9");
        assert_eq!(rewritten.args, json!({"path": "b.txt"}));
        // Original untouched.
        assert_eq!(request.args, json!({"path": "a.txt"}));
    }
}

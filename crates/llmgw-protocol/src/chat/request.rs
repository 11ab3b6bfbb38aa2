use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::types::{
    ChatMessage, ResponseFormat, StreamOptions, ToolChoice, ToolDefinition,
};
use crate::setting::Setting;

/// The canonical chat-completion request. Every transport surface translates
/// into this shape, and this shape is what gets serialized toward an
/// OpenAI-compatible upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Absent, explicit null, and set are all meaningful upstream.
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub seed: Setting<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<BTreeMap<String, i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub tool_choice: Setting<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub stream_options: Setting<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            top_p: None,
            n: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            seed: Setting::Unset,
            logit_bias: None,
            logprobs: None,
            top_logprobs: None,
            user: None,
            tools: None,
            tool_choice: Setting::Unset,
            response_format: None,
            stream: None,
            stream_options: Setting::Unset,
            parallel_tool_calls: None,
        }
    }

    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Up to 4 stop sequences are allowed upstream, but this limit is not
/// enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopConfiguration {
    Single(String),
    Many(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::UserContent;

    #[test]
    fn minimal_request_round_trips() {
        let req = ChatCompletionRequest::new(
            "gpt-4o",
            vec![ChatMessage::User {
                content: UserContent::Text("hi".to_string()),
                name: None,
            }],
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("seed"));
        assert!(!json.contains("tool_choice"));

        let back: ChatCompletionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn explicit_null_seed_survives() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"m","messages":[],"seed":null}"#,
        )
        .unwrap();
        assert!(req.seed.is_null());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""seed":null"#));
    }
}

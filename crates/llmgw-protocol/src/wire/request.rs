use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::setting::Setting;
use crate::wire::types::{
    WireChatMessage, WireResponseFormat, WireStreamOptions, WireToolDefinition,
};

/// RPC request for both the unary and the server-streaming call; the stream
/// variant differs only in carrying `stream_options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub seed: Setting<i64>,
    /// 64-bit on the wire; narrowed when canonicalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireToolDefinition>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub tool_choice: Setting<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<WireResponseFormat>,
    #[serde(default, skip_serializing_if = "Setting::is_unset")]
    pub stream_options: Setting<WireStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

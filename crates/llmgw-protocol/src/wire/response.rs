use serde::{Deserialize, Serialize};

use crate::wire::types::{WireChatMessage, WireFinishReason, WireUsage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<WireChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<WireUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireChoice {
    pub index: i64,
    pub message: WireChatMessage,
    pub finish_reason: WireFinishReason,
}

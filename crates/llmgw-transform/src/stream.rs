use std::collections::BTreeMap;

use llmgw_protocol::chat::response::{ChatChoice, ChatCompletionResponse, ResponseMessage};
use llmgw_protocol::chat::stream::ChatCompletionChunk;
use llmgw_protocol::chat::types::{
    CompletionUsage, FinishReason, FunctionCall, ToolCall, ToolCallKind,
};
use llmgw_protocol::wire::{
    WireChunk, WireChunkChoice, WireChunkDelta, WireFunctionCall, WireToolCallDelta, WireUsage,
};

use crate::response::finish_reason_to_wire;

pub fn chunk_to_wire(chunk: &ChatCompletionChunk) -> WireChunk {
    WireChunk {
        id: chunk.id.clone(),
        object: chunk.object.clone(),
        created: chunk.created,
        model: chunk.model.clone(),
        choices: chunk
            .choices
            .iter()
            .map(|choice| WireChunkChoice {
                index: choice.index,
                delta: WireChunkDelta {
                    role: choice.delta.role.clone(),
                    content: choice.delta.content.clone(),
                    tool_calls: choice
                        .delta
                        .tool_calls
                        .as_ref()
                        .map(|calls| {
                            calls
                                .iter()
                                .map(|call| WireToolCallDelta {
                                    index: call.index,
                                    id: call.id.clone(),
                                    kind: call.kind.map(|_| "function".to_string()),
                                    function: call.function.as_ref().map(|f| WireFunctionCall {
                                        name: f.name.clone().unwrap_or_default(),
                                        arguments: f.arguments.clone().unwrap_or_default(),
                                    }),
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.map(|r| finish_reason_to_wire(Some(r))),
            })
            .collect(),
        usage: chunk.usage.map(|usage| WireUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
        system_fingerprint: chunk.system_fingerprint.clone(),
    }
}

#[derive(Debug, Default)]
struct ToolCallParts {
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct ChoiceParts {
    role: Option<String>,
    content: String,
    saw_content: bool,
    tool_calls: BTreeMap<i64, ToolCallParts>,
    finish_reason: Option<FinishReason>,
}

/// Folds a chunk stream back into a unary response: text concatenates,
/// tool-call fragments are correlated by index and their arguments
/// concatenate in arrival order.
#[derive(Debug, Default)]
pub struct ChunkAggregator {
    id: String,
    model: String,
    created: i64,
    system_fingerprint: Option<String>,
    usage: Option<CompletionUsage>,
    choices: BTreeMap<i64, ChoiceParts>,
}

impl ChunkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &ChatCompletionChunk) {
        if self.id.is_empty() {
            self.id = chunk.id.clone();
            self.model = chunk.model.clone();
            self.created = chunk.created;
        }
        if chunk.system_fingerprint.is_some() {
            self.system_fingerprint = chunk.system_fingerprint.clone();
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        for choice in &chunk.choices {
            let parts = self.choices.entry(choice.index).or_default();
            if let Some(role) = &choice.delta.role {
                parts.role = Some(role.clone());
            }
            if let Some(content) = &choice.delta.content {
                parts.saw_content = true;
                parts.content.push_str(content);
            }
            if let Some(calls) = &choice.delta.tool_calls {
                for call in calls {
                    let slot = parts.tool_calls.entry(call.index).or_default();
                    if let Some(id) = &call.id {
                        slot.id = Some(id.clone());
                    }
                    if let Some(function) = &call.function {
                        if let Some(name) = &function.name {
                            slot.name.push_str(name);
                        }
                        if let Some(arguments) = &function.arguments {
                            slot.arguments.push_str(arguments);
                        }
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                parts.finish_reason = Some(reason);
            }
        }
    }

    /// The text accumulated so far across all choices, in index order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for parts in self.choices.values() {
            out.push_str(&parts.content);
        }
        out
    }

    pub fn finish(self) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: self.id,
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model,
            choices: self
                .choices
                .into_iter()
                .map(|(index, parts)| ChatChoice {
                    index,
                    message: ResponseMessage {
                        role: parts.role.unwrap_or_else(|| "assistant".to_string()),
                        content: parts.saw_content.then_some(parts.content),
                        tool_calls: if parts.tool_calls.is_empty() {
                            None
                        } else {
                            Some(
                                parts
                                    .tool_calls
                                    .into_values()
                                    .map(|call| ToolCall {
                                        id: call.id.unwrap_or_default(),
                                        kind: ToolCallKind::Function,
                                        function: FunctionCall {
                                            name: call.name,
                                            arguments: call.arguments,
                                        },
                                    })
                                    .collect(),
                            )
                        },
                    },
                    finish_reason: parts.finish_reason,
                })
                .collect(),
            usage: self.usage,
            system_fingerprint: self.system_fingerprint,
        }
    }
}

use llmgw_protocol::Setting;
use llmgw_protocol::chat::request::{ChatCompletionRequest, StopConfiguration};
use llmgw_protocol::chat::types::{
    ChatMessage, ContentPart, FunctionCall, FunctionDefinition, ImageDetail, ImageUrl,
    ResponseFormat, ResponseFormatJsonSchema, StreamOptions, ToolCall, ToolCallKind, ToolChoice,
    ToolDefinition, UserContent,
};
use llmgw_protocol::wire::{
    WireChatCompletionRequest, WireChatMessage, WirePart, WireResponseFormat, WireToolCall,
    WireToolDefinition, WireUserContent,
};

use crate::TransformError;

/// Canonicalizes an RPC request. The unary and server-streaming calls share
/// this translation; `stream` marks which one it came from.
pub fn wire_request_to_chat(
    req: &WireChatCompletionRequest,
    stream: bool,
) -> Result<ChatCompletionRequest, TransformError> {
    let mut out = ChatCompletionRequest::new(
        req.model.clone(),
        req.messages.iter().map(wire_message_to_chat).collect(),
    );

    out.max_tokens = req.max_tokens;
    out.temperature = req.temperature;
    out.top_p = req.top_p;
    out.n = req.n;
    if !req.stop.is_empty() {
        out.stop = Some(StopConfiguration::Many(req.stop.clone()));
    }
    out.presence_penalty = req.presence_penalty;
    out.frequency_penalty = req.frequency_penalty;
    // Absent / null / value all pass through unchanged.
    out.seed = req.seed;
    // Wire carries 64-bit values; the canonical form narrows without a
    // bounds check, as the upstream accepts plain ints.
    out.logit_bias = req.logit_bias.as_ref().map(|bias| {
        bias.iter()
            .map(|(token, value)| (token.clone(), *value as i32))
            .collect()
    });
    out.logprobs = req.logprobs;
    out.top_logprobs = req.top_logprobs;
    out.user = req.user.clone();
    if !req.tools.is_empty() {
        out.tools = Some(req.tools.iter().map(wire_tool_to_chat).collect());
    }
    out.tool_choice = match &req.tool_choice {
        Setting::Unset => Setting::Unset,
        Setting::Null => Setting::Null,
        Setting::Value(value) => Setting::Value(
            serde_json::from_value::<ToolChoice>(value.clone())
                .map_err(TransformError::InvalidToolChoice)?,
        ),
    };
    out.response_format = match &req.response_format {
        None => None,
        Some(format) => Some(wire_response_format_to_chat(format)?),
    };
    out.stream_options = req.stream_options.clone().map(|options| StreamOptions {
        include_usage: options.include_usage,
    });
    out.parallel_tool_calls = req.parallel_tool_calls;
    if stream {
        out.stream = Some(true);
    }

    Ok(out)
}

fn wire_message_to_chat(message: &WireChatMessage) -> ChatMessage {
    match message {
        WireChatMessage::SystemMessage(system) => ChatMessage::System {
            content: system.content.clone(),
            name: system.name.clone(),
        },
        WireChatMessage::UserMessage(user) => ChatMessage::User {
            content: match &user.content {
                Some(WireUserContent::Text { content }) => UserContent::Text(content.clone()),
                Some(WireUserContent::Multi { parts }) => {
                    UserContent::Parts(parts.iter().map(wire_part_to_chat).collect())
                }
                None => UserContent::Text(String::new()),
            },
            name: user.name.clone(),
        },
        WireChatMessage::AssistantMessage(assistant) => ChatMessage::Assistant {
            content: assistant.content.clone(),
            tool_calls: if assistant.tool_calls.is_empty() {
                None
            } else {
                Some(
                    assistant
                        .tool_calls
                        .iter()
                        .map(wire_tool_call_to_chat)
                        .collect(),
                )
            },
            name: assistant.name.clone(),
        },
        WireChatMessage::ToolMessage(tool) => ChatMessage::Tool {
            content: tool.content.clone(),
            tool_call_id: tool.tool_call_id.clone(),
        },
    }
}

fn wire_part_to_chat(part: &WirePart) -> ContentPart {
    match part {
        WirePart::Text { text } => ContentPart::Text { text: text.clone() },
        WirePart::Image { image_url } => ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image_url.url.clone(),
                // Absent detail canonicalizes to auto.
                detail: match image_url.detail.as_deref() {
                    Some("low") => ImageDetail::Low,
                    Some("high") => ImageDetail::High,
                    _ => ImageDetail::Auto,
                },
            },
        },
    }
}

fn wire_tool_call_to_chat(call: &WireToolCall) -> ToolCall {
    ToolCall {
        id: call.id.clone(),
        kind: ToolCallKind::Function,
        function: FunctionCall {
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        },
    }
}

fn wire_tool_to_chat(tool: &WireToolDefinition) -> ToolDefinition {
    ToolDefinition {
        kind: ToolCallKind::Function,
        function: FunctionDefinition {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
        },
    }
}

fn wire_response_format_to_chat(
    format: &WireResponseFormat,
) -> Result<ResponseFormat, TransformError> {
    Ok(match format {
        WireResponseFormat::Text {} => ResponseFormat::Text,
        WireResponseFormat::JsonObject {} => ResponseFormat::JsonObject,
        WireResponseFormat::JsonSchema { json_schema } => ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                name: json_schema.name.clone(),
                description: json_schema.description.clone(),
                // The wire form ships the schema as a JSON-encoded string.
                schema: Some(
                    serde_json::from_str(&json_schema.schema)
                        .map_err(TransformError::InvalidSchema)?,
                ),
                strict: json_schema.strict,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_protocol::wire::{WireImageUrl, WireJsonSchema, WireSystemMessage, WireUserMessage};
    use std::collections::BTreeMap;

    fn minimal_request() -> WireChatCompletionRequest {
        WireChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![WireChatMessage::SystemMessage(WireSystemMessage {
                content: "be brief".to_string(),
                name: None,
            })],
            max_tokens: None,
            temperature: None,
            top_p: None,
            n: None,
            stop: Vec::new(),
            presence_penalty: None,
            frequency_penalty: None,
            seed: Setting::Unset,
            logit_bias: None,
            logprobs: None,
            top_logprobs: None,
            user: None,
            tools: Vec::new(),
            tool_choice: Setting::Unset,
            response_format: None,
            stream_options: Setting::Unset,
            parallel_tool_calls: None,
        }
    }

    #[test]
    fn unset_and_null_seed_are_distinguished() {
        let mut req = minimal_request();
        let chat = wire_request_to_chat(&req, false).unwrap();
        assert!(chat.seed.is_unset());

        req.seed = Setting::Null;
        let chat = wire_request_to_chat(&req, false).unwrap();
        assert!(chat.seed.is_null());

        req.seed = Setting::Value(7);
        let chat = wire_request_to_chat(&req, false).unwrap();
        assert_eq!(chat.seed, Setting::Value(7));
    }

    #[test]
    fn absent_image_detail_defaults_to_auto() {
        let mut req = minimal_request();
        req.messages = vec![WireChatMessage::UserMessage(WireUserMessage {
            content: Some(WireUserContent::Multi {
                parts: vec![
                    WirePart::Text {
                        text: "look".to_string(),
                    },
                    WirePart::Image {
                        image_url: WireImageUrl {
                            url: "https://example.com/x.png".to_string(),
                            detail: None,
                        },
                    },
                ],
            }),
            name: None,
        })];

        let chat = wire_request_to_chat(&req, false).unwrap();
        let ChatMessage::User {
            content: UserContent::Parts(parts),
            ..
        } = &chat.messages[0]
        else {
            panic!("expected multi-part user message");
        };
        let ContentPart::ImageUrl { image_url } = &parts[1] else {
            panic!("expected image part");
        };
        assert_eq!(image_url.detail, ImageDetail::Auto);
    }

    #[test]
    fn logit_bias_narrows_to_platform_int() {
        let mut req = minimal_request();
        let mut bias = BTreeMap::new();
        bias.insert("50256".to_string(), -100i64);
        req.logit_bias = Some(bias);

        let chat = wire_request_to_chat(&req, false).unwrap();
        assert_eq!(chat.logit_bias.unwrap()["50256"], -100i32);
    }

    #[test]
    fn stream_translation_sets_the_stream_flag() {
        let req = minimal_request();
        assert_eq!(wire_request_to_chat(&req, false).unwrap().stream, None);
        assert_eq!(
            wire_request_to_chat(&req, true).unwrap().stream,
            Some(true)
        );
    }

    #[test]
    fn json_schema_string_is_parsed() {
        let mut req = minimal_request();
        req.response_format = Some(WireResponseFormat::JsonSchema {
            json_schema: WireJsonSchema {
                name: "person".to_string(),
                description: None,
                schema: r#"{"type":"object"}"#.to_string(),
                strict: Some(true),
            },
        });

        let chat = wire_request_to_chat(&req, false).unwrap();
        let Some(ResponseFormat::JsonSchema { json_schema }) = chat.response_format else {
            panic!("expected json_schema response format");
        };
        assert_eq!(json_schema.schema.unwrap()["type"], "object");

        req.response_format = Some(WireResponseFormat::JsonSchema {
            json_schema: WireJsonSchema {
                name: "person".to_string(),
                description: None,
                schema: "not json".to_string(),
                strict: None,
            },
        });
        assert!(wire_request_to_chat(&req, false).is_err());
    }
}

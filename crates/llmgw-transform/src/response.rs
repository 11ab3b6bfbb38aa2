use llmgw_protocol::chat::response::{ChatCompletionResponse, ResponseMessage};
use llmgw_protocol::chat::types::FinishReason;
use llmgw_protocol::wire::{
    WireAssistantMessage, WireChatCompletionResponse, WireChatMessage, WireChoice,
    WireFinishReason, WireFunctionCall, WireToolCall, WireUsage,
};

pub fn finish_reason_to_wire(reason: Option<FinishReason>) -> WireFinishReason {
    match reason {
        Some(FinishReason::Stop) => WireFinishReason::Stop,
        Some(FinishReason::Length) => WireFinishReason::Length,
        Some(FinishReason::FunctionCall) => WireFinishReason::FunctionCall,
        Some(FinishReason::ContentFilter) => WireFinishReason::ContentFilter,
        None => WireFinishReason::Null,
    }
}

pub fn wire_finish_reason_to_chat(reason: WireFinishReason) -> Option<FinishReason> {
    match reason {
        WireFinishReason::Stop => Some(FinishReason::Stop),
        WireFinishReason::Length => Some(FinishReason::Length),
        WireFinishReason::FunctionCall => Some(FinishReason::FunctionCall),
        WireFinishReason::ContentFilter => Some(FinishReason::ContentFilter),
        WireFinishReason::Null => None,
    }
}

pub fn chat_response_to_wire(response: &ChatCompletionResponse) -> WireChatCompletionResponse {
    WireChatCompletionResponse {
        id: response.id.clone(),
        object: response.object.clone(),
        created: response.created,
        model: response.model.clone(),
        choices: response
            .choices
            .iter()
            .map(|choice| WireChoice {
                index: choice.index,
                message: response_message_to_wire(&choice.message),
                finish_reason: finish_reason_to_wire(choice.finish_reason),
            })
            .collect(),
        usage: response.usage.map(|usage| WireUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
        system_fingerprint: response.system_fingerprint.clone(),
    }
}

fn response_message_to_wire(message: &ResponseMessage) -> WireChatMessage {
    WireChatMessage::AssistantMessage(WireAssistantMessage {
        content: message.content.clone(),
        name: None,
        tool_calls: message
            .tool_calls
            .as_ref()
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.function.name.clone(),
                            arguments: call.function.arguments.clone(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_maps_one_to_one() {
        let pairs = [
            (Some(FinishReason::Stop), WireFinishReason::Stop),
            (Some(FinishReason::Length), WireFinishReason::Length),
            (
                Some(FinishReason::FunctionCall),
                WireFinishReason::FunctionCall,
            ),
            (
                Some(FinishReason::ContentFilter),
                WireFinishReason::ContentFilter,
            ),
            (None, WireFinishReason::Null),
        ];
        for (chat, wire) in pairs {
            assert_eq!(finish_reason_to_wire(chat), wire);
            assert_eq!(wire_finish_reason_to_chat(wire), chat);
        }
    }
}

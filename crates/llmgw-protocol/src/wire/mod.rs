//! The structured-RPC wire form of the chat-completion surface.
//!
//! These shapes mirror the RPC schema: role variants are an explicit oneof,
//! `logit_bias` values are 64-bit, the response-format schema travels as a
//! JSON-encoded string, and `finish_reason` has an explicit null member.

pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::WireChatCompletionRequest;
pub use response::{WireChatCompletionResponse, WireChoice};
pub use stream::{WireChunk, WireChunkChoice, WireChunkDelta, WireToolCallDelta};
pub use types::{
    WireAssistantMessage, WireChatMessage, WireFinishReason, WireFunctionCall,
    WireFunctionDefinition, WireImageUrl, WireJsonSchema, WirePart, WireResponseFormat,
    WireStreamOptions, WireSystemMessage, WireToolCall, WireToolDefinition, WireToolMessage,
    WireUsage, WireUserContent, WireUserMessage,
};

pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::{ChatCompletionRequest, StopConfiguration};
pub use response::{ChatChoice, ChatCompletionResponse, ResponseMessage};
pub use stream::{ChatCompletionChunk, ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta};
pub use types::{
    ChatMessage, CompletionUsage, ContentPart, FinishReason, FunctionCall, FunctionDefinition,
    ImageDetail, ImageUrl, ResponseFormat, ResponseFormatJsonSchema, StreamOptions, ToolCall,
    ToolCallKind, ToolChoice, ToolChoiceFunction, ToolDefinition, UserContent,
};

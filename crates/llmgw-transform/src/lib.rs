//! Translation between the wire (structured-RPC) chat-completion shapes and
//! the canonical internal model, plus stream-to-unary aggregation.

pub mod request;
pub mod response;
pub mod stream;

pub use request::wire_request_to_chat;
pub use response::{chat_response_to_wire, finish_reason_to_wire, wire_finish_reason_to_chat};
pub use stream::{ChunkAggregator, chunk_to_wire};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid json_schema in response_format: {0}")]
    InvalidSchema(serde_json::Error),
    #[error("invalid tool_choice: {0}")]
    InvalidToolChoice(serde_json::Error),
}

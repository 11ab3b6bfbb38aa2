use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use llmgw_protocol::sse::SseEvent;

/// Headers a transport must set before the first event goes out.
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("event stream closed")]
    Closed,
    #[error("encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Server-sent-event writer over a bounded byte channel; the transport end
/// drains the channel into the client connection, so a slow client
/// back-pressures the producer here.
#[derive(Debug, Clone)]
pub struct EventSource {
    tx: mpsc::Sender<Bytes>,
}

impl EventSource {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    pub async fn send_json<T: Serialize>(&self, message: &T) -> Result<(), EventSourceError> {
        let data = serde_json::to_string(message)?;
        self.write(SseEvent::data(data)).await
    }

    pub async fn send_with_id<T: Serialize>(
        &self,
        id: &str,
        message: &T,
    ) -> Result<(), EventSourceError> {
        let data = serde_json::to_string(message)?;
        self.write(SseEvent::data(data).with_id(id)).await
    }

    pub async fn send_raw(&self, message: &[u8]) -> Result<(), EventSourceError> {
        self.write(SseEvent::data(String::from_utf8_lossy(message).into_owned()))
            .await
    }

    /// Comment record, used as a keep-alive.
    pub async fn send_comment(&self, comment: &str) -> Result<(), EventSourceError> {
        self.write(SseEvent::comment(comment)).await
    }

    async fn write(&self, event: SseEvent) -> Result<(), EventSourceError> {
        let frame = event.encode();
        if frame.is_empty() {
            return Ok(());
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| EventSourceError::Closed)
    }
}

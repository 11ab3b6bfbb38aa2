use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use llmgw_common::{GatewayError, GatewayResult, RequestContext};
use llmgw_directory::{ResolvedEndpoint, Upstream, UpstreamSingleOrMultiple};
use llmgw_protocol::chat::request::ChatCompletionRequest;
use llmgw_protocol::chat::response::ChatCompletionResponse;
use llmgw_protocol::chat::stream::ChatCompletionChunk;
use llmgw_protocol::sse::SseParser;

use crate::upstream_client::{
    HttpMethod, UpstreamBody, UpstreamClient, UpstreamHttpRequest, UpstreamHttpResponse,
};

/// An authenticated caller: the resolved endpoint with its effective
/// upstream(s).
#[derive(Debug, Clone)]
pub struct Credential {
    pub endpoint: ResolvedEndpoint,
}

impl From<ResolvedEndpoint> for Credential {
    fn from(endpoint: ResolvedEndpoint) -> Self {
        Self { endpoint }
    }
}

/// Forwards canonical chat-completion requests to the caller's effective
/// upstream. Selection over a multi-upstream pool is round-robin from a
/// seed; the dispatcher never retries on its own.
pub struct Dispatcher {
    client: Arc<dyn UpstreamClient>,
    rotation: AtomicU64,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self::with_seed(client, rand::random())
    }

    /// Deterministic selection for a given seed: the n-th dispatch picks
    /// `(seed + n) % pool_len`.
    pub fn with_seed(client: Arc<dyn UpstreamClient>, seed: u64) -> Self {
        Self {
            client,
            rotation: AtomicU64::new(seed),
        }
    }

    fn select_upstream<'a>(
        &self,
        pool: &'a UpstreamSingleOrMultiple,
    ) -> GatewayResult<&'a Upstream> {
        let candidates = pool.candidates();
        if candidates.is_empty() {
            return Err(GatewayError::unauthenticated()
                .with_detail("endpoint has no usable upstream")
                .with_caller());
        }
        let slot = self.rotation.fetch_add(1, Ordering::Relaxed) as usize % candidates.len();
        Ok(candidates[slot])
    }

    /// Unary completion against one selected upstream.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        credential: &Credential,
        request: &ChatCompletionRequest,
    ) -> GatewayResult<ChatCompletionResponse> {
        let upstream = self.select_upstream(&credential.endpoint.upstream)?;
        debug!(
            request_id = %ctx.request_id,
            endpoint = %credential.endpoint.id,
            base_url = %upstream.openai.base_url,
            "dispatching completion"
        );
        let http_request = build_http_request(upstream, request, false)?;

        let cancel = ctx.cancellation();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::canceled()),
            response = self.client.send(http_request) => response
                .map_err(|failure| GatewayError::unavailable().with_detail(failure.message))?,
        };

        let UpstreamHttpResponse { status, body, .. } = response;
        let UpstreamBody::Bytes(body) = body else {
            return Err(GatewayError::internal()
                .with_detail("unary call returned a streaming body")
                .with_caller());
        };
        check_status(status, &body)?;

        serde_json::from_slice(&body).map_err(|err| {
            GatewayError::unavailable().with_detail(format!("undecodable upstream response: {err}"))
        })
    }

    /// Streaming completion: upstream SSE frames re-emitted as canonical
    /// chunks, in upstream order, over a bounded channel. Cancelling the
    /// context stops the relay and closes the upstream connection; nothing
    /// is emitted after the cancellation is observed.
    pub async fn complete_stream(
        &self,
        ctx: &RequestContext,
        credential: &Credential,
        request: &ChatCompletionRequest,
    ) -> GatewayResult<mpsc::Receiver<GatewayResult<ChatCompletionChunk>>> {
        let upstream = self.select_upstream(&credential.endpoint.upstream)?;
        debug!(
            request_id = %ctx.request_id,
            endpoint = %credential.endpoint.id,
            base_url = %upstream.openai.base_url,
            "dispatching streaming completion"
        );
        let http_request = build_http_request(upstream, request, true)?;

        let cancel = ctx.cancellation();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::canceled()),
            response = self.client.send(http_request) => response
                .map_err(|failure| GatewayError::unavailable().with_detail(failure.message))?,
        };

        let mut upstream_rx = match response.body {
            UpstreamBody::Bytes(body) => {
                check_status(response.status, &body)?;
                return Err(GatewayError::unavailable()
                    .with_detail("upstream did not open a stream")
                    .with_caller());
            }
            UpstreamBody::Stream(rx) => rx,
        };

        let (tx, rx) = mpsc::channel::<GatewayResult<ChatCompletionChunk>>(16);
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => return,
                    chunk = upstream_rx.recv() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };

                for event in parser.push_bytes(&chunk) {
                    if !relay_event(&tx, event).await {
                        return;
                    }
                }
            }

            for event in parser.finish() {
                if !relay_event(&tx, event).await {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// Forwards one SSE event as a chunk; false means stop the relay (stream
/// terminator seen or the consumer went away).
async fn relay_event(
    tx: &mpsc::Sender<GatewayResult<ChatCompletionChunk>>,
    event: llmgw_protocol::sse::SseEvent,
) -> bool {
    let Some(data) = event.data else {
        return true;
    };
    if data.trim() == "[DONE]" {
        return false;
    }
    match serde_json::from_str::<ChatCompletionChunk>(&data) {
        Ok(chunk) => tx.send(Ok(chunk)).await.is_ok(),
        // Frames that are not chunks (comments, keep-alives) are dropped.
        Err(_) => true,
    }
}

fn build_http_request(
    upstream: &Upstream,
    request: &ChatCompletionRequest,
    stream: bool,
) -> GatewayResult<UpstreamHttpRequest> {
    let mut outbound = request.clone();
    outbound.stream = stream.then_some(true);

    let body = serde_json::to_vec(&outbound).map_err(|err| {
        GatewayError::internal()
            .with_detail(format!("encode upstream request: {err}"))
            .with_caller()
    })?;

    let openai = &upstream.openai;
    let url = format!(
        "{}/chat/completions",
        openai.base_url.trim_end_matches('/')
    );

    let mut headers: Vec<(String, String)> = vec![
        ("content-type".to_string(), "application/json".to_string()),
        (
            "authorization".to_string(),
            format!("Bearer {}", openai.api_key),
        ),
    ];
    if stream {
        headers.push(("accept".to_string(), "text/event-stream".to_string()));
    }
    if let Some(extra) = &openai.extra_headers {
        for (name, value) in extra {
            headers.push((name.clone(), value.clone()));
        }
    }

    Ok(UpstreamHttpRequest {
        method: HttpMethod::Post,
        url,
        headers,
        body: Some(Bytes::from(body)),
        is_stream: stream,
    })
}

/// Upstream 4xx surfaces as invalid-argument with the upstream's message;
/// 5xx as unavailable (retryable at the caller's discretion).
fn check_status(status: u16, body: &[u8]) -> GatewayResult<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let message = String::from_utf8_lossy(body).into_owned();
    if (400..500).contains(&status) {
        return Err(GatewayError::invalid_argument().with_detail(message));
    }
    Err(GatewayError::unavailable().with_detail(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use llmgw_common::ErrorCode;
    use llmgw_directory::{UpstreamOpenAi, UpstreamSingleOrMultiple};
    use llmgw_protocol::chat::types::{ChatMessage, UserContent};

    fn upstream(base_url: &str) -> Upstream {
        Upstream {
            openai: UpstreamOpenAi {
                base_url: base_url.to_string(),
                api_key: "sk-upstream".to_string(),
                weight: None,
                extra_headers: None,
                compatible: Default::default(),
            },
        }
    }

    fn credential(pool: UpstreamSingleOrMultiple) -> Credential {
        Credential {
            endpoint: ResolvedEndpoint {
                tenant_id: "t".to_string(),
                team_id: "m".to_string(),
                group_id: "g".to_string(),
                id: "e".to_string(),
                alias: "a".to_string(),
                api_key: "k".to_string(),
                upstream: pool,
            },
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            "gpt-4o",
            vec![ChatMessage::User {
                content: UserContent::Text("hi".to_string()),
                name: None,
            }],
        )
    }

    enum CannedReply {
        Bytes(u16, &'static str),
        /// SSE frames; `hold_open` keeps the upstream connection alive after
        /// the last frame instead of closing it.
        Stream(Vec<&'static str>, bool),
    }

    struct MockClient {
        reply: CannedReply,
        seen: Mutex<Vec<UpstreamHttpRequest>>,
    }

    impl MockClient {
        fn unary(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: CannedReply::Bytes(status, body),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn stream(frames: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply: CannedReply::Stream(frames, false),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn stream_hold_open(frames: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply: CannedReply::Stream(frames, true),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_url(&self) -> String {
            self.seen.lock().unwrap().last().unwrap().url.clone()
        }

        fn last_header(&self, name: &str) -> Option<String> {
            let seen = self.seen.lock().unwrap();
            let req = seen.last()?;
            req.headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        }
    }

    impl UpstreamClient for MockClient {
        fn send<'a>(
            &'a self,
            req: UpstreamHttpRequest,
        ) -> Pin<
            Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>,
        > {
            Box::pin(async move {
                self.seen.lock().unwrap().push(req);
                match &self.reply {
                    CannedReply::Bytes(status, body) => Ok(UpstreamHttpResponse {
                        status: *status,
                        headers: Vec::new(),
                        body: UpstreamBody::Bytes(Bytes::from_static(body.as_bytes())),
                    }),
                    CannedReply::Stream(frames, hold_open) => {
                        let (tx, rx) = mpsc::channel(16);
                        let frames: Vec<Bytes> = frames
                            .iter()
                            .map(|f| Bytes::from_static(f.as_bytes()))
                            .collect();
                        let hold_open = *hold_open;
                        tokio::spawn(async move {
                            for frame in frames {
                                if tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                            if hold_open {
                                // Simulates an idle upstream; exits when the
                                // relay drops its receiver.
                                tx.closed().await;
                            }
                        });
                        Ok(UpstreamHttpResponse {
                            status: 200,
                            headers: Vec::new(),
                            body: UpstreamBody::Stream(rx),
                        })
                    }
                }
            })
        }
    }

    use crate::upstream_client::UpstreamFailure;

    const UNARY_BODY: &str = r#"{"id":"chatcmpl-1","object":"chat.completion","created":1700000000,"model":"gpt-4o","choices":[{"index":0,"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#;

    #[tokio::test]
    async fn unary_completion_forwards_and_decodes() {
        let client = MockClient::unary(200, UNARY_BODY);
        let dispatcher = Dispatcher::with_seed(client.clone(), 0);
        let credential = credential(UpstreamSingleOrMultiple::single(upstream(
            "https://api.example.com/v1/",
        )));

        let response = dispatcher
            .complete(&RequestContext::new(), &credential, &request())
            .await
            .unwrap();

        assert_eq!(response.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(
            client.last_url(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client.last_header("authorization").as_deref(),
            Some("Bearer sk-upstream")
        );
    }

    #[tokio::test]
    async fn upstream_4xx_maps_to_invalid_argument() {
        let client = MockClient::unary(400, r#"{"error":"bad model"}"#);
        let dispatcher = Dispatcher::with_seed(client, 0);
        let credential = credential(UpstreamSingleOrMultiple::single(upstream("https://u")));

        let err = dispatcher
            .complete(&RequestContext::new(), &credential, &request())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        assert!(err.detail.contains("bad model"));
    }

    #[tokio::test]
    async fn upstream_5xx_maps_to_unavailable() {
        let client = MockClient::unary(503, "upstream down");
        let dispatcher = Dispatcher::with_seed(client, 0);
        let credential = credential(UpstreamSingleOrMultiple::single(upstream("https://u")));

        let err = dispatcher
            .complete(&RequestContext::new(), &credential, &request())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn empty_upstream_pool_is_unauthenticated() {
        let client = MockClient::unary(200, UNARY_BODY);
        let dispatcher = Dispatcher::with_seed(client, 0);
        let credential = credential(UpstreamSingleOrMultiple::default());

        let err = dispatcher
            .complete(&RequestContext::new(), &credential, &request())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn round_robin_is_deterministic_given_seed() {
        let client = MockClient::unary(200, UNARY_BODY);
        let dispatcher = Dispatcher::with_seed(client.clone(), 1);
        let pool = UpstreamSingleOrMultiple::multiple(vec![
            upstream("https://u0"),
            upstream("https://u1"),
            upstream("https://u2"),
        ]);
        let credential = credential(pool);
        let ctx = RequestContext::new();

        let mut picks = Vec::new();
        for _ in 0..4 {
            dispatcher
                .complete(&ctx, &credential, &request())
                .await
                .unwrap();
            picks.push(client.last_url());
        }

        assert_eq!(
            picks,
            vec![
                "https://u1/chat/completions",
                "https://u2/chat/completions",
                "https://u0/chat/completions",
                "https://u1/chat/completions",
            ]
        );
    }

    #[tokio::test]
    async fn stream_reframes_sse_and_stops_at_done() {
        let client = MockClient::stream(vec![
            "data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"He\"}}]}\n\n",
            "data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"llo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let dispatcher = Dispatcher::with_seed(client, 0);
        let credential = credential(UpstreamSingleOrMultiple::single(upstream("https://u")));

        let mut rx = dispatcher
            .complete_stream(&RequestContext::new(), &credential, &request())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.choices[0].delta.content.as_deref(), Some("He"));
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.choices[0].delta.content.as_deref(), Some("llo"));
        // [DONE] closes the stream without another chunk.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn canceled_context_short_circuits() {
        let client = MockClient::unary(200, UNARY_BODY);
        let dispatcher = Dispatcher::with_seed(client, 0);
        let credential = credential(UpstreamSingleOrMultiple::single(upstream("https://u")));

        let ctx = RequestContext::new();
        ctx.cancel();
        let err = dispatcher
            .complete(&ctx, &credential, &request())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Canceled);
    }

    #[tokio::test]
    async fn cancel_mid_stream_stops_emission() {
        let client = MockClient::stream_hold_open(vec![
            "data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n\n",
        ]);
        let dispatcher = Dispatcher::with_seed(client, 0);
        let credential = credential(UpstreamSingleOrMultiple::single(upstream("https://u")));

        let ctx = RequestContext::new();
        let mut rx = dispatcher
            .complete_stream(&ctx, &credential, &request())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.choices[0].delta.content.as_deref(), Some("x"));

        ctx.cancel();
        // After cancellation the relay exits; the stream ends.
        assert!(rx.recv().await.is_none());
    }
}

//! HTTP transport: the OpenAI-compatible chat-completions surface, unary and
//! SSE streaming, with credential extraction and the JSON:API error
//! envelope.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, warn};

use llmgw_common::{GatewayError, RequestContext};
use llmgw_core::eventsource::{EventSource, SSE_HEADERS};
use llmgw_core::{Dispatcher, authenticate, extract_api_key};
use llmgw_directory::EndpointResolver;
use llmgw_protocol::chat::request::ChatCompletionRequest;

#[derive(Clone)]
pub struct GatewayState {
    pub resolver: Arc<dyn EndpointResolver>,
    pub dispatcher: Arc<Dispatcher>,
}

pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .layer(middleware::from_fn(attach_request_context))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Builds the transport-independent request context: credential material,
/// the informational `X-Base-Url`, and a headers snapshot.
async fn attach_request_context(mut req: Request<Body>, next: Next) -> Response {
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let mut ctx = RequestContext::new();
    if let Some(api_key) = extract_api_key(&headers) {
        ctx = ctx.with_api_key(api_key);
    }
    if let Some(base_url) = headers
        .iter()
        .find(|(name, _)| name == "x-base-url")
        .map(|(_, value)| value.clone())
    {
        ctx = ctx.with_base_url_override(base_url);
    }
    ctx = ctx.with_headers(headers);

    req.extensions_mut().insert(ctx);
    next.run(req).await
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("panic on serving path");
    error!(panic = %detail, "request handler panicked");
    // The envelope never carries the panic payload.
    error_response(&GatewayError::internal())
}

fn error_response(err: &GatewayError) -> Response {
    let envelope = err.to_response();
    let status = StatusCode::from_u16(envelope.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(envelope)).into_response()
}

async fn chat_completions(
    State(state): State<GatewayState>,
    req: Request<Body>,
) -> Response {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();

    let body = match axum::body::to_bytes(req.into_body(), 8 * 1024 * 1024).await {
        Ok(body) => body,
        Err(err) => {
            return error_response(
                &GatewayError::invalid_argument().with_detail(format!("read body: {err}")),
            );
        }
    };
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                &GatewayError::invalid_argument()
                    .with_detail(err.to_string())
                    .with_source_pointer("/"),
            );
        }
    };

    let credential = match authenticate(state.resolver.as_ref(), &ctx).await {
        Ok(credential) => credential,
        Err(err) => return error_response(&err),
    };

    if request.wants_stream() {
        return stream_completion(state, ctx, credential, request).await;
    }

    match state.dispatcher.complete(&ctx, &credential, &request).await {
        Ok(response) => axum::Json(response).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn stream_completion(
    state: GatewayState,
    ctx: RequestContext,
    credential: llmgw_core::Credential,
    request: ChatCompletionRequest,
) -> Response {
    let mut chunks = match state
        .dispatcher
        .complete_stream(&ctx, &credential, &request)
        .await
    {
        Ok(chunks) => chunks,
        Err(err) => return error_response(&err),
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let source = EventSource::new(tx);
        while let Some(next) = chunks.recv().await {
            let sent = match next {
                Ok(chunk) => source.send_json(&chunk).await,
                Err(err) => {
                    warn!(request_id = %ctx.request_id, error = %err, "upstream stream failed");
                    let sent = source.send_json(&err.to_response()).await;
                    if sent.is_ok() {
                        break;
                    }
                    sent
                }
            };
            if sent.is_err() {
                // Client went away; stop pulling from the upstream.
                ctx.cancel();
                return;
            }
        }
        let _ = source.send_raw(b"[DONE]").await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>));
    let mut response = Response::new(body);
    for (name, value) in SSE_HEADERS {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use llmgw_core::upstream_client::{
        UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
    };
    use llmgw_directory::{
        Endpoint, Group, Routes, StaticEndpointResolver, Team, Tenant, Upstream, UpstreamOpenAi,
        UpstreamSingleOrMultiple,
    };

    const UNARY_BODY: &str = r#"{"id":"chatcmpl-1","object":"chat.completion","created":1700000000,"model":"gpt-4o","choices":[{"index":0,"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#;

    struct MockClient {
        frames: Option<Vec<&'static str>>,
    }

    impl UpstreamClient for MockClient {
        fn send<'a>(
            &'a self,
            _req: UpstreamHttpRequest,
        ) -> Pin<
            Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>,
        > {
            Box::pin(async move {
                match &self.frames {
                    None => Ok(UpstreamHttpResponse {
                        status: 200,
                        headers: Vec::new(),
                        body: UpstreamBody::Bytes(Bytes::from_static(UNARY_BODY.as_bytes())),
                    }),
                    Some(frames) => {
                        let (tx, rx) = tokio::sync::mpsc::channel(16);
                        let frames: Vec<Bytes> = frames
                            .iter()
                            .map(|f| Bytes::from_static(f.as_bytes()))
                            .collect();
                        tokio::spawn(async move {
                            for frame in frames {
                                if tx.send(frame).await.is_err() {
                                    break;
                                }
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

    fn routes() -> Routes {
        Routes {
            tenants: vec![Tenant {
                id: "t".to_string(),
                upstream: Some(UpstreamSingleOrMultiple::single(Upstream {
                    openai: UpstreamOpenAi {
                        base_url: "https://upstream.example.com/v1".to_string(),
                        api_key: "sk".to_string(),
                        weight: None,
                        extra_headers: None,
                        compatible: Default::default(),
                    },
                })),
                teams: vec![Team {
                    id: "m".to_string(),
                    upstream: None,
                    groups: vec![Group {
                        id: "g".to_string(),
                        upstream: None,
                        groups: Vec::new(),
                        endpoints: vec![Endpoint {
                            id: "e".to_string(),
                            alias: "al".to_string(),
                            api_key: "good-key".to_string(),
                            upstream: None,
                        }],
                    }],
                }],
            }],
        }
    }

    fn app(frames: Option<Vec<&'static str>>) -> Router {
        let state = GatewayState {
            resolver: Arc::new(StaticEndpointResolver::new(routes())),
            dispatcher: Arc::new(Dispatcher::with_seed(Arc::new(MockClient { frames }), 0)),
        };
        gateway_router(state)
    }

    fn completion_request(stream: bool) -> Request<Body> {
        let body = if stream {
            r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}],"stream":true}"#
        } else {
            r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#
        };
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .header("x-api-key", "good-key")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn unary_completion_round_trips() {
        let response = app(None).oneshot(completion_request(false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let decoded: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded["choices"][0]["message"]["content"], "hello");
    }

    #[tokio::test]
    async fn missing_credential_gets_the_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"model":"m","messages":[]}"#))
            .unwrap();

        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let decoded: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded["errors"][0]["code"], "UNAUTHORIZED");
        assert_eq!(decoded["errors"][0]["status"], 401);
        assert_eq!(decoded["errors"][0]["source"]["header"], "X-Api-Key");
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("x-api-key", "nope")
            .body(Body::from(r#"{"model":"m","messages":[]}"#))
            .unwrap();

        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bearer_token_is_accepted() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("authorization", "Bearer good-key")
            .body(Body::from(
                r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .unwrap();

        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_argument() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("x-api-key", "good-key")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let decoded: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded["errors"][0]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn streaming_completion_emits_sse_until_done() {
        let frames = vec![
            "data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
            "data: [DONE]\n\n",
        ];

        let response = app(Some(frames))
            .oneshot(completion_request(true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("data: {"));
        assert!(text.contains("\"content\":\"hi\""));
        assert!(text.trim_end().ends_with("data: [DONE]"));
    }
}

pub mod auth;
pub mod dispatcher;
pub mod eventsource;
pub mod upstream_client;

pub use auth::{authenticate, extract_api_key};
pub use dispatcher::{Credential, Dispatcher};
pub use eventsource::EventSource;
pub use upstream_client::{
    Headers, HttpMethod, UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamFailure,
    UpstreamHttpRequest, UpstreamHttpResponse, WreqUpstreamClient,
};

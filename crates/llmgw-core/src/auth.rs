use llmgw_common::{GatewayError, GatewayResult, RequestContext};
use llmgw_directory::{DirectoryError, EndpointResolver};

use crate::dispatcher::Credential;

/// Pulls the caller's key out of the transport headers. `X-Api-Key` is the
/// preferred form; `Authorization: Bearer` is the fallback.
pub fn extract_api_key(headers: &[(String, String)]) -> Option<String> {
    let lookup = |wanted: &str| {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.trim())
    };

    if let Some(key) = lookup("x-api-key").filter(|key| !key.is_empty()) {
        return Some(key.to_string());
    }

    lookup("authorization")
        .and_then(|value| value.strip_prefix("Bearer ").or(value.strip_prefix("bearer ")))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves the context's api key to a credential. A missing key is
/// unauthenticated; an unknown key is not-found; an endpoint with no
/// upstream anywhere on its path is unauthenticated (present but unusable).
pub async fn authenticate(
    resolver: &dyn EndpointResolver,
    ctx: &RequestContext,
) -> GatewayResult<Credential> {
    let Some(api_key) = ctx.api_key.as_deref().filter(|key| !key.is_empty()) else {
        return Err(GatewayError::unauthenticated()
            .with_source_header("X-Api-Key")
            .with_caller());
    };

    match resolver.find_by_api_key(api_key).await {
        Ok(endpoint) => {
            if endpoint.upstream.is_empty() {
                return Err(GatewayError::unauthenticated()
                    .with_detail("endpoint has no usable upstream")
                    .with_caller());
            }
            Ok(Credential { endpoint })
        }
        Err(DirectoryError::NotFound) => Err(GatewayError::not_found()
            .with_detail("unknown api key")
            .with_caller()),
        Err(err) => Err(GatewayError::unavailable()
            .with_detail(err.to_string())
            .with_caller()),
    }
}

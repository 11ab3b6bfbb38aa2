use tokio_util::sync::CancellationToken;

/// Carries the inbound request's metadata alongside the cancellation handle
/// so the core can read credentials and per-request overrides without
/// depending on any transport framework.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Credential material, already extracted from `X-Api-Key` or
    /// `Authorization: Bearer`.
    pub api_key: Option<String>,
    /// `X-Base-Url` as received. Informational only; upstream selection
    /// never reads it.
    pub base_url_override: Option<String>,
    /// Inbound headers snapshot, lowercased names.
    pub headers: Vec<(String, String)>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            api_key: None,
            base_url_override: None,
            headers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Handle used to abort all downstream work for this request.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Child context sharing the parent's cancellation: canceling the parent
    /// cancels the child, not the other way round.
    pub fn child(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            api_key: self.api_key.clone(),
            base_url_override: self.base_url_override.clone(),
            headers: self.headers.clone(),
            cancel: self.cancel.child_token(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

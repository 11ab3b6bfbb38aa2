use async_trait::async_trait;

use crate::model::ResolvedEndpoint;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Unknown api key or alias, or an endpoint with no usable upstream.
    #[error("endpoint not found")]
    NotFound,
    #[error("directory storage: {0}")]
    Storage(#[from] redis::RedisError),
    #[error("directory decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("directory config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("directory config: {0}")]
    Io(#[from] std::io::Error),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound)
    }
}

/// The one query surface shared by every directory backend.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn find_by_api_key(&self, api_key: &str) -> DirectoryResult<ResolvedEndpoint>;
    async fn find_by_alias(&self, alias: &str) -> DirectoryResult<ResolvedEndpoint>;
}

pub mod context;
pub mod error;

pub use context::RequestContext;
pub use error::{ErrorCaller, ErrorCode, ErrorObject, ErrorResponse, ErrorSource, GatewayError};

pub type GatewayResult<T> = Result<T, GatewayError>;

//! Cross-cutting HTTP middleware

pub mod rate_limit;
pub mod security_headers;

pub use rate_limit::{rate_limited, LimitedRoute};
pub use security_headers::security_headers_middleware;

//! Middleware for authentication and rate limiting
//!
//! Compression and response caching live in their own top-level modules.

pub mod auth;
pub mod rate_limit;

pub use auth::{
    auth_middleware, extract_bearer_token, Authenticator, Principal, StaticTokenAuthenticator,
};
pub use rate_limit::{
    client_key, rate_limit_middleware, Admission, GovernorRateLimiter, RateLimiter,
    ANONYMOUS_CLIENT,
};

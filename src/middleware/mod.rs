//! Request guards layered onto the routers in `create_router`.

pub mod csrf;
pub mod rate_limit;
pub mod security_headers;

pub use csrf::csrf_guard;
pub use rate_limit::{RateLimiter, rate_limit};

pub mod host;

pub use host::{HostRateLimiter, RateLimit};

//! HTTP middleware stack for the backing service.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (browser origins from configuration)
//! 5. Rate limiting (governor, per client IP, verification route only)

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{ClientIpKeyExtractor, RateLimiterLayer, verification_rate_limiter};
pub use request_id::request_id_middleware;

//! Progress subsystem
//!
//! Token lifecycle, per-token rate limiting with buffered overflow
//! strategies, and flat/hierarchical reporters. The strictly non-decreasing
//! invariant is enforced by the token manager for every path.

pub mod rate_limit;
pub mod reporter;
pub mod token;

pub use rate_limit::{
    Admission, OverflowStrategy, ProgressRateLimiter, RateLimitStatistics, RateLimiterConfig,
};
pub use reporter::{NullSink, ProgressReporter, ProgressSink};
pub use token::{ProgressTokenManager, ProgressTokenState};

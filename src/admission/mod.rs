//! Admission control: rate limiting, policies, and the IP blocklist.
//!
//! Rejections here are expected control flow (429/403 at the HTTP
//! layer), never exceptions. All store interaction fails open.

mod blocklist;
mod limiter;
mod policy;

pub use blocklist::{BlocklistConfig, IpBlocklist};
pub use limiter::{RateLimitDecision, RateLimiter, client_identifier};
pub use policy::{RateLimitPolicies, RateLimitPolicy};

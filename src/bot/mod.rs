/// Membership gate for the force-join channel
pub mod access;
/// File delivery ladder (stream, proxy, link fallback)
pub mod delivery;
/// Command handlers
pub mod handlers;
/// Per-user throttle and seen-user registry
pub mod throttle;

pub use throttle::{RequestThrottle, UserRegistry};

/// Footer appended to user-facing replies.
pub(crate) const BRAND: &str = "Powered by @TeraRelay";

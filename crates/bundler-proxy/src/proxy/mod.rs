//! Proxy routing: backend forwarding, response composition, and correlation.

pub mod compose;
pub mod correlation;
pub mod forward;

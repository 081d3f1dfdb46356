//! State module for tracking crawl sessions
//!
//! # Components
//!
//! - `SessionStatus`: running, completed or failed; only ever leaves `Running`
//! - `PhaseKind`: which part of the crawl a session covers
//! - `CrawlSession`: the shared, atomically counted session of one phase

mod session;
mod session_state;

// Re-export main types
pub use session::{Counter, CrawlSession, SessionId, SessionMetrics};
pub use session_state::{PhaseKind, SessionStatus};

//! Rate Limiting System
//!
//! Fixed-window rate limiting per (identity, endpoint) with a blocklist and
//! progressive escalation of block durations for repeat violators. Every store
//! fault fails open.

mod api;
mod blocklist;
mod config;
mod engine;
mod error;
mod extractors;
mod ledger;
mod lookup;
mod middleware;
mod registry;
mod sweeper;
mod window;

pub use api::{DecisionState, RateLimitStatus, RateLimiterStats, Unenforced, Verdict};
pub use blocklist::Blocklist;
pub use config::RateLimitConfig;
pub use engine::RateLimitEngine;
pub use error::{Denial, preflight_response};
pub use extractors::IdentityResolver;
pub use ledger::ViolationLedger;
pub use lookup::Lookup;
pub use middleware::{RateLimitLayer, RateLimitService};
pub use registry::PolicyRegistry;
pub use sweeper::Sweeper;
pub use window::WindowCounter;

// vim: ts=4

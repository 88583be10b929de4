pub use ratewarden_types::prelude::*;

pub use crate::rate_limit::{RateLimitEngine, Verdict};

// vim: ts=4

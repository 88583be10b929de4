pub use crate::error::{Error, WdResult};
pub use crate::types::{Timestamp, UNKNOWN_IDENTITY, WILDCARD_ENDPOINT};

pub use tracing::{debug, error, info, warn};

// vim: ts=4

//! Process-wide `tracing` setup. Audit events are emitted with
//! `target: "audit"` so they can be filtered and shipped separately.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};

//! Small shared utilities.

use std::time::{SystemTime, UNIX_EPOCH};


/// Current time as whole seconds since the unix epoch (UTC). Every absolute
/// time stored by the engine uses this unit.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

// Archival constants (no magic values)
use std::time::Duration;

/// Interval between archival cycles (24 hours)
pub const ARCHIVAL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);


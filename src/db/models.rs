//! Telemetry data model.
//!
//! Represents a single observation of the cleaning cell: the triggering
//! temperature sample plus the correlated point snapshot taken at capture
//! time. Records are immutable once appended.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Milliseconds since the Unix epoch. Source timestamp of the triggering
    /// change when the transport supplies one, local capture time otherwise.
    pub timestamp: i64,
    pub temperature: f64,
    /// Last-known pump state at capture time.
    pub pump_on: bool,
    /// Last-known overheat alarm state at capture time.
    pub overheat: bool,
    /// Cleaning-cycle counter as reported by the device. Recorded as-is,
    /// not validated for monotonicity.
    pub cycle_id: i64,
}

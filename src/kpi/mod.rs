//! Shift KPI computation.
//!
//! Pure functions over an ascending record sequence; no I/O. Downtime uses a
//! left-continuous step model: the pump state observed at a sample is
//! assumed to hold until the next sample, and the last observed state holds
//! through the end of the window. That is a modeling assumption, not a claim
//! of physical accuracy — the sampling interval is the only resolution
//! available.

use serde::Serialize;

use crate::db::TelemetryRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    /// Unweighted arithmetic mean over all samples. `None` when the window
    /// holds no records.
    pub avg_temperature: Option<f64>,
    /// Cumulative pump-off duration attributed to the window, in ms.
    pub downtime_ms: i64,
}

/// Computes window KPIs for `records`, which must be ascending by timestamp.
///
/// `window_end_ms` closes the window for downtime extrapolation only; the
/// record sequence itself is taken as-is.
pub fn compute_window_kpis(records: &[TelemetryRecord], window_end_ms: i64) -> Kpi {
    if records.is_empty() {
        return Kpi {
            avg_temperature: None,
            downtime_ms: 0,
        };
    }

    let sum: f64 = records.iter().map(|r| r.temperature).sum();
    let avg_temperature = sum / records.len() as f64;

    let mut downtime_ms: i64 = 0;
    for pair in records.windows(2) {
        if !pair[0].pump_on {
            downtime_ms += pair[1].timestamp - pair[0].timestamp;
        }
    }

    if let Some(last) = records.last() {
        if !last.pump_on {
            downtime_ms += window_end_ms - last.timestamp;
        }
    }

    Kpi {
        avg_temperature: Some(avg_temperature),
        downtime_ms,
    }
}

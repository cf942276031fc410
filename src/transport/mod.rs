//! Contract for the telemetry source.
//!
//! The real protocol client is an external collaborator; the pipeline only
//! depends on this trait. Subscriptions deliver change notifications through
//! a bounded discard-oldest backlog, and snapshot reads answer with the
//! current value of each requested point in request order.

pub mod queue;
pub mod sim;

pub use queue::{QueueSender, Subscription};

use std::{fmt, time::Duration};

use anyhow::Result;
use async_trait::async_trait;

/// The monitored points exposed by the cleaning cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointId {
    Temperature,
    PumpStatus,
    CleaningCycleId,
    OverheatAlarm,
}

impl PointId {
    /// Browse name as published by the device.
    pub fn browse_name(&self) -> &'static str {
        match self {
            PointId::Temperature => "Temperature",
            PointId::PumpStatus => "PumpStatus",
            PointId::CleaningCycleId => "CleaningCycleID",
            PointId::OverheatAlarm => "Overheat_Alarm",
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.browse_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    Float(f64),
    Bool(bool),
    Int(i64),
}

impl PointValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PointValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PointValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// One change event on a subscribed point. `source_timestamp_ms` is the
/// device-side change time when the transport supplies it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub value: PointValue,
    pub source_timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    pub sampling_interval: Duration,
    /// Maximum unprocessed notifications held for the subscriber. Overflow
    /// evicts the oldest unread item, so the backlog always holds the most
    /// recent changes.
    pub queue_depth: usize,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a change subscription on `point`.
    async fn subscribe(&self, point: PointId, opts: SubscribeOptions) -> Result<Subscription>;

    /// Synchronous snapshot of the current values, one call covering all
    /// requested points. Values are returned in request order.
    async fn read(&self, points: &[PointId]) -> Result<Vec<PointValue>>;
}

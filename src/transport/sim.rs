//! In-process cleaning-cell device simulator.
//!
//! The device is an owned state value advanced once per fixed tick by a pure
//! transition function, which makes it a deterministic test double for the
//! ingestion pipeline: tests drive `step` directly with a chosen jitter,
//! while the running transport feeds it from `rand`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    sync::Mutex,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{log_info, log_warn};

use super::{queue, Notification, PointId, PointValue, SubscribeOptions, Subscription, Transport};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy)]
pub struct DeviceParams {
    /// Base temperature gain per tick while the pump runs.
    pub heating_rate: f64,
    /// Extra gain per tick, scaled by the tick's jitter sample.
    pub heating_jitter: f64,
    /// Temperature loss per tick while the pump is off.
    pub cooling_rate: f64,
    /// The bath never cools below ambient.
    pub ambient_floor: f64,
    pub overheat_threshold: f64,
    /// Alarm clears once the bath has cooled back below this.
    pub reset_threshold: f64,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            heating_rate: 1.2,
            heating_jitter: 1.4,
            cooling_rate: 0.5,
            ambient_floor: 26.0,
            overheat_threshold: 90.0,
            reset_threshold: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub temperature: f64,
    pub pump_on: bool,
    pub cycle_id: i64,
    pub overheat: bool,
}

impl DeviceState {
    pub fn initial() -> Self {
        Self {
            temperature: 30.0,
            pump_on: false,
            cycle_id: 0,
            overheat: false,
        }
    }
}

/// Advances the device by one tick. `jitter` is expected in `[0, 1)` and
/// scales `heating_jitter`; pass a fixed value for deterministic tests.
pub fn step(state: &DeviceState, params: &DeviceParams, jitter: f64) -> DeviceState {
    let mut next = state.clone();

    if next.pump_on {
        next.temperature += params.heating_rate + jitter * params.heating_jitter;
    } else {
        next.temperature = (next.temperature - params.cooling_rate).max(params.ambient_floor);
    }

    if next.temperature > params.overheat_threshold {
        // Auto-shutoff: crossing the threshold raises the alarm and stops
        // the pump in the same tick.
        next.overheat = true;
        next.pump_on = false;
    } else if next.temperature < params.reset_threshold {
        next.overheat = false;
    }

    next
}

fn value_of(state: &DeviceState, point: PointId) -> PointValue {
    match point {
        PointId::Temperature => PointValue::Float(state.temperature),
        PointId::PumpStatus => PointValue::Bool(state.pump_on),
        PointId::CleaningCycleId => PointValue::Int(state.cycle_id),
        PointId::OverheatAlarm => PointValue::Bool(state.overheat),
    }
}

pub struct SimTransport {
    state: Arc<Mutex<DeviceState>>,
    params: DeviceParams,
    cancel: CancellationToken,
}

impl SimTransport {
    pub fn new(params: DeviceParams) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::initial())),
            params,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the background task advancing the device model once per tick.
    pub fn start_ticking(&self, tick: Duration) {
        let state = Arc::clone(&self.state);
        let params = self.params;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let jitter: f64 = rand::random();
                        let mut guard = state.lock().await;
                        let next = step(&guard, &params, jitter);
                        *guard = next;
                    }
                    _ = cancel.cancelled() => {
                        log_info!("device tick task stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Commands the pump. A rising edge starts a new cleaning cycle, which
    /// is how the device's own counter behaves.
    pub async fn set_pump(&self, on: bool) {
        let mut guard = self.state.lock().await;
        if on && !guard.pump_on {
            guard.cycle_id += 1;
        }
        guard.pump_on = on;
    }

    pub async fn snapshot_state(&self) -> DeviceState {
        self.state.lock().await.clone()
    }

    /// Stops the tick task and every sampling task spawned by `subscribe`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn subscribe(&self, point: PointId, opts: SubscribeOptions) -> Result<Subscription> {
        let (sender, subscription) = queue::channel(opts.queue_depth);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let mut ticker = time::interval(opts.sampling_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<PointValue> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if sender.is_closed() {
                            break;
                        }

                        let current = {
                            let guard = state.lock().await;
                            value_of(&guard, point)
                        };

                        // Monitored-point semantics: only value changes are
                        // reported (the first sample always counts as one).
                        if last == Some(current) {
                            continue;
                        }
                        last = Some(current);

                        let evicted = sender
                            .push(Notification {
                                value: current,
                                source_timestamp_ms: Some(Utc::now().timestamp_millis()),
                            })
                            .await;
                        if evicted {
                            log_warn!("backlog full for {point}, dropped oldest notification");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }

            log_info!("sampling task for {point} stopped");
        });

        Ok(subscription)
    }

    async fn read(&self, points: &[PointId]) -> Result<Vec<PointValue>> {
        let guard = self.state.lock().await;
        Ok(points.iter().map(|point| value_of(&guard, *point)).collect())
    }
}

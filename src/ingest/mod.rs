//! Ingestion pipeline: turns point-change notifications into persisted
//! records.
//!
//! One notification is handled at a time, so persisted order matches the
//! order drained from the (possibly lossy) subscription backlog. Snapshot
//! and append failures are logged and the sample is dropped; no retry, no
//! blocking of subsequent notifications.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    db::{Database, TelemetryRecord},
    log_error, log_info, log_warn,
    transport::{Notification, PointId, SubscribeOptions, Subscription, Transport},
};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Device-side sampling interval for the primary point.
    pub sampling_interval: Duration,
    /// Backlog depth for unprocessed notifications (discard-oldest on
    /// overflow).
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(500),
            queue_depth: 20,
        }
    }
}

/// Lifecycle of a subscription run. `Disconnected` is reachable from any
/// state on transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Connected,
    Subscribed,
    Snapshotting,
    Persisting,
}

/// Values of the correlated secondary points, read after the triggering
/// notification. The read is not atomic with the trigger: it reflects the
/// device as of the read's completion, which can lag or lead the change by
/// up to one round trip.
struct PointSnapshot {
    pump_on: bool,
    cycle_id: i64,
    overheat: bool,
}

pub struct IngestionPipeline {
    transport: Arc<dyn Transport>,
    db: Database,
    subscription: Subscription,
    state: PipelineState,
}

impl IngestionPipeline {
    /// Opens the temperature subscription. Failure here is fatal to startup;
    /// the owning process reports it and exits.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        db: Database,
        config: PipelineConfig,
    ) -> Result<Self> {
        let subscription = transport
            .subscribe(
                PointId::Temperature,
                SubscribeOptions {
                    sampling_interval: config.sampling_interval,
                    queue_depth: config.queue_depth,
                },
            )
            .await
            .context("failed to subscribe to the temperature point")?;

        log_info!(
            "subscribed to {} (sampling {:?}, backlog {})",
            PointId::Temperature,
            config.sampling_interval,
            config.queue_depth
        );

        Ok(Self {
            transport,
            db,
            subscription,
            state: PipelineState::Subscribed,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Drains notifications until cancelled or until the transport closes
    /// the stream. A closed stream is reported but does not itself terminate
    /// the owning process; reconnection policy lives outside the pipeline.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                notification = self.subscription.next() => {
                    match notification {
                        Some(notification) => self.handle_notification(notification).await,
                        None => {
                            log_warn!("transport closed the notification stream");
                            self.state = PipelineState::Disconnected;
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    log_info!("ingestion pipeline shutting down");
                    self.subscription.close();
                    break;
                }
            }
        }
    }

    async fn handle_notification(&mut self, notification: Notification) {
        let timestamp = notification
            .source_timestamp_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let Some(temperature) = notification.value.as_f64() else {
            log_warn!(
                "temperature notification carried a non-numeric value: {:?}",
                notification.value
            );
            return;
        };

        self.state = PipelineState::Snapshotting;
        let snapshot = match self.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // Data loss is accepted for availability; the next
                // notification proceeds normally.
                log_error!("snapshot read failed, dropping sample: {err:#}");
                self.state = PipelineState::Subscribed;
                return;
            }
        };

        let record = TelemetryRecord {
            timestamp,
            temperature,
            pump_on: snapshot.pump_on,
            overheat: snapshot.overheat,
            cycle_id: snapshot.cycle_id,
        };

        self.state = PipelineState::Persisting;
        match self.db.append_record(&record).await {
            Ok(()) => {
                log_info!(
                    "Logged T={:.1}°C Pump={} Overheat={}",
                    record.temperature,
                    if record.pump_on { "ON" } else { "OFF" },
                    record.overheat
                );
            }
            Err(err) => {
                log_error!("append failed, dropping record: {err:#}");
            }
        }
        self.state = PipelineState::Subscribed;
    }

    async fn read_snapshot(&self) -> Result<PointSnapshot> {
        let points = [
            PointId::PumpStatus,
            PointId::CleaningCycleId,
            PointId::OverheatAlarm,
        ];
        let values = self.transport.read(&points).await?;

        let [pump, cycle, alarm] = values.as_slice() else {
            return Err(anyhow!(
                "snapshot returned {} values, expected {}",
                values.len(),
                points.len()
            ));
        };

        Ok(PointSnapshot {
            pump_on: pump
                .as_bool()
                .ok_or_else(|| anyhow!("pump status was not a boolean"))?,
            cycle_id: cycle
                .as_i64()
                .ok_or_else(|| anyhow!("cycle id was not an integer"))?,
            overheat: alarm
                .as_bool()
                .ok_or_else(|| anyhow!("overheat alarm was not a boolean"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{queue, PointValue, QueueSender};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Transport double: hands out a pre-built subscription and answers
    /// snapshot reads from a script (falling back to a fixed snapshot once
    /// the script is exhausted).
    struct FakeTransport {
        subscription: Mutex<Option<Subscription>>,
        reads: Mutex<VecDeque<Result<Vec<PointValue>>>>,
    }

    impl FakeTransport {
        fn with_queue(queue_depth: usize) -> (Arc<Self>, QueueSender) {
            let (sender, subscription) = queue::channel(queue_depth);
            let transport = Arc::new(Self {
                subscription: Mutex::new(Some(subscription)),
                reads: Mutex::new(VecDeque::new()),
            });
            (transport, sender)
        }

        async fn script_read(&self, result: Result<Vec<PointValue>>) {
            self.reads.lock().await.push_back(result);
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn subscribe(
            &self,
            _point: PointId,
            _opts: SubscribeOptions,
        ) -> Result<Subscription> {
            self.subscription
                .lock()
                .await
                .take()
                .ok_or_else(|| anyhow!("already subscribed"))
        }

        async fn read(&self, _points: &[PointId]) -> Result<Vec<PointValue>> {
            match self.reads.lock().await.pop_front() {
                Some(result) => result,
                None => Ok(vec![
                    PointValue::Bool(true),
                    PointValue::Int(1),
                    PointValue::Bool(false),
                ]),
            }
        }
    }

    fn temp_notification(timestamp: i64, value: f64) -> Notification {
        Notification {
            value: PointValue::Float(value),
            source_timestamp_ms: Some(timestamp),
        }
    }

    fn test_db(dir: &tempfile::TempDir) -> Database {
        Database::new(dir.path().join("telemetry.db")).unwrap()
    }

    #[tokio::test]
    async fn notifications_become_records_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir);
        let (transport, sender) = FakeTransport::with_queue(8);

        let pipeline =
            IngestionPipeline::connect(transport, db.clone(), PipelineConfig::default())
                .await
                .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Subscribed);

        sender.push(temp_notification(1_000, 31.0)).await;
        sender.push(temp_notification(2_000, 32.5)).await;
        drop(sender); // close the stream once drained

        pipeline.run(CancellationToken::new()).await;

        let records = db.records_since(0).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1_000);
        assert_eq!(records[0].temperature, 31.0);
        assert!(records[0].pump_on);
        assert_eq!(records[0].cycle_id, 1);
        assert_eq!(records[1].timestamp, 2_000);
    }

    #[tokio::test]
    async fn snapshot_failure_drops_only_that_sample() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir);
        let (transport, sender) = FakeTransport::with_queue(8);
        transport.script_read(Err(anyhow!("read timed out"))).await;
        transport
            .script_read(Ok(vec![
                PointValue::Bool(false),
                PointValue::Int(3),
                PointValue::Bool(true),
            ]))
            .await;

        let pipeline =
            IngestionPipeline::connect(transport, db.clone(), PipelineConfig::default())
                .await
                .unwrap();

        sender.push(temp_notification(1_000, 80.0)).await;
        sender.push(temp_notification(2_000, 92.0)).await;
        drop(sender);

        pipeline.run(CancellationToken::new()).await;

        let records = db.records_since(0).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 2_000);
        assert!(!records[0].pump_on);
        assert!(records[0].overheat);
        assert_eq!(records[0].cycle_id, 3);
    }

    #[tokio::test]
    async fn malformed_snapshot_is_recovered_like_a_failed_one() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir);
        let (transport, sender) = FakeTransport::with_queue(8);
        transport
            .script_read(Ok(vec![PointValue::Bool(true)]))
            .await;

        let pipeline =
            IngestionPipeline::connect(transport, db.clone(), PipelineConfig::default())
                .await
                .unwrap();

        sender.push(temp_notification(1_000, 30.0)).await;
        sender.push(temp_notification(2_000, 31.0)).await;
        drop(sender);

        pipeline.run(CancellationToken::new()).await;

        let records = db.records_since(0).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 2_000);
    }

    #[tokio::test]
    async fn missing_source_timestamp_uses_the_local_clock() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir);
        let (transport, sender) = FakeTransport::with_queue(8);

        let pipeline =
            IngestionPipeline::connect(transport, db.clone(), PipelineConfig::default())
                .await
                .unwrap();

        let before = Utc::now().timestamp_millis();
        sender
            .push(Notification {
                value: PointValue::Float(33.0),
                source_timestamp_ms: None,
            })
            .await;
        drop(sender);

        pipeline.run(CancellationToken::new()).await;
        let after = Utc::now().timestamp_millis();

        let records = db.records_since(0).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].timestamp >= before);
        assert!(records[0].timestamp <= after);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db(&dir);
        let (transport, sender) = FakeTransport::with_queue(8);

        let pipeline = IngestionPipeline::connect(transport, db, PipelineConfig::default())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pipeline.run(cancel.clone()));

        cancel.cancel();
        handle.await.unwrap();

        // The pipeline closed the subscription on its way out.
        assert!(sender.is_closed());
    }
}

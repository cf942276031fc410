//! Append-only telemetry store on SQLite.
//!
//! All connection access happens on one dedicated worker thread; callers
//! submit closures over a channel and await the result on a oneshot. The
//! single thread is what serializes concurrent appends and range queries:
//! commands run in submission order, so a query observes every append whose
//! call returned before the query was issued.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;
mod models;

use migrations::run_migrations;
pub use models::TelemetryRecord;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    /// Opens (creating if absent) the telemetry store at `db_path`.
    ///
    /// A failure here means the backing storage could not be created or
    /// migrated, which the owning process treats as fatal.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("cellhist-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Telemetry store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Appends one record. Records are never updated or deleted afterwards;
    /// arrival order is preserved because all appends funnel through the
    /// single worker thread.
    pub async fn append_record(&self, record: &TelemetryRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO telemetry (timestamp, temperature, pump_status, overheat, cycle_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.timestamp,
                    record.temperature,
                    record.pump_on as i64,
                    record.overheat as i64,
                    record.cycle_id,
                ],
            )
            .with_context(|| "failed to insert telemetry record")?;
            Ok(())
        })
        .await
    }

    /// Returns all records with `timestamp >= since_ms`, ascending by
    /// timestamp. No upper bound is applied; KPI computation decides how to
    /// treat the open end of the window.
    pub async fn records_since(&self, since_ms: i64) -> Result<Vec<TelemetryRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, temperature, pump_status, overheat, cycle_id
                 FROM telemetry
                 WHERE timestamp >= ?1
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![since_ms])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(TelemetryRecord {
                    timestamp: row.get(0)?,
                    temperature: row.get(1)?,
                    pump_on: row.get::<_, i64>(2)? != 0,
                    overheat: row.get::<_, i64>(3)? != 0,
                    cycle_id: row.get(4)?,
                });
            }

            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: i64, temperature: f64, pump_on: bool) -> TelemetryRecord {
        TelemetryRecord {
            timestamp,
            temperature,
            pump_on,
            overheat: false,
            cycle_id: 1,
        }
    }

    #[tokio::test]
    async fn append_then_query_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("telemetry.db")).unwrap();

        db.append_record(&record(1_000, 30.0, false)).await.unwrap();
        db.append_record(&record(2_000, 31.5, true)).await.unwrap();
        db.append_record(&record(3_000, 33.0, true)).await.unwrap();

        let records = db.records_since(0).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            vec![1_000, 2_000, 3_000]
        );
        assert_eq!(records[1], record(2_000, 31.5, true));
    }

    #[tokio::test]
    async fn records_since_filters_lower_bound_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("telemetry.db")).unwrap();

        db.append_record(&record(500, 28.0, false)).await.unwrap();
        db.append_record(&record(1_500, 29.0, false)).await.unwrap();
        db.append_record(&record(2_500, 30.0, true)).await.unwrap();

        let records = db.records_since(1_500).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            vec![1_500, 2_500]
        );
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.db");

        {
            let db = Database::new(path.clone()).unwrap();
            db.append_record(&record(1_000, 30.0, true)).await.unwrap();
        }

        // Second open re-runs migrations against the existing schema.
        let db = Database::new(path).unwrap();
        let records = db.records_since(0).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].pump_on);
    }

    #[tokio::test]
    async fn boolean_columns_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("telemetry.db")).unwrap();

        let rec = TelemetryRecord {
            timestamp: 42,
            temperature: 91.2,
            pump_on: false,
            overheat: true,
            cycle_id: 7,
        };
        db.append_record(&rec).await.unwrap();

        let records = db.records_since(0).await.unwrap();
        assert_eq!(records, vec![rec]);
    }
}

//! Continuously-running ingestion process: subscribes to the cleaning
//! cell's temperature point and persists one record per change.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use cellhist::{
    db::Database,
    ingest::{IngestionPipeline, PipelineConfig},
    settings::{Settings, SIM_ENDPOINT},
    transport::{
        sim::{DeviceParams, SimTransport},
        Transport,
    },
};

const SIM_TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        error!("Historian startup failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env();

    let db = Database::new(settings.db_path.clone())?;

    let sim = match settings.plc_endpoint.as_str() {
        SIM_ENDPOINT => Arc::new(SimTransport::new(DeviceParams::default())),
        other => bail!("unsupported transport endpoint '{other}' (only {SIM_ENDPOINT} is wired in)"),
    };
    sim.start_ticking(SIM_TICK);
    info!("Historian connected to {}", settings.plc_endpoint);

    let transport: Arc<dyn Transport> = sim.clone();
    let pipeline = IngestionPipeline::connect(transport, db, PipelineConfig::default()).await?;

    let cancel = CancellationToken::new();
    let pipeline_task = tokio::spawn(pipeline.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for the shutdown signal")?;
    info!("Shutdown requested");

    cancel.cancel();
    sim.shutdown();
    if let Err(err) = pipeline_task.await {
        error!("Pipeline task panicked: {err}");
    }

    Ok(())
}

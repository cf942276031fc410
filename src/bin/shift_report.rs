//! One-shot shift report generator: computes KPIs over the trailing window
//! and writes the spreadsheet artifact.

use anyhow::Result;
use chrono::Utc;
use log::error;

use cellhist::{
    db::Database,
    report::{ReportAssembler, ReportConfig},
    settings::Settings,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        error!("Report generation failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env();

    let db = Database::new(settings.db_path.clone())?;
    let assembler = ReportAssembler::new(
        db,
        ReportConfig {
            report_dir: settings.report_dir.clone(),
            window_hours: settings.sample_window_hours,
        },
    );

    assembler.run(Utc::now().timestamp_millis()).await?;
    Ok(())
}

pub mod db;
pub mod ingest;
pub mod kpi;
pub mod report;
pub mod settings;
pub mod transport;
mod utils;

pub use db::{Database, TelemetryRecord};
pub use ingest::{IngestionPipeline, PipelineConfig};
pub use kpi::{compute_window_kpis, Kpi};
pub use report::{ReportAssembler, ReportConfig};
pub use settings::Settings;

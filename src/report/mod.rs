//! Shift report assembly.
//!
//! One-shot workflow: query the trailing window from the store, compute the
//! KPIs, and render the spreadsheet artifact. Runs independently of
//! ingestion and sees whatever had been committed when its query ran;
//! records appended afterwards land in the next report.

use std::{
    fs,
    path::PathBuf,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rust_xlsxwriter::Workbook;

use crate::{
    db::{Database, TelemetryRecord},
    kpi::{compute_window_kpis, Kpi},
};

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Output directory, created if absent.
    pub report_dir: PathBuf,
    pub window_hours: i64,
}

pub struct ReportAssembler {
    db: Database,
    config: ReportConfig,
}

impl ReportAssembler {
    pub fn new(db: Database, config: ReportConfig) -> Self {
        Self { db, config }
    }

    /// Builds the report for the window ending at `now_ms`. Returns the
    /// artifact path, or `None` when the window holds no records — an empty
    /// window is reported, not treated as an error.
    pub async fn run(&self, now_ms: i64) -> Result<Option<PathBuf>> {
        let window_start = now_ms - self.config.window_hours * MS_PER_HOUR;
        let records = self
            .db
            .records_since(window_start)
            .await
            .context("failed to query the telemetry window")?;

        if records.is_empty() {
            info!("No data available in the selected window.");
            return Ok(None);
        }

        let kpis = compute_window_kpis(&records, now_ms);
        let path = self
            .write_workbook(&records, &kpis, window_start, now_ms)
            .context("failed to write the report workbook")?;

        info!("Report written to {}", path.display());
        Ok(Some(path))
    }

    fn write_workbook(
        &self,
        records: &[TelemetryRecord],
        kpis: &Kpi,
        window_start_ms: i64,
        window_end_ms: i64,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.report_dir).with_context(|| {
            format!(
                "failed to create report directory {}",
                self.config.report_dir.display()
            )
        })?;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Shift Report")?;

        sheet.set_column_width(0, 22)?;
        sheet.set_column_width(1, 18)?;
        sheet.set_column_width(2, 10)?;
        sheet.set_column_width(3, 10)?;
        sheet.set_column_width(4, 10)?;

        sheet.write_string(0, 0, "Timestamp")?;
        sheet.write_string(0, 1, "Temperature (°C)")?;
        sheet.write_string(0, 2, "Pump On")?;
        sheet.write_string(0, 3, "Overheat")?;
        sheet.write_string(0, 4, "Cycle ID")?;

        for (i, record) in records.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write_string(row, 0, format_timestamp(record.timestamp)?)?;
            sheet.write_number(row, 1, record.temperature)?;
            sheet.write_string(row, 2, yes_no(record.pump_on))?;
            sheet.write_string(row, 3, yes_no(record.overheat))?;
            sheet.write_number(row, 4, record.cycle_id as f64)?;
        }

        // Blank separator row, then the summary block.
        let mut row = records.len() as u32 + 2;
        sheet.write_string(row, 0, "Summary")?;
        row += 1;
        sheet.write_string(row, 0, "Window")?;
        sheet.write_string(
            row,
            1,
            format!(
                "{} - {}",
                format_clock(window_start_ms)?,
                format_clock(window_end_ms)?
            ),
        )?;
        row += 1;
        sheet.write_string(row, 0, "Average Temperature")?;
        let average = match kpis.avg_temperature {
            Some(avg) => format!("{avg:.2}"),
            None => "N/A".to_string(),
        };
        sheet.write_string(row, 1, average)?;
        row += 1;
        sheet.write_string(row, 0, "Total Downtime (min)")?;
        sheet.write_string(row, 1, format!("{:.1}", kpis.downtime_ms as f64 / MS_PER_MINUTE))?;

        // Named from the window end so runs at different times never collide.
        let filename = format!("shift_report_{}.xlsx", file_stamp(window_end_ms)?);
        let path = self.config.report_dir.join(filename);
        workbook.save(&path)?;

        Ok(path)
    }
}

fn to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("timestamp {ms} is out of range"))
}

fn format_timestamp(ms: i64) -> Result<String> {
    Ok(to_datetime(ms)?.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn format_clock(ms: i64) -> Result<String> {
    Ok(to_datetime(ms)?.format("%H:%M").to_string())
}

fn file_stamp(ms: i64) -> Result<String> {
    Ok(to_datetime(ms)?.format("%Y%m%d_%H%M%S").to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

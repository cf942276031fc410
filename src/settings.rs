//! Process configuration, read once from the environment at startup.

use std::{env, path::PathBuf};

use log::warn;

pub const DEFAULT_DB_PATH: &str = "data/telemetry.db";
pub const DEFAULT_REPORT_DIR: &str = "reports";
pub const DEFAULT_WINDOW_HOURS: i64 = 8;
/// Endpoint that wires the in-process device simulator. A real protocol
/// client would register its own scheme here.
pub const SIM_ENDPOINT: &str = "sim://loopback";

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub report_dir: PathBuf,
    pub sample_window_hours: i64,
    pub plc_endpoint: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let db_path = env::var("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let report_dir = env::var("REPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_REPORT_DIR));

        let sample_window_hours = window_hours_from(env::var("SAMPLE_WINDOW_HOURS").ok());

        let plc_endpoint =
            env::var("PLC_ENDPOINT").unwrap_or_else(|_| SIM_ENDPOINT.to_string());

        Self {
            db_path,
            report_dir,
            sample_window_hours,
            plc_endpoint,
        }
    }
}

fn window_hours_from(raw: Option<String>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_WINDOW_HOURS;
    };

    match raw.parse::<i64>() {
        Ok(hours) if hours > 0 => hours,
        _ => {
            warn!("invalid SAMPLE_WINDOW_HOURS '{raw}', using default of {DEFAULT_WINDOW_HOURS}");
            DEFAULT_WINDOW_HOURS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_window_hours_uses_the_default() {
        assert_eq!(window_hours_from(None), DEFAULT_WINDOW_HOURS);
    }

    #[test]
    fn valid_window_hours_is_accepted() {
        assert_eq!(window_hours_from(Some("12".into())), 12);
    }

    #[test]
    fn garbage_and_non_positive_values_fall_back() {
        assert_eq!(window_hours_from(Some("eight".into())), DEFAULT_WINDOW_HOURS);
        assert_eq!(window_hours_from(Some("0".into())), DEFAULT_WINDOW_HOURS);
        assert_eq!(window_hours_from(Some("-3".into())), DEFAULT_WINDOW_HOURS);
    }
}

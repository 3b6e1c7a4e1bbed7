//! Ship position merge for PAMOS sensor datasets.
//!
//! Loads GPS position logs, aligns them onto the time axis of a sensor
//! dataset with gap-gated nearest-neighbour resampling, masks them by the
//! dataset's liveness variable and hands the result to the netCDF writer and
//! the semicolon table exporter.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cf_attrs;
pub mod cf_time;
pub mod dataset;
pub mod export;
pub mod merge;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;
pub mod positions;
pub mod resample;

pub use dataset::{AttrValue, Dataset, RawVariable, Variable, VariableData, VariableRole};
pub use export::{format_float, write_table, write_table_file, LEADING_COLUMNS};
pub use merge::{merge_ship_positions, MergeReport};
pub use positions::{
    load_position_dir, summarize_position_dir, FileSummary, PositionSchema, PositionTrack,
};
pub use resample::{
    apply_validity_mask, fixed_grid, nearest_distances, nearest_indices,
    resample_nearest_with_max_gap, resample_to_frequency, select_at, validity_mask, TimeSeries,
};

/// Nanoseconds since the Unix epoch (UTC).
pub type Timestamp = i64;

pub type Result<T> = std::result::Result<T, ShipPosError>;

#[derive(Error, Debug)]
pub enum ShipPosError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("source series is empty; no nearest neighbour is defined")]
    EmptySource,
    #[error("source timestamps are not sorted ascending (index {index})")]
    UnsortedTimes { index: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("unrecognised position log header in {file}: {header}")]
    UnknownSchema { file: String, header: String },
    #[error("failed to parse {file} line {line}: {message}")]
    PositionParse {
        file: String,
        line: u64,
        message: String,
    },
    #[error("no position logs (*.{extension}) found in {dir}")]
    NoInputFiles { dir: String, extension: String },
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error("time {0} is not on the resampled grid")]
    TimeNotOnGrid(String),
    #[error("variable not found: {0}")]
    MissingVariable(String),
    #[error("cannot carry variable {name}: {reason}")]
    UnsupportedVariable { name: String, reason: String },
    #[cfg(feature = "netcdf")]
    #[error("netCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),
}

/// How the resampled positions are brought onto the dataset time axis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Alignment {
    /// Resample onto a fixed-frequency grid, then pick the dataset times out of it.
    Grid,
    /// Resample straight onto the dataset times.
    Direct,
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::Grid
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeParams {
    pub freq_s: f64,
    pub max_gap_s: f64,
    pub align: Alignment,
    pub validity_var: String,
    pub instrument: String,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            freq_s: 60.0,
            max_gap_s: 60.0,
            align: Alignment::Grid,
            validity_var: "t_air".to_string(),
            instrument: "GNSS receiver (MS Fridtjof Nansen)".to_string(),
        }
    }
}

impl MergeParams {
    pub fn freq(&self) -> Result<Duration> {
        let freq = seconds_to_duration(self.freq_s)?;
        if freq <= Duration::zero() {
            return Err(ShipPosError::InvalidParameter(format!(
                "resample frequency must be positive, got {}s",
                self.freq_s
            )));
        }
        Ok(freq)
    }

    pub fn max_gap(&self) -> Result<Duration> {
        seconds_to_duration(self.max_gap_s)
    }
}

/// Converts fractional seconds to a duration with nanosecond resolution.
pub fn seconds_to_duration(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() {
        return Err(ShipPosError::InvalidParameter(format!(
            "duration must be finite, got {}",
            seconds
        )));
    }
    let nanos = (seconds * 1e9).round();
    if nanos.abs() >= i64::MAX as f64 {
        return Err(ShipPosError::InvalidParameter(format!(
            "duration out of range: {}s",
            seconds
        )));
    }
    Ok(Duration::nanoseconds(nanos as i64))
}

/// Parse a duration token such as `90`, `60s`, `1min`, `0.5h`, `2d` or `500ms` into seconds.
pub fn parse_duration_token(token: &str) -> Option<f64> {
    let trimmed = token.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    let scale = match unit.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "ms" | "millisecond" | "milliseconds" => 1e-3,
        "us" | "microsecond" | "microseconds" => 1e-6,
        "ns" | "nanosecond" | "nanoseconds" => 1e-9,
        "m" | "min" | "mins" | "minute" | "minutes" | "t" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86_400.0,
        _ => return None,
    };
    let seconds = value * scale;
    seconds.is_finite().then_some(seconds)
}

pub fn timestamp_from_datetime(dt: &DateTime<Utc>) -> Result<Timestamp> {
    dt.timestamp_nanos_opt()
        .ok_or_else(|| ShipPosError::InvalidTime(format!("{} is outside the nanosecond range", dt)))
}

pub fn timestamp_to_datetime(ts: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_nanos(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_tokens() {
        assert_eq!(parse_duration_token("60"), Some(60.0));
        assert_eq!(parse_duration_token("1min"), Some(60.0));
        assert_eq!(parse_duration_token("0.5h"), Some(1800.0));
        assert_eq!(parse_duration_token(" 2d "), Some(172_800.0));
        assert_eq!(parse_duration_token("500ms"), Some(0.5));
        assert_eq!(parse_duration_token("1fortnight"), None);
        assert_eq!(parse_duration_token(""), None);
    }

    #[test]
    fn default_params_match_batch_run() {
        let params = MergeParams::default();
        assert_eq!(params.freq().unwrap(), Duration::minutes(1));
        assert_eq!(params.max_gap().unwrap(), Duration::minutes(1));
        assert_eq!(params.align, Alignment::Grid);
        assert_eq!(params.validity_var, "t_air");
    }

    #[test]
    fn zero_frequency_rejected() {
        let params = MergeParams {
            freq_s: 0.0,
            ..MergeParams::default()
        };
        assert!(matches!(params.freq(), Err(ShipPosError::InvalidParameter(_))));
    }

    #[test]
    fn timestamp_round_trip_through_chrono() {
        let dt = Utc.with_ymd_and_hms(2024, 11, 30, 12, 0, 0).unwrap();
        let ts = timestamp_from_datetime(&dt).unwrap();
        assert_eq!(ts, 1_732_968_000_000_000_000);
        assert_eq!(timestamp_to_datetime(ts), dt);
    }
}

//! Ship position logs (`*.nrt`, tab separated).
//!
//! Two header conventions exist in the archive: the legacy one with short
//! `lat`/`lon` columns and the newer one that names each column after its
//! sensor path (`vessel:<ship>:latitude [deg]`). Both normalise into a
//! [`PositionTrack`].

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::resample::TimeSeries;
use crate::{timestamp_from_datetime, Result, ShipPosError, Timestamp};

pub const POSITION_LOG_EXTENSION: &str = "nrt";
pub const TIME_COLUMN: &str = "datetime";
const LEGACY_LAT: &str = "lat";
const LEGACY_LON: &str = "lon";
const SENSOR_LAT_SUFFIX: &str = ":latitude [deg]";
const SENSOR_LON_SUFFIX: &str = ":longitude [deg]";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionSchema {
    /// Short `lat` / `lon` column names.
    Legacy,
    /// Descriptive sensor-path column names ending in `:latitude [deg]` / `:longitude [deg]`.
    SensorPath,
}

impl fmt::Display for PositionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSchema::Legacy => write!(f, "legacy"),
            PositionSchema::SensorPath => write!(f, "sensor-path"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ColumnMap {
    schema: PositionSchema,
    time: usize,
    lat: usize,
    lon: usize,
}

fn column(names: &[&str], pred: impl Fn(&str) -> bool) -> Option<usize> {
    names.iter().position(|&n| pred(n))
}

fn detect_columns(header: &csv::StringRecord) -> Option<ColumnMap> {
    let names: Vec<&str> = header.iter().map(str::trim).collect();
    let time = column(&names, |n| n == TIME_COLUMN)?;
    let legacy = (
        column(&names, |n| n == LEGACY_LAT),
        column(&names, |n| n == LEGACY_LON),
    );
    if let (Some(lat), Some(lon)) = legacy {
        return Some(ColumnMap {
            schema: PositionSchema::Legacy,
            time,
            lat,
            lon,
        });
    }
    let lat = column(&names, |n| n.ends_with(SENSOR_LAT_SUFFIX))?;
    let lon = column(&names, |n| n.ends_with(SENSOR_LON_SUFFIX))?;
    Some(ColumnMap {
        schema: PositionSchema::SensorPath,
        time,
        lat,
        lon,
    })
}

/// Column-oriented position fixes, in file order until [`PositionTrack::sort`] is called.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionTrack {
    pub time: Vec<Timestamp>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
}

impl PositionTrack {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, time: Timestamp, lat: f64, lon: f64) {
        self.time.push(time);
        self.lat.push(lat);
        self.lon.push(lon);
    }

    pub fn extend(&mut self, other: PositionTrack) {
        self.time.extend(other.time);
        self.lat.extend(other.lat);
        self.lon.extend(other.lon);
    }

    /// Stable sort by time.
    pub fn sort(&mut self) {
        if self.time.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.time[i]);
        self.time = order.iter().map(|&i| self.time[i]).collect();
        self.lat = order.iter().map(|&i| self.lat[i]).collect();
        self.lon = order.iter().map(|&i| self.lon[i]).collect();
    }

    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.time.iter().min()?;
        let last = self.time.iter().max()?;
        Some((*first, *last))
    }

    /// Largest interval between consecutive fixes, in nanoseconds. Assumes sorted input.
    pub fn largest_gap(&self) -> Option<i64> {
        self.time.windows(2).map(|w| w[1] - w[0]).max()
    }

    pub fn lat_series(&self) -> TimeSeries {
        TimeSeries {
            times: self.time.clone(),
            values: self.lat.iter().copied().collect(),
        }
    }

    pub fn lon_series(&self) -> TimeSeries {
        TimeSeries {
            times: self.time.clone(),
            values: self.lon.iter().copied().collect(),
        }
    }
}

/// Parse an instant as written in the position logs. Naive values are UTC.
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return timestamp_from_datetime(&dt.with_timezone(&Utc)).ok();
    }
    let naive = text.trim_end_matches('Z');
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return timestamp_from_datetime(&dt.and_utc()).ok();
        }
    }
    let date = NaiveDate::parse_from_str(naive, "%Y-%m-%d").ok()?;
    timestamp_from_datetime(&date.and_hms_opt(0, 0, 0)?.and_utc()).ok()
}

fn parse_coordinate(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    text.parse().ok()
}

/// Parse one tab-separated position log. `label` names the source in errors.
pub fn parse_position_log<R: Read>(reader: R, label: &str) -> Result<(PositionSchema, PositionTrack)> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);
    let header = rdr.headers()?.clone();
    let columns = detect_columns(&header).ok_or_else(|| ShipPosError::UnknownSchema {
        file: label.to_string(),
        header: header.iter().collect::<Vec<_>>().join(" | "),
    })?;

    let mut track = PositionTrack::default();
    for row in rdr.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let field = |idx: usize| row.get(idx).unwrap_or("");
        let parse_err = |message: String| ShipPosError::PositionParse {
            file: label.to_string(),
            line,
            message,
        };
        let time = parse_timestamp(field(columns.time))
            .ok_or_else(|| parse_err(format!("bad timestamp '{}'", field(columns.time))))?;
        let lat = parse_coordinate(field(columns.lat))
            .ok_or_else(|| parse_err(format!("bad latitude '{}'", field(columns.lat))))?;
        let lon = parse_coordinate(field(columns.lon))
            .ok_or_else(|| parse_err(format!("bad longitude '{}'", field(columns.lon))))?;
        track.push(time, lat, lon);
    }
    Ok((columns.schema, track))
}

pub fn load_position_file(path: &Path) -> Result<(PositionSchema, PositionTrack)> {
    let file = File::open(path)?;
    parse_position_log(file, &path.display().to_string())
}

/// `*.nrt` files in `dir`, sorted by path.
pub fn list_position_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_log = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == POSITION_LOG_EXTENSION)
            .unwrap_or(false);
        if is_log && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(ShipPosError::NoInputFiles {
            dir: dir.display().to_string(),
            extension: POSITION_LOG_EXTENSION.to_string(),
        });
    }
    Ok(files)
}

/// Load and concatenate every position log in `dir`, in file-name order.
pub fn load_position_dir(dir: &Path) -> Result<PositionTrack> {
    let mut track = PositionTrack::default();
    for path in list_position_files(dir)? {
        let (schema, part) = load_position_file(&path)?;
        debug!("{}: {} fixes ({} schema)", path.display(), part.len(), schema);
        track.extend(part);
    }
    info!("Loaded {} position fixes from {}", track.len(), dir.display());
    Ok(track)
}

/// Load several log directories into one time-sorted track.
pub fn load_position_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<PositionTrack> {
    let mut track = PositionTrack::default();
    for dir in dirs {
        track.extend(load_position_dir(dir.as_ref())?);
    }
    track.sort();
    if let Some((first, last)) = track.span() {
        info!(
            "Position track spans {} .. {}",
            crate::timestamp_to_datetime(first),
            crate::timestamp_to_datetime(last)
        );
    }
    Ok(track)
}

#[derive(Clone, Debug, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub schema: PositionSchema,
    pub records: usize,
    pub missing_positions: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub largest_gap_s: Option<f64>,
}

/// Per-file overview of a log directory.
pub fn summarize_position_dir(dir: &Path) -> Result<Vec<FileSummary>> {
    list_position_files(dir)?
        .into_iter()
        .map(|path| {
            let (schema, mut track) = load_position_file(&path)?;
            track.sort();
            let span = track.span();
            Ok(FileSummary {
                schema,
                records: track.len(),
                missing_positions: track
                    .lat
                    .iter()
                    .zip(&track.lon)
                    .filter(|(lat, lon)| lat.is_nan() || lon.is_nan())
                    .count(),
                first: span.map(|(first, _)| crate::timestamp_to_datetime(first)),
                last: span.map(|(_, last)| crate::timestamp_to_datetime(last)),
                largest_gap_s: track.largest_gap().map(|g| g as f64 / 1e9),
                path,
            })
        })
        .collect()
}

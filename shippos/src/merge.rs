//! Attach gap-gated ship positions to a sensor dataset.

use std::borrow::Cow;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::{Attributes, Dataset};
use crate::positions::PositionTrack;
use crate::resample::{
    apply_validity_mask, resample_nearest_with_max_gap, resample_to_frequency, select_at,
    validity_mask, TimeSeries,
};
use crate::{Alignment, MergeParams, Result, ShipPosError, Timestamp};

pub const LAT_SHIP: &str = "lat_ship";
pub const LON_SHIP: &str = "lon_ship";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeReport {
    pub dataset_points: usize,
    pub track_points: usize,
    /// Positions present after alignment and masking.
    pub kept: usize,
    /// No fix within `max_gap` (or the nearest fix itself had no position).
    pub gap_masked: usize,
    /// Aligned, then removed because the validity variable was missing.
    pub validity_masked: usize,
}

fn position_attrs(instrument: &str, axis: &str, units: &str) -> Attributes {
    vec![
        ("instrument".to_string(), instrument.into()),
        ("long_name".to_string(), axis.into()),
        ("standard_name".to_string(), axis.into()),
        ("units".to_string(), units.into()),
    ]
}

fn align(series: &TimeSeries, times: &[Timestamp], params: &MergeParams) -> Result<TimeSeries> {
    let max_gap = params.max_gap()?;
    match params.align {
        Alignment::Grid => {
            let gridded = resample_to_frequency(series, params.freq()?, max_gap)?;
            debug!(
                "Resampled {} fixes onto {} grid points ({} missing)",
                series.len(),
                gridded.len(),
                gridded.count_missing()
            );
            select_at(&gridded, times)
        }
        Alignment::Direct => resample_nearest_with_max_gap(series, times, max_gap),
    }
}

/// Latitude and longitude aligned onto `times`, before any validity masking.
pub fn align_track(
    track: &PositionTrack,
    times: &[Timestamp],
    params: &MergeParams,
) -> Result<(TimeSeries, TimeSeries)> {
    if track.is_empty() {
        return Err(ShipPosError::EmptySource);
    }
    let track = if track.time.windows(2).all(|w| w[0] <= w[1]) {
        Cow::Borrowed(track)
    } else {
        warn!("Position track was not time-sorted; sorting a copy");
        let mut sorted = track.clone();
        sorted.sort();
        Cow::Owned(sorted)
    };
    let lat = align(&track.lat_series(), times, params)?;
    let lon = align(&track.lon_series(), times, params)?;
    Ok((lat, lon))
}

fn missing_either(lat: &Array1<f64>, lon: &Array1<f64>) -> Vec<bool> {
    lat.iter()
        .zip(lon.iter())
        .map(|(a, b)| a.is_nan() || b.is_nan())
        .collect()
}

/// Align `track` onto the dataset time axis, null positions where the
/// validity variable is missing, and attach `lat_ship` / `lon_ship`.
pub fn merge_ship_positions(
    dataset: &mut Dataset,
    track: &PositionTrack,
    params: &MergeParams,
) -> Result<MergeReport> {
    let reference = dataset.numeric(&params.validity_var)?.clone();
    let (lat, lon) = align_track(track, &dataset.time, params)?;

    let aligned_missing = missing_either(&lat.values, &lon.values);
    let valid = validity_mask(&reference);
    let lat_ship = apply_validity_mask(&lat.values, &reference)?;
    let lon_ship = apply_validity_mask(&lon.values, &reference)?;

    let count = |pred: fn(bool, bool) -> bool| {
        aligned_missing
            .iter()
            .zip(&valid)
            .filter(|(missing, valid)| pred(**missing, **valid))
            .count()
    };
    let report = MergeReport {
        dataset_points: dataset.len(),
        track_points: track.len(),
        kept: count(|missing, valid| !missing && valid),
        gap_masked: count(|missing, _| missing),
        validity_masked: count(|missing, valid| !missing && !valid),
    };

    dataset.assign_coord(
        LAT_SHIP,
        lat_ship,
        position_attrs(&params.instrument, "latitude", "degree_north"),
    )?;
    dataset.assign_coord(
        LON_SHIP,
        lon_ship,
        position_attrs(&params.instrument, "longitude", "degree_east"),
    )?;

    info!(
        "Ship positions: {} kept, {} outside {}s gap, {} without {}",
        report.kept, report.gap_masked, params.max_gap_s, report.validity_masked, params.validity_var
    );
    Ok(report)
}

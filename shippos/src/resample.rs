//! Gap-gated nearest-neighbour resampling.
//!
//! Plain nearest-neighbour resampling will carry a stale position across an
//! arbitrarily long dropout, so every resampled value is checked against the
//! distance to the nearest real observation and nulled past `max_gap`.

use chrono::Duration;
use ndarray::{Array1, Zip};

use crate::{timestamp_to_datetime, Result, ShipPosError, Timestamp};

const MAX_GRID_POINTS: i64 = 200_000_000;

/// Scalar series indexed by timestamp. `NaN` marks a missing value.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    pub times: Vec<Timestamp>,
    pub values: Array1<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

fn first_unsorted(times: &[Timestamp]) -> Option<usize> {
    times.windows(2).position(|w| w[1] < w[0]).map(|i| i + 1)
}

fn ensure_source(source_times: &[Timestamp]) -> Result<()> {
    if source_times.is_empty() {
        return Err(ShipPosError::EmptySource);
    }
    if let Some(index) = first_unsorted(source_times) {
        return Err(ShipPosError::UnsortedTimes { index });
    }
    Ok(())
}

// Entries just before and at/after the insertion point of `t`, clamped.
#[inline]
fn neighbours(source_times: &[Timestamp], t: Timestamp) -> (usize, usize) {
    let last = source_times.len() - 1;
    let idx = source_times.partition_point(|&s| s < t);
    (idx.saturating_sub(1).min(last), idx.min(last))
}

/// Nearest source index per target; exact midpoints resolve to the earlier one.
pub fn nearest_indices(source_times: &[Timestamp], target_times: &[Timestamp]) -> Result<Vec<usize>> {
    ensure_source(source_times)?;
    Ok(target_times
        .iter()
        .map(|&t| {
            let (left, right) = neighbours(source_times, t);
            if t.abs_diff(source_times[left]) <= t.abs_diff(source_times[right]) {
                left
            } else {
                right
            }
        })
        .collect())
}

pub fn nearest_distances(source_times: &[Timestamp], target_times: &[Timestamp]) -> Result<Vec<u64>> {
    ensure_source(source_times)?;
    Ok(target_times
        .iter()
        .map(|&t| {
            let (left, right) = neighbours(source_times, t);
            t.abs_diff(source_times[left])
                .min(t.abs_diff(source_times[right]))
        })
        .collect())
}

fn gap_limit(max_gap: Duration) -> Result<u64> {
    if max_gap < Duration::zero() {
        return Err(ShipPosError::InvalidParameter(format!(
            "max_gap must be non-negative, got {}",
            max_gap
        )));
    }
    // A gap too large for i64 nanoseconds gates nothing.
    Ok(max_gap
        .num_nanoseconds()
        .map(|n| n as u64)
        .unwrap_or(u64::MAX))
}

/// Nearest-neighbour resample onto `target_times`; values whose nearest
/// observation is more than `max_gap` away become `NaN`.
pub fn resample_nearest_with_max_gap(
    source: &TimeSeries,
    target_times: &[Timestamp],
    max_gap: Duration,
) -> Result<TimeSeries> {
    let limit = gap_limit(max_gap)?;
    let indices = nearest_indices(&source.times, target_times)?;
    let distances = nearest_distances(&source.times, target_times)?;

    let values: Array1<f64> = indices
        .iter()
        .zip(distances.iter())
        .map(|(&idx, &dist)| {
            if dist <= limit {
                source.values[idx]
            } else {
                f64::NAN
            }
        })
        .collect();

    Ok(TimeSeries {
        times: target_times.to_vec(),
        values,
    })
}

/// Grid from `first` floored to a multiple of `freq` since the epoch, through `last`.
pub fn fixed_grid(first: Timestamp, last: Timestamp, freq: Duration) -> Result<Vec<Timestamp>> {
    let step = freq.num_nanoseconds().filter(|n| *n > 0).ok_or_else(|| {
        ShipPosError::InvalidParameter(format!("grid frequency must be positive, got {}", freq))
    })?;
    if last < first {
        return Ok(Vec::new());
    }
    let out_of_range = || {
        ShipPosError::InvalidParameter(format!(
            "grid from {} to {} at {} is out of range",
            timestamp_to_datetime(first).to_rfc3339(),
            timestamp_to_datetime(last).to_rfc3339(),
            freq
        ))
    };
    let start = first
        .div_euclid(step)
        .checked_mul(step)
        .ok_or_else(out_of_range)?;
    let count = last
        .checked_sub(start)
        .map(|span| span / step + 1)
        .ok_or_else(out_of_range)?;
    if count > MAX_GRID_POINTS {
        return Err(ShipPosError::InvalidParameter(format!(
            "grid of {} points at {} is too large",
            count, freq
        )));
    }
    Ok((0..count).map(|i| start + i * step).collect())
}

pub fn resample_to_frequency(source: &TimeSeries, freq: Duration, max_gap: Duration) -> Result<TimeSeries> {
    ensure_source(&source.times)?;
    let first = source.times[0];
    let last = source.times[source.len() - 1];
    let grid = fixed_grid(first, last, freq)?;
    resample_nearest_with_max_gap(source, &grid, max_gap)
}

/// Values of a gridded series at exactly `times`.
pub fn select_at(series: &TimeSeries, times: &[Timestamp]) -> Result<TimeSeries> {
    if let Some(index) = first_unsorted(&series.times) {
        return Err(ShipPosError::UnsortedTimes { index });
    }
    let values = times
        .iter()
        .map(|&t| match series.times.binary_search(&t) {
            Ok(i) => Ok(series.values[i]),
            Err(_) => Err(ShipPosError::TimeNotOnGrid(
                timestamp_to_datetime(t).to_rfc3339(),
            )),
        })
        .collect::<Result<Array1<f64>>>()?;
    Ok(TimeSeries {
        times: times.to_vec(),
        values,
    })
}

pub fn validity_mask(reference: &Array1<f64>) -> Vec<bool> {
    reference.iter().map(|v| !v.is_nan()).collect()
}

pub fn apply_validity_mask(values: &Array1<f64>, reference: &Array1<f64>) -> Result<Array1<f64>> {
    if values.len() != reference.len() {
        return Err(ShipPosError::LengthMismatch {
            expected: reference.len(),
            actual: values.len(),
        });
    }
    Ok(Zip::from(values)
        .and(reference)
        .map_collect(|&v, &r| if r.is_nan() { f64::NAN } else { v }))
}

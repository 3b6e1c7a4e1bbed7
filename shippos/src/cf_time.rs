//! CF-convention time coordinates (`<unit> since <reference>`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{timestamp_from_datetime, Result, ShipPosError, Timestamp};

pub const EPOCH_SECONDS_UNITS: &str = "seconds since 1970-01-01 00:00:00";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeUnits {
    /// Length of one unit in nanoseconds.
    pub unit_ns: i64,
    pub reference: Timestamp,
}

pub fn parse_units(units: &str) -> Result<TimeUnits> {
    let lower = units.trim().to_ascii_lowercase();
    let (unit, reference) = lower
        .split_once(" since ")
        .ok_or_else(|| ShipPosError::InvalidTime(format!("not a CF time unit: '{}'", units)))?;
    let unit_ns = match unit.trim() {
        "nanoseconds" | "nanosecond" | "ns" => 1,
        "microseconds" | "microsecond" | "us" => 1_000,
        "milliseconds" | "millisecond" | "ms" => 1_000_000,
        "seconds" | "second" | "secs" | "sec" | "s" => 1_000_000_000,
        "minutes" | "minute" | "mins" | "min" => 60_000_000_000,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000_000_000,
        "days" | "day" | "d" => 86_400_000_000_000,
        other => {
            return Err(ShipPosError::InvalidTime(format!(
                "unsupported time unit '{}'",
                other
            )))
        }
    };
    let reference = parse_reference(reference.trim())
        .ok_or_else(|| ShipPosError::InvalidTime(format!("bad reference date in '{}'", units)))?;
    Ok(TimeUnits {
        unit_ns,
        reference: timestamp_from_datetime(&reference)?,
    })
}

fn parse_reference(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim_end_matches(" utc").trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text.replacen(' ', "T", 1).to_ascii_uppercase()) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let naive = text.trim_end_matches('z');
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dt%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Decode raw CF time values into timestamps.
pub fn decode_times(values: &[f64], units: &str) -> Result<Vec<Timestamp>> {
    let units = parse_units(units)?;
    values.iter().map(|&v| decode_one(v, units)).collect()
}

fn decode_one(value: f64, units: TimeUnits) -> Result<Timestamp> {
    let overflow = || ShipPosError::InvalidTime(format!("time value {} overflows", value));
    if !value.is_finite() {
        return Err(ShipPosError::InvalidTime(format!(
            "non-finite time value {}",
            value
        )));
    }
    // Whole and fractional parts separately so large epoch offsets keep ns precision.
    let whole = value.trunc();
    if whole.abs() >= i64::MAX as f64 {
        return Err(overflow());
    }
    let offset = (whole as i64)
        .checked_mul(units.unit_ns)
        .and_then(|w| w.checked_add((value.fract() * units.unit_ns as f64).round() as i64))
        .ok_or_else(overflow)?;
    units.reference.checked_add(offset).ok_or_else(overflow)
}

/// Encode timestamps as CF time values in the given units.
pub fn encode_times(times: &[Timestamp], units: &str) -> Result<Vec<f64>> {
    let units = parse_units(units)?;
    Ok(times
        .iter()
        .map(|&t| {
            let delta = t - units.reference;
            let whole = delta.div_euclid(units.unit_ns);
            let rem = delta.rem_euclid(units.unit_ns);
            whole as f64 + rem as f64 / units.unit_ns as f64
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const S: i64 = 1_000_000_000;

    #[test]
    fn parses_common_unit_strings() {
        let u = parse_units("seconds since 1970-01-01 00:00:00").unwrap();
        assert_eq!(u, TimeUnits { unit_ns: S, reference: 0 });

        let u = parse_units("days since 2024-11-30").unwrap();
        let reference = Utc.with_ymd_and_hms(2024, 11, 30, 0, 0, 0).unwrap();
        assert_eq!(u.reference, timestamp_from_datetime(&reference).unwrap());
        assert_eq!(u.unit_ns, 86_400 * S);

        let u = parse_units("minutes since 2024-11-30T06:00:00Z").unwrap();
        assert_eq!(u.unit_ns, 60 * S);
        let reference = Utc.with_ymd_and_hms(2024, 11, 30, 6, 0, 0).unwrap();
        assert_eq!(u.reference, timestamp_from_datetime(&reference).unwrap());

        let u = parse_units("hours since 2024-11-30 06:00:00+01:00").unwrap();
        let reference = Utc.with_ymd_and_hms(2024, 11, 30, 5, 0, 0).unwrap();
        assert_eq!(u.reference, timestamp_from_datetime(&reference).unwrap());
    }

    #[test]
    fn rejects_non_time_units() {
        assert!(parse_units("degree_north").is_err());
        assert!(parse_units("fortnights since 2024-01-01").is_err());
        assert!(parse_units("seconds since yesterday").is_err());
    }

    #[test]
    fn decodes_large_offsets_exactly() {
        let raw = [1_732_968_000.0, 1_732_968_060.5];
        let times = decode_times(&raw, EPOCH_SECONDS_UNITS).unwrap();
        assert_eq!(times, vec![1_732_968_000 * S, 1_732_968_060 * S + S / 2]);
        assert!(decode_times(&[f64::NAN], EPOCH_SECONDS_UNITS).is_err());
    }

    #[test]
    fn encode_inverts_decode() {
        let units = "minutes since 2024-11-30 00:00:00";
        let raw = [0.0, 1.0, 1.5, 1440.0];
        let times = decode_times(&raw, units).unwrap();
        assert_eq!(encode_times(&times, units).unwrap(), raw.to_vec());
    }
}

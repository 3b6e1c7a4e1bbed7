//! Semicolon-delimited table export (one row per timestamp).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::dataset::{Dataset, Variable, VariableData, TIME_NAME};
use crate::{timestamp_to_datetime, Result, ShipPosError};

/// Columns that always lead the table, in this order.
pub const LEADING_COLUMNS: [&str; 5] = ["lat", "lon", "section", "lat_ship", "lon_ship"];
pub const TABLE_DELIMITER: u8 = b';';
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Table column order: the leading columns, then everything else in dataset order.
pub fn column_order<'a>(dataset: &'a Dataset, leading: &[&str]) -> Result<Vec<&'a Variable>> {
    let mut columns = Vec::with_capacity(dataset.variables.len());
    for name in leading {
        let variable = dataset
            .variable(name)
            .ok_or_else(|| ShipPosError::MissingVariable(name.to_string()))?;
        columns.push(variable);
    }
    columns.extend(
        dataset
            .variables
            .iter()
            .filter(|v| v.name != TIME_NAME && !leading.contains(&v.name.as_str())),
    );
    Ok(columns)
}

/// Shortest round-trip form, with integral values keeping a `.0`.
pub fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn cell(variable: &Variable, row: usize) -> String {
    match &variable.data {
        VariableData::Numeric(values) => {
            let v = values[row];
            if v.is_nan() {
                String::new()
            } else {
                format_float(v)
            }
        }
        VariableData::Text(values) => values[row].clone(),
    }
}

pub fn write_table_with<W: Write>(dataset: &Dataset, leading: &[&str], writer: W) -> Result<()> {
    let columns = column_order(dataset, leading)?;
    let mut out = csv::WriterBuilder::new()
        .delimiter(TABLE_DELIMITER)
        .from_writer(writer);

    let mut header = vec![TIME_NAME.to_string()];
    header.extend(columns.iter().map(|v| v.name.clone()));
    out.write_record(&header)?;

    for (row, &t) in dataset.time.iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(timestamp_to_datetime(t).format(TIME_FORMAT).to_string());
        record.extend(columns.iter().map(|v| cell(v, row)));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_table<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    write_table_with(dataset, &LEADING_COLUMNS, writer)
}

pub fn write_table_file(dataset: &Dataset, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_table(dataset, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VariableRole;

    const S: i64 = 1_000_000_000;
    const T0: i64 = 1_732_968_000 * S;

    fn sample() -> Dataset {
        let mut ds = Dataset::from_timestamps(vec![T0, T0 + 60 * S + S / 4]).unwrap();
        let coords = [
            Variable::numeric("lon", vec![-68.3, -68.3]),
            Variable::numeric("lat", vec![-54.8, -54.8]),
            Variable::text("section", vec!["Ushuaia".into(), "Drake".into()]),
        ];
        for v in coords {
            ds.push_variable(v.with_role(VariableRole::Coordinate)).unwrap();
        }
        ds.push_variable(Variable::numeric("t_air", vec![2.5, f64::NAN])).unwrap();
        ds.push_variable(Variable::numeric("p_air", vec![990.0, 991.25])).unwrap();
        ds.push_variable(Variable::numeric("lat_ship", vec![-54.81, f64::NAN])).unwrap();
        ds.push_variable(Variable::numeric("lon_ship", vec![-68.29, f64::NAN])).unwrap();
        ds
    }

    #[test]
    fn leading_columns_first_then_dataset_order() {
        let mut buf = Vec::new();
        write_table(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time;lat;lon;section;lat_ship;lon_ship;t_air;p_air");
        assert_eq!(
            lines[1],
            "2024-11-30 12:00:00;-54.8;-68.3;Ushuaia;-54.81;-68.29;2.5;990.0"
        );
        assert_eq!(lines[2], "2024-11-30 12:01:00.250;-54.8;-68.3;Drake;;;;991.25");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn floats_keep_decimal_point() {
        assert_eq!(format_float(-60.0), "-60.0");
        assert_eq!(format_float(990.0), "990.0");
        assert_eq!(format_float(991.25), "991.25");
        assert_eq!(format_float(-54.81), "-54.81");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn missing_leading_column_is_an_error() {
        let mut ds = Dataset::from_timestamps(vec![T0]).unwrap();
        ds.push_variable(Variable::numeric("lat", vec![1.0])).unwrap();
        let err = write_table(&ds, Vec::new()).unwrap_err();
        assert!(matches!(err, ShipPosError::MissingVariable(name) if name == "lon"));
    }
}

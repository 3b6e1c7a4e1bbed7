//! CF attribute conventions shared by the netCDF reader and writer.

use crate::dataset::{attr, set_attr, AttrValue, Attributes, Variable, VariableRole};

pub const FILL_ATTRS: [&str; 2] = ["_FillValue", "missing_value"];
pub const PACKING_ATTRS: [&str; 2] = ["scale_factor", "add_offset"];
pub const COORDINATES_ATTR: &str = "coordinates";

/// Fill values become `NaN`, packed values are scaled; the attributes that
/// described either are removed.
pub fn unpack(values: &mut [f64], attrs: &mut Attributes) {
    let fills: Vec<f64> = FILL_ATTRS
        .iter()
        .filter_map(|name| attr(attrs, name))
        .flat_map(|v| match v {
            AttrValue::Number(x) => vec![*x],
            AttrValue::Numbers(xs) => xs.clone(),
            AttrValue::Text(_) => Vec::new(),
        })
        .collect();
    let scale = attr(attrs, "scale_factor").and_then(AttrValue::as_number).unwrap_or(1.0);
    let offset = attr(attrs, "add_offset").and_then(AttrValue::as_number).unwrap_or(0.0);
    for v in values.iter_mut() {
        if fills.iter().any(|f| f == v) {
            *v = f64::NAN;
        } else {
            *v = *v * scale + offset;
        }
    }
    attrs.retain(|(k, _)| !FILL_ATTRS.contains(&k.as_str()) && !PACKING_ATTRS.contains(&k.as_str()));
}

pub fn coordinates_of(attrs: &Attributes) -> Vec<String> {
    attr(attrs, COORDINATES_ATTR)
        .and_then(AttrValue::as_text)
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Copy of `attrs` whose `coordinates` lists `names` after any it already had.
pub fn with_coordinates(attrs: &Attributes, names: &[&str]) -> Attributes {
    let mut out = attrs.clone();
    if names.is_empty() {
        return out;
    }
    let mut listed = coordinates_of(attrs);
    for name in names {
        if !listed.iter().any(|n| n == name) {
            listed.push(name.to_string());
        }
    }
    set_attr(&mut out, COORDINATES_ATTR, AttrValue::Text(listed.join(" ")));
    out
}

/// Mark the named variables as coordinates and drop `coordinates` from the rest,
/// since the writer regenerates it.
pub fn recover_coordinate_roles(variables: &mut [Variable], names: &[String]) {
    for variable in variables.iter_mut() {
        if names.contains(&variable.name) {
            variable.role = VariableRole::Coordinate;
        }
        if variable.role == VariableRole::Data {
            variable.attrs.retain(|(k, _)| k != COORDINATES_ATTR);
        }
    }
}

/// Split a `[rows, width]` char array into strings, trimming NUL and space padding.
pub fn char_rows(bytes: &[u8], rows: usize, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![String::new(); rows];
    }
    bytes
        .chunks(width)
        .take(rows)
        .map(|row| {
            let end = row
                .iter()
                .rposition(|&b| b != 0 && b != b' ')
                .map_or(0, |i| i + 1);
            String::from_utf8_lossy(&row[..end]).into_owned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_applies_fill_then_scale() {
        let mut attrs: Attributes = vec![
            ("_FillValue".to_string(), AttrValue::Number(-1.0)),
            ("scale_factor".to_string(), AttrValue::Number(0.5)),
            ("add_offset".to_string(), AttrValue::Number(1000.0)),
            ("units".to_string(), "hPa".into()),
        ];
        let mut values = vec![0.0, 3.0, -1.0];
        unpack(&mut values, &mut attrs);
        assert_eq!(values[0], 1000.0);
        assert_eq!(values[1], 1001.5);
        assert!(values[2].is_nan());
        assert_eq!(attrs, vec![("units".to_string(), AttrValue::from("hPa"))]);
    }

    #[test]
    fn unpack_honours_every_missing_value() {
        let mut attrs: Attributes = vec![(
            "missing_value".to_string(),
            AttrValue::Numbers(vec![-999.0, 9999.0]),
        )];
        let mut values = vec![-999.0, 2.0, 9999.0];
        unpack(&mut values, &mut attrs);
        assert!(values[0].is_nan());
        assert_eq!(values[1], 2.0);
        assert!(values[2].is_nan());
        assert!(attrs.is_empty());
    }

    #[test]
    fn coordinates_list_is_extended_without_duplicates() {
        let attrs: Attributes = vec![(COORDINATES_ATTR.to_string(), "lat lon".into())];
        assert_eq!(coordinates_of(&attrs), vec!["lat", "lon"]);
        let out = with_coordinates(&attrs, &["lon", "section", "lat_ship"]);
        assert_eq!(
            attr(&out, COORDINATES_ATTR).and_then(AttrValue::as_text),
            Some("lat lon section lat_ship")
        );
        assert!(with_coordinates(&Vec::new(), &[]).is_empty());
    }

    #[test]
    fn roles_follow_coordinates_attribute() {
        let mut variables = vec![
            Variable::numeric("lat", vec![1.0]),
            Variable::numeric("t_air", vec![2.0]).with_attr(COORDINATES_ATTR, "lat"),
        ];
        let names = coordinates_of(&variables[1].attrs);
        recover_coordinate_roles(&mut variables, &names);
        assert!(variables[0].is_coordinate());
        assert!(!variables[1].is_coordinate());
        assert!(variables[1].attr(COORDINATES_ATTR).is_none());
    }

    #[test]
    fn char_rows_trim_padding() {
        let bytes = b"Drake\0\0\0Ushuaia ";
        assert_eq!(char_rows(bytes, 2, 8), vec!["Drake", "Ushuaia"]);
        assert_eq!(char_rows(&[], 2, 0), vec!["", ""]);
    }
}

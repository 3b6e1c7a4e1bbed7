//! netCDF reader/writer for [`Dataset`].
//!
//! Variables along `time` alone (and `[time, strlen]` char arrays) become
//! [`Variable`]s: packed values are unpacked and fill values read as `NaN`.
//! Everything else is carried through as a [`RawVariable`] with its stored
//! values and attributes untouched. A variable that fits neither is an error.

use std::path::Path;

use netcdf::AttributeValue;
use tracing::{debug, warn};

use crate::cf_attrs::{char_rows, coordinates_of, recover_coordinate_roles, unpack, with_coordinates};
use crate::dataset::{
    AttrValue, Attributes, Dataset, RawVariable, Variable, VariableData, VariableRole, TIME_NAME,
};
use crate::{Result, ShipPosError};

fn convert_attr(value: AttributeValue) -> Option<AttrValue> {
    use AttributeValue as A;
    let many = |v: Vec<f64>| {
        if v.len() == 1 {
            AttrValue::Number(v[0])
        } else {
            AttrValue::Numbers(v)
        }
    };
    Some(match value {
        A::Str(s) => AttrValue::Text(s),
        A::Strs(s) => AttrValue::Text(s.join("\n")),
        A::Double(v) => AttrValue::Number(v),
        A::Float(v) => AttrValue::Number(v as f64),
        A::Int(v) => AttrValue::Number(v as f64),
        A::Uint(v) => AttrValue::Number(v as f64),
        A::Short(v) => AttrValue::Number(v as f64),
        A::Ushort(v) => AttrValue::Number(v as f64),
        A::Schar(v) => AttrValue::Number(v as f64),
        A::Uchar(v) => AttrValue::Number(v as f64),
        A::Longlong(v) => AttrValue::Number(v as f64),
        A::Ulonglong(v) => AttrValue::Number(v as f64),
        A::Doubles(v) => many(v),
        A::Floats(v) => many(v.into_iter().map(f64::from).collect()),
        A::Ints(v) => many(v.into_iter().map(f64::from).collect()),
        A::Uints(v) => many(v.into_iter().map(f64::from).collect()),
        A::Shorts(v) => many(v.into_iter().map(f64::from).collect()),
        A::Ushorts(v) => many(v.into_iter().map(f64::from).collect()),
        A::Schars(v) => many(v.into_iter().map(f64::from).collect()),
        A::Uchars(v) => many(v.into_iter().map(f64::from).collect()),
        A::Longlongs(v) => many(v.into_iter().map(|x| x as f64).collect()),
        A::Ulonglongs(v) => many(v.into_iter().map(|x| x as f64).collect()),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

fn read_attrs<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Result<Attributes> {
    let mut out = Vec::new();
    for a in attrs {
        let name = a.name().to_string();
        match convert_attr(a.value()?) {
            Some(value) => out.push((name, value)),
            None => warn!("Skipping attribute {} of unsupported type", name),
        }
    }
    Ok(out)
}

fn unsupported(name: &str, reason: impl ToString) -> ShipPosError {
    ShipPosError::UnsupportedVariable {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn read_time_series(var: &netcdf::Variable<'_>, len: usize, attrs: &mut Attributes) -> Result<VariableData> {
    if let Ok(mut values) = var.get_values::<f64, _>(..) {
        unpack(&mut values, attrs);
        return Ok(VariableData::Numeric(values.into()));
    }
    (0..len)
        .map(|i| var.get_string(&[i][..]))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(VariableData::Text)
        .map_err(|err| unsupported(&var.name(), err))
}

pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = netcdf::open(path)?;

    let time_var = file
        .variable(TIME_NAME)
        .ok_or_else(|| ShipPosError::MissingVariable(TIME_NAME.to_string()))?;
    let time_raw: Vec<f64> = time_var.get_values::<f64, _>(..)?;
    let time_attrs = read_attrs(time_var.attributes())?;
    let mut dataset = Dataset::new(time_raw, time_attrs)?;
    dataset.global_attrs = read_attrs(file.attributes())?;
    dataset.dimensions = file
        .dimensions()
        .filter(|d| d.name() != TIME_NAME)
        .map(|d| (d.name(), d.len()))
        .collect();

    let mut coordinate_names = Vec::new();
    for var in file.variables() {
        let name = var.name();
        if name == TIME_NAME {
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let mut attrs = read_attrs(var.attributes())?;
        coordinate_names.extend(coordinates_of(&attrs));

        let on_time = dims.first().map(String::as_str) == Some(TIME_NAME);
        let data = if on_time && dims.len() == 1 {
            Some(read_time_series(&var, dataset.len(), &mut attrs)?)
        } else if on_time && dims.len() == 2 && var.get_values::<f64, _>(..).is_err() {
            let width = var.dimensions()[1].len();
            let bytes = var.get_raw_values(..).map_err(|err| unsupported(&name, err))?;
            Some(VariableData::Text(char_rows(&bytes, dataset.len(), width)))
        } else {
            None
        };

        match data {
            Some(data) => dataset.push_variable(Variable {
                name,
                role: VariableRole::Data,
                data,
                attrs,
            })?,
            None => {
                let values = var
                    .get_values::<f64, _>(..)
                    .map_err(|err| unsupported(&name, err))?;
                debug!("Carrying {} {:?} through unchanged", name, dims);
                dataset.passthrough.push(RawVariable {
                    name,
                    dims,
                    values,
                    attrs,
                });
            }
        }
    }

    recover_coordinate_roles(&mut dataset.variables, &coordinate_names);
    debug!(
        "Read {} time steps, {} variables ({} carried) from {}",
        dataset.len(),
        dataset.variables.len(),
        dataset.passthrough.len(),
        path.display()
    );
    Ok(dataset)
}

fn put_attrs(var: &mut netcdf::VariableMut<'_>, attrs: &Attributes) -> Result<()> {
    for (name, value) in attrs {
        match value {
            AttrValue::Text(s) => var.put_attribute(name, s.as_str())?,
            AttrValue::Number(v) => var.put_attribute(name, *v)?,
            AttrValue::Numbers(v) => var.put_attribute(name, v.clone())?,
        };
    }
    Ok(())
}

pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut file = netcdf::create(path)?;
    file.add_dimension(TIME_NAME, dataset.len())?;
    for (name, len) in &dataset.dimensions {
        file.add_dimension(name, *len)?;
    }
    for (name, value) in &dataset.global_attrs {
        match value {
            AttrValue::Text(s) => file.add_attribute(name, s.as_str())?,
            AttrValue::Number(v) => file.add_attribute(name, *v)?,
            AttrValue::Numbers(v) => file.add_attribute(name, v.clone())?,
        };
    }

    {
        let mut time = file.add_variable::<f64>(TIME_NAME, &[TIME_NAME])?;
        put_attrs(&mut time, &dataset.time_attrs)?;
        time.put_values(&dataset.time_raw, ..)?;
    }

    let coordinates = dataset.coordinate_names();
    for variable in &dataset.variables {
        let attrs = if variable.is_coordinate() {
            variable.attrs.clone()
        } else {
            with_coordinates(&variable.attrs, &coordinates)
        };
        match &variable.data {
            VariableData::Numeric(values) => {
                let mut var = file.add_variable::<f64>(&variable.name, &[TIME_NAME])?;
                var.set_fill_value(f64::NAN)?;
                put_attrs(&mut var, &attrs)?;
                var.put_values(&values.to_vec(), ..)?;
            }
            VariableData::Text(values) => {
                let mut var = file.add_string_variable(&variable.name, &[TIME_NAME])?;
                put_attrs(&mut var, &attrs)?;
                for (i, s) in values.iter().enumerate() {
                    var.put_string(s, &[i][..])?;
                }
            }
        }
    }

    for raw in &dataset.passthrough {
        let dims: Vec<&str> = raw.dims.iter().map(String::as_str).collect();
        let mut var = file.add_variable::<f64>(&raw.name, &dims)?;
        put_attrs(&mut var, &raw.attrs)?;
        var.put_values(&raw.values, ..)?;
    }
    debug!(
        "Wrote {} variables ({} carried) to {}",
        dataset.variables.len() + dataset.passthrough.len(),
        dataset.passthrough.len(),
        path.display()
    );
    Ok(())
}

//! In-memory model of a 1-D, time-indexed self-describing dataset.

use ndarray::Array1;

use crate::cf_time::{decode_times, encode_times, EPOCH_SECONDS_UNITS};
use crate::{Result, ShipPosError, Timestamp};

pub const TIME_NAME: &str = "time";

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Numbers(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

/// Ordered attribute list; insertion order is kept on write.
pub type Attributes = Vec<(String, AttrValue)>;

pub fn attr<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a AttrValue> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

pub fn set_attr(attrs: &mut Attributes, name: &str, value: AttrValue) {
    match attrs.iter_mut().find(|(k, _)| k == name) {
        Some(slot) => slot.1 = value,
        None => attrs.push((name.to_string(), value)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableRole {
    Coordinate,
    Data,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VariableData {
    /// `NaN` marks missing values.
    Numeric(Array1<f64>),
    Text(Vec<String>),
}

impl VariableData {
    pub fn len(&self) -> usize {
        match self {
            VariableData::Numeric(v) => v.len(),
            VariableData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub role: VariableRole,
    pub data: VariableData,
    pub attrs: Attributes,
}

impl Variable {
    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            role: VariableRole::Data,
            data: VariableData::Numeric(Array1::from_vec(values)),
            attrs: Vec::new(),
        }
    }

    pub fn text(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            role: VariableRole::Data,
            data: VariableData::Text(values),
            attrs: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: VariableRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        set_attr(&mut self.attrs, name, value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        attr(&self.attrs, name)
    }

    pub fn is_coordinate(&self) -> bool {
        self.role == VariableRole::Coordinate
    }
}

/// Variable off the time axis (or not 1-D), kept as stored and written back unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub values: Vec<f64>,
    pub attrs: Attributes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    /// Decoded `time` coordinate.
    pub time: Vec<Timestamp>,
    /// `time` as stored on disk, written back unchanged.
    pub time_raw: Vec<f64>,
    pub time_attrs: Attributes,
    pub variables: Vec<Variable>,
    pub global_attrs: Attributes,
    /// Dimensions other than `time`, with their lengths.
    pub dimensions: Vec<(String, usize)>,
    pub passthrough: Vec<RawVariable>,
}

impl Dataset {
    /// Build from stored time values; the `units` attribute decodes them.
    pub fn new(time_raw: Vec<f64>, time_attrs: Attributes) -> Result<Self> {
        let units = attr(&time_attrs, "units")
            .and_then(AttrValue::as_text)
            .ok_or_else(|| ShipPosError::InvalidTime("time coordinate has no units".into()))?;
        let time = decode_times(&time_raw, units)?;
        Ok(Self {
            time,
            time_raw,
            time_attrs,
            variables: Vec::new(),
            global_attrs: Vec::new(),
            dimensions: Vec::new(),
            passthrough: Vec::new(),
        })
    }

    /// Build from timestamps, stored as seconds since the Unix epoch.
    pub fn from_timestamps(time: Vec<Timestamp>) -> Result<Self> {
        let time_raw = encode_times(&time, EPOCH_SECONDS_UNITS)?;
        Ok(Self {
            time,
            time_raw,
            time_attrs: vec![
                ("standard_name".to_string(), "time".into()),
                ("units".to_string(), EPOCH_SECONDS_UNITS.into()),
            ],
            variables: Vec::new(),
            global_attrs: Vec::new(),
            dimensions: Vec::new(),
            passthrough: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn numeric(&self, name: &str) -> Result<&Array1<f64>> {
        match self.variable(name).map(|v| &v.data) {
            Some(VariableData::Numeric(values)) => Ok(values),
            Some(VariableData::Text(_)) => Err(ShipPosError::InvalidParameter(format!(
                "variable {} is not numeric",
                name
            ))),
            None => Err(ShipPosError::MissingVariable(name.to_string())),
        }
    }

    /// Add a variable, replacing any existing one of the same name in place.
    pub fn push_variable(&mut self, variable: Variable) -> Result<()> {
        if variable.data.len() != self.len() {
            return Err(ShipPosError::LengthMismatch {
                expected: self.len(),
                actual: variable.data.len(),
            });
        }
        if variable.name == TIME_NAME {
            return Err(ShipPosError::InvalidParameter(
                "time is managed by the dataset itself".into(),
            ));
        }
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(slot) => *slot = variable,
            None => self.variables.push(variable),
        }
        Ok(())
    }

    /// Attach a numeric coordinate along `time`.
    pub fn assign_coord(&mut self, name: &str, values: Array1<f64>, attrs: Attributes) -> Result<()> {
        self.push_variable(Variable {
            name: name.to_string(),
            role: VariableRole::Coordinate,
            data: VariableData::Numeric(values),
            attrs,
        })
    }

    pub fn coordinate_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|v| v.is_coordinate())
            .map(|v| v.name.as_str())
            .collect()
    }
}

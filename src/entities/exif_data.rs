use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single EXIF value. Rationals are reduced to floats at extraction time so
/// the tree serializes to plain JSON scalars; raw byte payloads keep their own
/// variant so sanitation can recognize and drop them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExifValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<ExifValue>),
    Group(ExifGroup),
}

/// A named group of EXIF fields. Field order is lexicographic so repeated
/// runs serialize the manifest byte-identically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExifGroup {
    pub fields: BTreeMap<String, ExifValue>,
}

impl ExifValue {
    pub fn from_rational(numerator: u32, denominator: u32) -> Self {
        if denominator == 0 {
            return ExifValue::Float(0.0);
        }
        ExifValue::Float(numerator as f64 / denominator as f64)
    }

    pub fn from_signed_rational(numerator: i32, denominator: i32) -> Self {
        if denominator == 0 {
            return ExifValue::Float(0.0);
        }
        ExifValue::Float(numerator as f64 / denominator as f64)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExifValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ExifValue::Int(value) => Some(*value),
            ExifValue::Float(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ExifValue::Int(value) => Some(*value as f64),
            ExifValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Degrees/minutes/seconds triple reduced to decimal degrees.
    pub fn as_decimal_degrees(&self) -> Option<f64> {
        match self {
            ExifValue::List(parts) => {
                let degrees = parts.first()?.as_float()?;
                let minutes = parts.get(1).and_then(ExifValue::as_float).unwrap_or(0.0);
                let seconds = parts.get(2).and_then(ExifValue::as_float).unwrap_or(0.0);
                Some(degrees + minutes / 60.0 + seconds / 3600.0)
            }
            ExifValue::Int(_) | ExifValue::Float(_) => self.as_float(),
            _ => None,
        }
    }
}

impl ExifGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ExifValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ExifValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ExifValue> {
        self.fields.remove(name)
    }

    pub fn group(&self, name: &str) -> Option<&ExifGroup> {
        match self.fields.get(name) {
            Some(ExifValue::Group(group)) => Some(group),
            _ => None,
        }
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ExifGroup> {
        match self.fields.get_mut(name) {
            Some(ExifValue::Group(group)) => Some(group),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(ExifValue::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

use serde::{Deserialize, Serialize};

use crate::CellCoord;

/// A value to be written into a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UpdateValue {
    Text(String),
    Number(f64),
    /// Remove the cell's value (its style and other attributes stay).
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Number,
    Empty,
}

impl UpdateValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            UpdateValue::Text(_) => ValueKind::Text,
            UpdateValue::Number(_) => ValueKind::Number,
            UpdateValue::Empty => ValueKind::Empty,
        }
    }

    /// SpreadsheetML has no representation for NaN or infinities.
    pub fn is_representable(&self) -> bool {
        match self {
            UpdateValue::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

impl From<f64> for UpdateValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for UpdateValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for UpdateValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// One requested write: `(coordinate, value)`; the value carries its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub coord: CellCoord,
    pub value: UpdateValue,
}

impl CellUpdate {
    pub fn new(coord: CellCoord, value: impl Into<UpdateValue>) -> Self {
        Self {
            coord,
            value: value.into(),
        }
    }

    pub fn clear(coord: CellCoord) -> Self {
        Self {
            coord,
            value: UpdateValue::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_shape_is_tagged() {
        let json = serde_json::to_string(&UpdateValue::Number(12.5)).unwrap();
        assert_eq!(json, r#"{"kind":"number","value":12.5}"#);
        let back: UpdateValue = serde_json::from_str(r#"{"kind":"empty"}"#).unwrap();
        assert_eq!(back, UpdateValue::Empty);
    }

    #[test]
    fn non_finite_numbers_are_not_representable() {
        assert!(UpdateValue::Number(1.0).is_representable());
        assert!(!UpdateValue::Number(f64::NAN).is_representable());
        assert!(!UpdateValue::Number(f64::INFINITY).is_representable());
        assert!(UpdateValue::Empty.is_representable());
    }
}

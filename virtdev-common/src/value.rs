use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed value of a single object-bus property.
///
/// Serialized untagged, so a property travels on the bus as a plain JSON
/// scalar (`null`, `3`, `21.5`, `"Galley"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BusValue {
    /// No value reported yet.
    #[default]
    Null,

    /// Integer value (states, codes, identities).
    Int(i64),

    /// Floating point measurement.
    Float(f64),

    /// Text value (names, units).
    Text(String),
}

impl BusValue {
    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Int(v) => Some(*v as f64),
            BusValue::Float(v) => Some(*v),
            BusValue::Text(s) => s.trim().parse().ok(),
            BusValue::Null => None,
        }
    }

    /// Integer view of the value; floats are accepted only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BusValue::Int(v) => Some(*v),
            BusValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            BusValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BusValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BusValue::Null)
    }
}

/// Display form used when a value is persisted to the configuration store.
impl fmt::Display for BusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusValue::Null => Ok(()),
            BusValue::Int(v) => write!(f, "{}", v),
            BusValue::Float(v) => write!(f, "{}", v),
            BusValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for BusValue {
    fn from(v: i64) -> Self {
        BusValue::Int(v)
    }
}

impl From<i32> for BusValue {
    fn from(v: i32) -> Self {
        BusValue::Int(v as i64)
    }
}

impl From<u8> for BusValue {
    fn from(v: u8) -> Self {
        BusValue::Int(v as i64)
    }
}

impl From<bool> for BusValue {
    fn from(v: bool) -> Self {
        BusValue::Int(v as i64)
    }
}

impl From<f64> for BusValue {
    fn from(v: f64) -> Self {
        BusValue::Float(v)
    }
}

impl From<String> for BusValue {
    fn from(v: String) -> Self {
        BusValue::Text(v)
    }
}

impl From<&str> for BusValue {
    fn from(v: &str) -> Self {
        BusValue::Text(v.to_string())
    }
}

impl<T: Into<BusValue>> From<Option<T>> for BusValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(BusValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_shape() {
        assert_eq!(serde_json::to_string(&BusValue::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&BusValue::Int(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&BusValue::Float(0.1)).unwrap(), "0.1");
        assert_eq!(
            serde_json::to_string(&BusValue::from("Galley")).unwrap(),
            "\"Galley\""
        );
    }

    #[test]
    fn test_json_integers_stay_integers() {
        let v: BusValue = serde_json::from_str("1").unwrap();
        assert_eq!(v, BusValue::Int(1));

        let v: BusValue = serde_json::from_str("1.5").unwrap();
        assert_eq!(v, BusValue::Float(1.5));

        let v: BusValue = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(BusValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(BusValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(BusValue::Float(2.5).as_i64(), None);
        assert_eq!(BusValue::from(" 12 ").as_i64(), Some(12));
        assert_eq!(BusValue::Null.as_f64(), None);
    }

    #[test]
    fn test_display_for_persistence() {
        assert_eq!(BusValue::Float(0.25).to_string(), "0.25");
        assert_eq!(BusValue::Int(42).to_string(), "42");
        assert_eq!(BusValue::from("fresh water").to_string(), "fresh water");
        assert_eq!(BusValue::Null.to_string(), "");
    }
}

//! Property tree of one device instance.

use std::collections::HashMap;

use virtdev_common::BusValue;

#[derive(Debug, Clone, PartialEq)]
struct Property {
    value: BusValue,
    writable: bool,
}

/// Ordered map of bus paths to cached values.
///
/// Iteration follows registration order, which is also the order the tree
/// is published in.
#[derive(Debug, Clone, Default)]
pub struct PropertyTree {
    properties: Vec<(String, Property)>,
    index: HashMap<String, usize>,
}

impl PropertyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read-only property.
    pub fn add(&mut self, path: impl Into<String>, value: impl Into<BusValue>) -> &mut Self {
        self.insert(path.into(), value.into(), false)
    }

    /// Register a property the bus may write.
    pub fn add_writable(&mut self, path: impl Into<String>, value: impl Into<BusValue>) -> &mut Self {
        self.insert(path.into(), value.into(), true)
    }

    fn insert(&mut self, path: String, value: BusValue, writable: bool) -> &mut Self {
        let property = Property { value, writable };
        match self.index.get(&path) {
            Some(&i) => self.properties[i].1 = property,
            None => {
                self.index.insert(path.clone(), self.properties.len());
                self.properties.push((path, property));
            }
        }
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&BusValue> {
        self.index.get(path).map(|&i| &self.properties[i].1.value)
    }

    /// Numeric value of `path`, 0 when absent or not numeric.
    pub fn get_f64(&self, path: &str) -> f64 {
        self.get(path).and_then(BusValue::as_f64).unwrap_or(0.0)
    }

    /// Integer value of `path`, 0 when absent or not integral.
    pub fn get_i64(&self, path: &str) -> i64 {
        self.get(path).and_then(BusValue::as_i64).unwrap_or(0)
    }

    pub fn is_writable(&self, path: &str) -> bool {
        self.index
            .get(path)
            .is_some_and(|&i| self.properties[i].1.writable)
    }

    /// Replace the value of a registered property.
    ///
    /// Returns `true` only when the value actually changed; numerically
    /// equal values of different representation count as unchanged.
    pub fn set(&mut self, path: &str, value: BusValue) -> bool {
        let Some(&i) = self.index.get(path) else {
            tracing::warn!(path = %path, "Update for unregistered property ignored");
            return false;
        };
        let current = &mut self.properties[i].1.value;
        if same_value(current, &value) {
            return false;
        }
        *current = value;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BusValue)> {
        self.properties
            .iter()
            .map(|(path, property)| (path.as_str(), &property.value))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

fn same_value(a: &BusValue, b: &BusValue) -> bool {
    match (a, b) {
        (BusValue::Int(x), BusValue::Float(y)) | (BusValue::Float(y), BusValue::Int(x)) => {
            *x as f64 == *y
        }
        _ => a == b,
    }
}

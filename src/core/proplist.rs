//! Ordered property list: two parallel sequences of keys and values.
//!
//! Keys and values are only ever mutated together, so index `i` of one
//! always pairs with index `i` of the other. Lookup is by case-insensitive
//! name against `Symbol` or `String` keys and returns the first match.

use crate::core::value::Value;
use std::fmt;
use thiserror::Error;

/// Raised when a property lookup finds no matching key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("property not found: {0}")]
pub struct PropertyNotFound(pub String);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropList {
    keys: Vec<Value>,
    values: Vec<Value>,
}

impl PropList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Appends a pair without checking for an existing key.
    pub fn push(&mut self, key: Value, value: Value) {
        self.keys.push(key);
        self.values.push(value);
    }

    /// Builder-style append with a symbol key.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.push(Value::symbol(name), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|key| {
            key.as_str()
                .map(|k| k.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
    }

    /// First value whose key matches `name`, ignoring case.
    pub fn get(&self, name: &str) -> Result<&Value, PropertyNotFound> {
        self.find(name)
            .ok_or_else(|| PropertyNotFound(name.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.values[i])
    }

    /// Replaces the first matching value, or appends a new symbol-keyed pair.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.position(name) {
            Some(i) => self.values[i] = value,
            None => self.push(Value::symbol(name), value),
        }
    }

    /// Removes the first matching pair and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let i = self.position(name)?;
        self.keys.remove(i);
        Some(self.values.remove(i))
    }

    pub fn key_at(&self, index: usize) -> Option<&Value> {
        self.keys.get(index)
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.keys.iter().zip(self.values.iter())
    }
}

impl FromIterator<(Value, Value)> for PropList {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut list = PropList::new();
        for (k, v) in iter {
            list.push(k, v);
        }
        list
    }
}

impl fmt::Display for PropList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("[:]");
        }
        f.write_str("[")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str("]")
    }
}

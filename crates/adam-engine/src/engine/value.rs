//! Expression values.
//!
//! [`Value`] is the closed sum type every cell, stack slot and function
//! argument holds. Aggregates and strings are reference counted, so cloning a
//! value for a VM push never copies the payload.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::name::Name;

pub type Array = Arc<Vec<Value>>;
pub type Dictionary = Arc<BTreeMap<Name, Value>>;

/// A dynamically typed expression value. Equality is structural.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Undefined,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Name(Name),
    Array(Array),
    Dictionary(Dictionary),
}

impl Value {
    pub fn string(text: &str) -> Value {
        Value::String(Arc::from(text))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(items))
    }

    pub fn dictionary<I>(entries: I) -> Value
    where
        I: IntoIterator<Item = (Name, Value)>,
    {
        Value::Dictionary(Arc::new(entries.into_iter().collect()))
    }

    /// The type name reported by `typeof` and in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Name(_) => "name",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
        }
    }

    /// Structural identity: `==` except that NaN is identical to NaN. Used to
    /// decide whether a recomputed value changed.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_identical(y))
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.is_identical(vb))
            }
            _ => self == other,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<Name> {
        match self {
            Value::Name(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<Name, Value>> {
        match self {
            Value::Dictionary(entries) => Some(entries),
            _ => None,
        }
    }

    /// The number as an integer, if it has no fractional part and fits.
    pub fn as_integer(&self) -> Option<i64> {
        let n = self.as_number()?;
        if n.is_finite() && n == n.trunc() && n.abs() <= i64::MAX as f64 {
            Some(n as i64)
        } else {
            None
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Name> for Value {
    fn from(n: Name) -> Self {
        Value::Name(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Name(n) => n.serialize(serializer),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dictionary(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

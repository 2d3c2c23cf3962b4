//! Wire value model
//!
//! [`Value`] is the tagged union carried by JSTP packets. It is a superset of
//! JSON: it adds `undefined` (also produced by array elision, `[1,,3]`) and
//! keeps 64-bit integers apart from floats so that values such as millisecond
//! timestamps survive a round trip exactly.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Numeric value: exact 64-bit integer or IEEE 754 double
///
/// Equality is numeric, so `Int(2) == Float(2.0)`; this mirrors the wire
/// format, where `2` and `2.0` denote the same number.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// Returns the integer a float is exactly equal to, if any
fn exact_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// Integer view; floats only convert when they hold an exact integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::Float(f) => exact_int(*f),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Number::Int(_))
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(f) => f.is_finite(),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                exact_int(*f) == Some(*i)
            }
        }
    }
}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.as_i64() {
            Some(i) => i.hash(state),
            None => self.as_f64().to_bits().hash(state),
        }
    }
}

/// A JSTP value
#[derive(Debug, Clone, PartialEq, Hash, Default)]
pub enum Value {
    #[default]
    Null,
    Undefined,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
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

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.as_i64())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.as_f64())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Name of the variant as the wire format's host language spells it
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Convert to plain JSON. `undefined` and non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Undefined => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(Number::Int(i)) => serde_json::Value::from(*i),
            Value::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(obj) => serde_json::Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Order-preserving string-keyed mapping
///
/// Keys are kept in the order they were last written: overwriting a key moves
/// it to the end, so the order record never holds a key twice and positional
/// lookup always agrees with the key set. Equality and hashing ignore order.
///
/// A moved key leaves a hole in the order record; holes are compacted away
/// once they outnumber live keys, so repeated overwrites stay amortized O(1).
#[derive(Debug, Clone, Default)]
pub struct Object {
    values: HashMap<String, Slot>,
    order: Vec<Option<String>>,
    holes: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    /// Position in `order`
    pos: usize,
    value: Value,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            holes: 0,
        }
    }

    /// Write a value, returning the previous one for this key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let pos = self.order.len();
        let previous = match self.values.get_mut(&key) {
            Some(slot) => {
                self.order[slot.pos] = None;
                self.holes += 1;
                slot.pos = pos;
                Some(std::mem::replace(&mut slot.value, value.into()))
            }
            None => {
                self.values.insert(
                    key.clone(),
                    Slot {
                        pos,
                        value: value.into(),
                    },
                );
                None
            }
        };
        self.order.push(Some(key));
        self.compact_if_sparse();
        previous
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key).map(|slot| &mut slot.value)
    }

    /// Positional lookup following the order record
    pub fn get_index(&self, index: usize) -> Option<(&str, &Value)> {
        let key = if self.holes == 0 {
            self.order.get(index)?.as_deref()?
        } else {
            self.keys().nth(index)?
        };
        self.get(key).map(|v| (key, v))
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        let pos = self.values.get(key)?.pos;
        let holes_before = if self.holes == 0 {
            0
        } else {
            self.order[..pos].iter().filter(|k| k.is_none()).count()
        };
        Some(pos - holes_before)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let slot = self.values.remove(key)?;
        self.order[slot.pos] = None;
        self.holes += 1;
        self.compact_if_sparse();
        Some(slot.value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().filter_map(|k| k.as_deref())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.keys()
            .filter_map(|k| self.values.get(k).map(|slot| (k, &slot.value)))
    }

    fn compact_if_sparse(&mut self) {
        if self.holes == 0 || self.holes <= self.values.len() {
            return;
        }
        self.order.retain(Option::is_some);
        for (pos, key) in self.order.iter().enumerate() {
            if let Some(slot) = key.as_deref().and_then(|k| self.values.get_mut(k)) {
                slot.pos = pos;
            }
        }
        self.holes = 0;
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .values
                .iter()
                .all(|(key, slot)| other.get(key) == Some(&slot.value))
    }
}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // sum of per-entry hashes keeps the result independent of order
        let mut combined = 0u64;
        for (key, slot) in &self.values {
            let mut entry = DefaultHasher::new();
            key.hash(&mut entry);
            slot.value.hash(&mut entry);
            combined = combined.wrapping_add(entry.finish());
        }
        self.values.len().hash(state);
        combined.hash(state);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut obj = Object::new();
        obj.extend(iter);
        obj
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Object {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Object {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(mut self) -> Self::IntoIter {
        let mut entries = Vec::with_capacity(self.values.len());
        for key in self.order.into_iter().flatten() {
            if let Some(slot) = self.values.remove(&key) {
                entries.push((key, slot.value));
            }
        }
        entries.into_iter()
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Number(Number::Int(v as i64))
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Number(Number::Int(i)),
            Err(_) => Value::Number(Number::Float(v as f64)),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(Number::Float(v as f64))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(Number::Int(i)),
                None => Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(map.into_iter().collect()),
        }
    }
}

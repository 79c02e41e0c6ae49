use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Numeric context value. Integers and floats are kept apart so that
/// `8080` prints as `8080`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn is_zero(&self) -> bool {
        match *self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

/// The structured data a template renders against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Context {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Context>),
    Record(BTreeMap<String, Context>),
}

impl Context {
    /// Build a context from any serializable value (structs become records).
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Context::from)
    }

    /// An empty record.
    pub fn record() -> Self {
        Context::Record(BTreeMap::new())
    }

    /// Insert `key` into a record, returning `self` for chaining. Has no
    /// effect on non-record values.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Context>) -> Self {
        if let Context::Record(map) = &mut self {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Context> {
        match self {
            Context::Record(map) => map.get(key),
            _ => None,
        }
    }

    /// Truthiness used by `if`: records are always true, whatever they hold.
    pub fn is_truthy(&self) -> bool {
        match self {
            Context::Null => false,
            Context::Bool(b) => *b,
            Context::Number(n) => !n.is_zero(),
            Context::String(s) => !s.is_empty(),
            Context::Sequence(items) => !items.is_empty(),
            Context::Record(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Context::Null => "null",
            Context::Bool(_) => "bool",
            Context::Number(_) => "number",
            Context::String(_) => "string",
            Context::Sequence(_) => "sequence",
            Context::Record(_) => "record",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Context::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Printed form used when an action outputs a value.
impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Null => Ok(()),
            Context::Bool(b) => write!(f, "{b}"),
            Context::Number(n) => write!(f, "{n}"),
            Context::String(s) => f.write_str(s),
            Context::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Context::Record(map) => {
                f.write_str("map[")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<serde_json::Value> for Context {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Context::Null,
            serde_json::Value::Bool(b) => Context::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Context::Number(Number::Int(i)),
                None => Context::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Context::String(s),
            serde_json::Value::Array(items) => {
                Context::Sequence(items.into_iter().map(Context::from).collect())
            }
            serde_json::Value::Object(map) => Context::Record(
                map.into_iter()
                    .map(|(key, value)| (key, Context::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Context {
    fn from(b: bool) -> Self {
        Context::Bool(b)
    }
}

impl From<&str> for Context {
    fn from(s: &str) -> Self {
        Context::String(s.to_string())
    }
}

impl From<String> for Context {
    fn from(s: String) -> Self {
        Context::String(s)
    }
}

impl From<Number> for Context {
    fn from(n: Number) -> Self {
        Context::Number(n)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Context {
                fn from(n: $ty) -> Self {
                    Context::Number(Number::Int(i64::from(n)))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Context {
    fn from(x: f64) -> Self {
        Context::Number(Number::Float(x))
    }
}

impl<T: Into<Context>> From<Vec<T>> for Context {
    fn from(items: Vec<T>) -> Self {
        Context::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Context>> From<Option<T>> for Context {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Context::Null)
    }
}

impl<K: Into<String>, V: Into<Context>> From<BTreeMap<K, V>> for Context {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Context>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Context::Record(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

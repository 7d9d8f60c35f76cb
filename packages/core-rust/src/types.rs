use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a bus value.
///
/// Mirrors the bus type system: fixed-width integers, doubles, strings,
/// object paths, and the four container kinds. Every [`Value`] has exactly
/// one `ValueType`, and every registered property or method argument is
/// declared with one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    /// Homogeneous array of the element type.
    Array(Box<ValueType>),
    /// Dictionary with a basic key type and any value type.
    Dict(Box<ValueType>, Box<ValueType>),
    /// Fixed sequence of fields.
    Struct(Vec<ValueType>),
    /// Self-describing boxed value.
    Variant,
}

impl ValueType {
    /// Basic types may be used as dictionary keys.
    #[must_use]
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            ValueType::Array(_) | ValueType::Dict(_, _) | ValueType::Struct(_) | ValueType::Variant
        )
    }

    /// Convenience constructor for `aT`.
    #[must_use]
    pub fn array(elem: ValueType) -> Self {
        ValueType::Array(Box::new(elem))
    }

    /// Convenience constructor for `a{KV}`.
    #[must_use]
    pub fn dict(key: ValueType, value: ValueType) -> Self {
        ValueType::Dict(Box::new(key), Box::new(value))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// A validated-by-convention object path (`/a/b`).
///
/// Kept as a distinct type so that `o` and `s` stay distinguishable in
/// method signatures. Validation happens at the registry boundary via
/// [`crate::names::validate_object_path`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectPath(pub String);

impl ObjectPath {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        ObjectPath(s.to_string())
    }
}

/// Runtime value in the bus variant representation.
///
/// Containers carry their element types so that an empty array or
/// dictionary still has a well-defined [`ValueType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    ObjectPath(ObjectPath),
    Array {
        elem: ValueType,
        items: Vec<Value>,
    },
    Dict {
        key: ValueType,
        value: ValueType,
        entries: Vec<(Value, Value)>,
    },
    Struct(Vec<Value>),
    Variant(Box<Value>),
}

impl Value {
    /// Returns the type this value carries.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Byte(_) => ValueType::Byte,
            Value::Int16(_) => ValueType::Int16,
            Value::UInt16(_) => ValueType::UInt16,
            Value::Int32(_) => ValueType::Int32,
            Value::UInt32(_) => ValueType::UInt32,
            Value::Int64(_) => ValueType::Int64,
            Value::UInt64(_) => ValueType::UInt64,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::ObjectPath(_) => ValueType::ObjectPath,
            Value::Array { elem, .. } => ValueType::array(elem.clone()),
            Value::Dict { key, value, .. } => ValueType::dict(key.clone(), value.clone()),
            Value::Struct(fields) => ValueType::Struct(fields.iter().map(Value::value_type).collect()),
            Value::Variant(_) => ValueType::Variant,
        }
    }

    /// Deep type check: the value's outer type must equal `ty`, and every
    /// array element / dictionary entry must match the declared element types.
    #[must_use]
    pub fn conforms_to(&self, ty: &ValueType) -> bool {
        match (self, ty) {
            (Value::Array { elem, items }, ValueType::Array(expected)) => {
                elem == expected.as_ref() && items.iter().all(|item| item.conforms_to(expected))
            }
            (
                Value::Dict {
                    key,
                    value,
                    entries,
                },
                ValueType::Dict(k, v),
            ) => {
                key == k.as_ref()
                    && value == v.as_ref()
                    && entries
                        .iter()
                        .all(|(ek, ev)| ek.conforms_to(k) && ev.conforms_to(v))
            }
            (Value::Struct(fields), ValueType::Struct(types)) => {
                fields.len() == types.len()
                    && fields.iter().zip(types).all(|(f, t)| f.conforms_to(t))
            }
            (Value::Variant(inner), ValueType::Variant) => inner.is_well_formed(),
            (Value::Variant(_), _) | (_, ValueType::Variant) => false,
            (v, t) => v.value_type() == *t,
        }
    }

    /// A value is well formed when its containers agree with their own
    /// declared element types.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.conforms_to(&self.value_type())
    }

    /// Wraps this value as a variant (`v`).
    #[must_use]
    pub fn into_variant(self) -> Value {
        Value::Variant(Box::new(self))
    }

    /// Builds a typed array from items that are expected to share `elem`.
    #[must_use]
    pub fn array(elem: ValueType, items: Vec<Value>) -> Value {
        Value::Array { elem, items }
    }
}

/// Maximum number of characters rendered for a single value in log output.
const DISPLAY_LIMIT: usize = 64;

impl fmt::Display for Value {
    /// Compact rendering intended for log lines; long strings and
    /// containers are truncated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => {
                if s.chars().count() > DISPLAY_LIMIT {
                    let head: String = s.chars().take(DISPLAY_LIMIT).collect();
                    write!(f, "{head:?}…")
                } else {
                    write!(f, "{s:?}")
                }
            }
            Value::ObjectPath(p) => write!(f, "{p}"),
            Value::Array { elem, items } => {
                write!(f, "a{elem}[{} items]", items.len())
            }
            Value::Dict { key, value, entries } => {
                write!(f, "a{{{key}{value}}}[{} entries]", entries.len())
            }
            Value::Struct(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
            Value::Variant(inner) => write!(f, "<{inner}>"),
        }
    }
}

/// Renders an argument list for diagnostics, e.g. `(6, 7)`.
#[must_use]
pub fn summarize_args(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

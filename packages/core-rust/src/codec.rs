//! Conversion between Rust values and the bus variant representation.
//!
//! - [`BusType`]: static declared type of a Rust type
//! - [`ToValue`] / [`FromValue`]: single value encode/decode
//! - [`FromArgs`] / [`IntoArgs`]: whole argument lists as tuples
//! - [`ReturnArgs`]: method return values (`()`, one value, or a tuple)

use std::collections::BTreeMap;

use crate::types::{ObjectPath, Value, ValueType};

/// Errors from decoding values or parsing signatures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },
    #[error("argument count mismatch: expected {expected}, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("invalid signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },
    #[error("frame encoding failed: {0}")]
    Frame(String),
}

impl CodecError {
    fn mismatch(expected: &ValueType, found: &Value) -> Self {
        CodecError::TypeMismatch {
            expected: expected.signature(),
            found: found.value_type().signature(),
        }
    }
}

// ---------------------------------------------------------------------------
// Single values
// ---------------------------------------------------------------------------

/// A Rust type with a fixed bus type.
pub trait BusType {
    fn value_type() -> ValueType;
}

/// Encodes a Rust value as a bus [`Value`].
pub trait ToValue: BusType {
    fn to_value(&self) -> Value;
}

/// Decodes a bus [`Value`] into a Rust value.
pub trait FromValue: BusType + Sized {
    /// # Errors
    ///
    /// Returns `CodecError::TypeMismatch` if the value does not carry
    /// `Self::value_type()`.
    fn from_value(value: Value) -> Result<Self, CodecError>;
}

macro_rules! scalar_codec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl BusType for $ty {
                fn value_type() -> ValueType {
                    ValueType::$variant
                }
            }

            impl ToValue for $ty {
                #[allow(clippy::clone_on_copy)]
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, CodecError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(CodecError::mismatch(&ValueType::$variant, &other)),
                    }
                }
            }
        )*
    };
}

scalar_codec!(
    bool => Bool,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => String,
    ObjectPath => ObjectPath,
);

impl BusType for &str {
    fn value_type() -> ValueType {
        ValueType::String
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::String((*self).to_string())
    }
}

impl<T: BusType> BusType for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::array(T::value_type())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array {
            elem: T::value_type(),
            items: self.iter().map(ToValue::to_value).collect(),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        let expected = Self::value_type();
        match value {
            Value::Array { elem, items } if elem == T::value_type() => {
                items.into_iter().map(T::from_value).collect()
            }
            other => Err(CodecError::mismatch(&expected, &other)),
        }
    }
}

impl<K: BusType, V: BusType> BusType for BTreeMap<K, V> {
    fn value_type() -> ValueType {
        ValueType::dict(K::value_type(), V::value_type())
    }
}

impl<K: ToValue, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Value {
        Value::Dict {
            key: K::value_type(),
            value: V::value_type(),
            entries: self
                .iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        }
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        let expected = Self::value_type();
        match value {
            Value::Dict {
                key,
                value: value_type,
                entries,
            } if key == K::value_type() && value_type == V::value_type() => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(CodecError::mismatch(&expected, &other)),
        }
    }
}

/// `Value` itself maps to the variant type `v`.
impl BusType for Value {
    fn value_type() -> ValueType {
        ValueType::Variant
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        Value::Variant(Box::new(self.clone()))
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Variant(inner) => Ok(*inner),
            other => Err(CodecError::mismatch(&ValueType::Variant, &other)),
        }
    }
}

/// Decodes a value, first checking it conforms to the declared type.
///
/// # Errors
///
/// Returns `CodecError::TypeMismatch` on any disagreement.
pub fn decode<T: FromValue>(value: Value) -> Result<T, CodecError> {
    let expected = T::value_type();
    if !value.conforms_to(&expected) {
        return Err(CodecError::mismatch(&expected, &value));
    }
    T::from_value(value)
}

// ---------------------------------------------------------------------------
// Argument lists
// ---------------------------------------------------------------------------

/// A tuple that can be decoded from an inbound argument list.
pub trait FromArgs: Sized {
    /// Declared input types, in order.
    fn signature() -> Vec<ValueType>;

    /// # Errors
    ///
    /// Returns `ArityMismatch` or `TypeMismatch` when `args` disagree with
    /// [`FromArgs::signature`].
    fn from_args(args: Vec<Value>) -> Result<Self, CodecError>;
}

/// A tuple that can be encoded into an outbound argument list.
pub trait IntoArgs {
    fn signature() -> Vec<ValueType>;
    fn into_args(self) -> Vec<Value>;
}

/// A method return value. `()` has no outputs, a single value has one,
/// and a tuple has one output per field.
pub trait ReturnArgs {
    fn signature() -> Vec<ValueType>;
    fn into_reply(self) -> Vec<Value>;
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! tuple_args {
    ($($name:ident),*) => {
        impl<$($name: FromValue),*> FromArgs for ($($name,)*) {
            fn signature() -> Vec<ValueType> {
                vec![$($name::value_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn from_args(args: Vec<Value>) -> Result<Self, CodecError> {
                let expected = count!($($name)*);
                if args.len() != expected {
                    return Err(CodecError::ArityMismatch { expected, found: args.len() });
                }
                let mut iter = args.into_iter();
                $(
                    let $name = match iter.next() {
                        Some(value) => decode::<$name>(value)?,
                        None => return Err(CodecError::ArityMismatch { expected, found: 0 }),
                    };
                )*
                Ok(($($name,)*))
            }
        }

        impl<$($name: ToValue),*> IntoArgs for ($($name,)*) {
            fn signature() -> Vec<ValueType> {
                vec![$($name::value_type()),*]
            }

            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Value> {
                let ($($name,)*) = self;
                vec![$($name.to_value()),*]
            }
        }

        impl<$($name: ToValue),*> ReturnArgs for ($($name,)*) {
            fn signature() -> Vec<ValueType> {
                vec![$($name::value_type()),*]
            }

            #[allow(non_snake_case)]
            fn into_reply(self) -> Vec<Value> {
                let ($($name,)*) = self;
                vec![$($name.to_value()),*]
            }
        }
    };
}

tuple_args!();
tuple_args!(A);
tuple_args!(A, B);
tuple_args!(A, B, C);
tuple_args!(A, B, C, D);
tuple_args!(A, B, C, D, E);
tuple_args!(A, B, C, D, E, F);
tuple_args!(A, B, C, D, E, F, G);
tuple_args!(A, B, C, D, E, F, G, H);

macro_rules! single_return {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ReturnArgs for $ty {
                fn signature() -> Vec<ValueType> {
                    vec![<$ty as BusType>::value_type()]
                }

                fn into_reply(self) -> Vec<Value> {
                    vec![self.to_value()]
                }
            }
        )*
    };
}

single_return!(bool, u8, i16, u16, i32, u32, i64, u64, f64, String, ObjectPath, Value);

impl<T: ToValue> ReturnArgs for Vec<T> {
    fn signature() -> Vec<ValueType> {
        vec![Self::value_type()]
    }

    fn into_reply(self) -> Vec<Value> {
        vec![self.to_value()]
    }
}

impl<K: ToValue, V: ToValue> ReturnArgs for BTreeMap<K, V> {
    fn signature() -> Vec<ValueType> {
        vec![Self::value_type()]
    }

    fn into_reply(self) -> Vec<Value> {
        vec![self.to_value()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_to_and_from_value() {
        assert_eq!(42_i64.to_value(), Value::Int64(42));
        assert_eq!(i64::from_value(Value::Int64(7)).unwrap(), 7);
        assert!(matches!(
            i64::from_value(Value::Int32(7)),
            Err(CodecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn vec_of_strings_is_typed_array() {
        let v = vec!["some".to_string(), "data".to_string()].to_value();
        assert_eq!(v.value_type(), ValueType::array(ValueType::String));
        let back: Vec<String> = decode(v).unwrap();
        assert_eq!(back, vec!["some", "data"]);
    }

    #[test]
    fn empty_vec_decodes_only_with_matching_element_type() {
        let v = Vec::<i32>::new().to_value();
        assert!(decode::<Vec<i32>>(v.clone()).unwrap().is_empty());
        assert!(decode::<Vec<String>>(v).is_err());
    }

    #[test]
    fn dict_of_variants() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int32(1));
        let v = map.to_value();
        assert_eq!(
            v.value_type(),
            ValueType::dict(ValueType::String, ValueType::Variant)
        );
        let back: BTreeMap<String, Value> = decode(v).unwrap();
        assert_eq!(back.get("a"), Some(&Value::Int32(1)));
    }

    #[test]
    fn tuple_from_args_checks_arity_and_types() {
        let ok = <(i64, i64)>::from_args(vec![Value::Int64(6), Value::Int64(7)]).unwrap();
        assert_eq!(ok, (6, 7));

        let short = <(i64, i64)>::from_args(vec![Value::Int64(6)]);
        assert_eq!(
            short,
            Err(CodecError::ArityMismatch {
                expected: 2,
                found: 1
            })
        );

        let wrong = <(i64, i64)>::from_args(vec![Value::Int64(6), Value::String("7".into())]);
        assert!(matches!(wrong, Err(CodecError::TypeMismatch { .. })));
    }

    #[test]
    fn unit_has_empty_signature() {
        assert!(<() as FromArgs>::signature().is_empty());
        assert!(<() as ReturnArgs>::signature().is_empty());
        assert!(().into_reply().is_empty());
    }

    #[test]
    fn return_args_shapes() {
        assert_eq!(<i64 as ReturnArgs>::signature(), vec![ValueType::Int64]);
        assert_eq!(
            <(i32, String) as ReturnArgs>::signature(),
            vec![ValueType::Int32, ValueType::String]
        );
        assert_eq!(
            (3_i32, "ok".to_string()).into_reply(),
            vec![Value::Int32(3), Value::String("ok".into())]
        );
    }

    #[test]
    fn value_is_variant() {
        let v = Value::Bool(true).to_value();
        assert_eq!(v, Value::Variant(Box::new(Value::Bool(true))));
        assert_eq!(Value::from_value(v).unwrap(), Value::Bool(true));
    }
}

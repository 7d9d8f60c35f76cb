//! Per-interface property storage with get/set policy.
//!
//! Each property owns a stored [`Value`] slot and a [`PropertyAccessor`]
//! strategy. The accessor never holds state of its own: `read` receives the
//! stored slot, `write` receives the requested value and a scratch copy of
//! the slot. A write is committed only when the accessor accepts it, so a
//! rejected write leaves the stored value untouched.

use std::collections::HashMap;

use busline_core::names::validate_member_name;
use busline_core::{FromValue, ToValue, Value, ValueType};

use crate::error::{BusError, Rejection};

/// Who is asking for a property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOrigin {
    /// A bus peer via `org.freedesktop.DBus.Properties.Set`.
    External,
    /// Server code: method handlers or the composition root.
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    /// Introspection attribute value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Access::ReadOnly => "read",
            Access::ReadWrite => "readwrite",
        }
    }
}

/// What a committed write announces on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    None,
    EmitsChange,
    EmitsInvalidation,
}

impl NotifyMode {
    /// Value of the `org.freedesktop.DBus.Property.EmitsChangedSignal` annotation.
    #[must_use]
    pub fn annotation(self) -> &'static str {
        match self {
            NotifyMode::None => "false",
            NotifyMode::EmitsChange => "true",
            NotifyMode::EmitsInvalidation => "invalidates",
        }
    }
}

/// Notification produced by a committed write.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    Changed { name: String, value: Value },
    Invalidated { name: String },
}

/// Read/write strategy for one property.
pub trait PropertyAccessor: Send + Sync {
    /// Value reported to readers. Defaults to the stored value.
    fn read(&self, stored: &Value) -> Value {
        stored.clone()
    }

    /// Applies `requested` to `stored`. Returning `Err` discards any
    /// modification made to `stored`.
    ///
    /// # Errors
    ///
    /// Returns a `Rejection` when the value is not acceptable.
    fn write(&self, requested: &Value, stored: &mut Value) -> Result<(), Rejection> {
        stored.clone_from(requested);
        Ok(())
    }
}

/// Plain stored value: reads return it, writes replace it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoredValue;

impl PropertyAccessor for StoredValue {}

type TypedSetter<T> = Box<dyn Fn(&T, &mut T) -> bool + Send + Sync>;
type TypedGetter<T> = Box<dyn Fn(&T) -> T + Send + Sync>;

/// Accessor built from typed closures.
///
/// The setter receives the requested value and a mutable reference to the
/// current one, and returns `false` to reject. The getter maps the stored
/// value to what readers see.
pub struct TypedAccessor<T> {
    setter: Option<TypedSetter<T>>,
    getter: Option<TypedGetter<T>>,
}

impl<T> TypedAccessor<T> {
    #[must_use]
    pub fn new(setter: Option<TypedSetter<T>>, getter: Option<TypedGetter<T>>) -> Self {
        Self { setter, getter }
    }
}

impl<T> PropertyAccessor for TypedAccessor<T>
where
    T: FromValue + ToValue + Send + Sync + 'static,
{
    fn read(&self, stored: &Value) -> Value {
        let Some(getter) = &self.getter else {
            return stored.clone();
        };
        match T::from_value(stored.clone()) {
            Ok(current) => getter(&current).to_value(),
            Err(_) => stored.clone(),
        }
    }

    fn write(&self, requested: &Value, stored: &mut Value) -> Result<(), Rejection> {
        let Some(setter) = &self.setter else {
            stored.clone_from(requested);
            return Ok(());
        };
        let req = T::from_value(requested.clone()).map_err(|e| Rejection::new(e.to_string()))?;
        let mut current = T::from_value(stored.clone()).map_err(|e| Rejection::new(e.to_string()))?;
        if setter(&req, &mut current) {
            *stored = current.to_value();
            Ok(())
        } else {
            Err(Rejection::new("value refused by setter"))
        }
    }
}

/// Everything needed to register a property.
pub struct PropertyDef {
    pub name: String,
    pub value_type: ValueType,
    pub initial: Value,
    pub access: Access,
    pub notify: NotifyMode,
    pub accessor: Box<dyn PropertyAccessor>,
}

impl std::fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("access", &self.access)
            .field("notify", &self.notify)
            .finish_non_exhaustive()
    }
}

/// A registered property.
pub struct Property {
    name: String,
    value_type: ValueType,
    stored: Value,
    access: Access,
    notify: NotifyMode,
    accessor: Box<dyn PropertyAccessor>,
}

impl Property {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    #[must_use]
    pub fn notify(&self) -> NotifyMode {
        self.notify
    }

    fn read(&self) -> Value {
        self.accessor.read(&self.stored)
    }
}

/// Named properties of one interface.
///
/// Slots are kept in registration order; the name index maps to a slot.
pub struct PropertyTable {
    interface: String,
    slots: Vec<Property>,
    index: HashMap<String, usize>,
}

impl PropertyTable {
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a property.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if the name is not a valid member name
    /// - `DuplicateName` if the name is already registered
    /// - `ArgumentMismatch` if the initial value does not have the declared type
    pub fn register(&mut self, def: PropertyDef) -> Result<(), BusError> {
        validate_member_name(&def.name)?;
        if self.index.contains_key(&def.name) {
            return Err(BusError::DuplicateName { name: def.name });
        }
        if !def.initial.conforms_to(&def.value_type) {
            return Err(BusError::ArgumentMismatch {
                member: def.name,
                expected: def.value_type.signature(),
                found: def.initial.value_type().signature(),
            });
        }
        self.index.insert(def.name.clone(), self.slots.len());
        self.slots.push(Property {
            name: def.name,
            value_type: def.value_type,
            stored: def.initial,
            access: def.access,
            notify: def.notify,
            accessor: def.accessor,
        });
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<usize, BusError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| BusError::UnknownProperty {
                interface: self.interface.clone(),
                name: name.to_string(),
            })
    }

    /// Current value as seen by readers.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty` if no such property exists.
    pub fn get(&self, name: &str) -> Result<Value, BusError> {
        let slot = self.slot(name)?;
        Ok(self.slots[slot].read())
    }

    /// Typed read.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty`, or `Codec` if `T` is not the declared type.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T, BusError> {
        Ok(busline_core::decode(self.get(name)?)?)
    }

    /// Writes a property through its accessor.
    ///
    /// On success returns the change to announce, if the property's notify
    /// mode asks for one. On failure the stored value is unchanged.
    ///
    /// # Errors
    ///
    /// - `UnknownProperty` if no such property exists
    /// - `ReadOnlyProperty` for external writes to a read-only property
    /// - `ArgumentMismatch` if `value` does not have the declared type
    /// - `PropertyRejected` if the accessor refuses the value
    /// - `Internal` if the accessor produced a value of the wrong type
    pub fn set(
        &mut self,
        name: &str,
        value: Value,
        origin: SetOrigin,
    ) -> Result<Option<PropertyChange>, BusError> {
        let slot = self.slot(name)?;
        let prop = &mut self.slots[slot];

        if origin == SetOrigin::External && prop.access == Access::ReadOnly {
            return Err(BusError::ReadOnlyProperty {
                name: prop.name.clone(),
            });
        }
        if !value.conforms_to(&prop.value_type) {
            return Err(BusError::ArgumentMismatch {
                member: prop.name.clone(),
                expected: prop.value_type.signature(),
                found: value.value_type().signature(),
            });
        }

        let mut scratch = prop.stored.clone();
        prop.accessor
            .write(&value, &mut scratch)
            .map_err(|rejection| BusError::PropertyRejected {
                name: prop.name.clone(),
                reason: rejection.reason,
            })?;
        if !scratch.conforms_to(&prop.value_type) {
            return Err(BusError::Internal(anyhow::anyhow!(
                "setter for '{}' produced '{}', declared '{}'",
                prop.name,
                scratch.value_type(),
                prop.value_type
            )));
        }
        prop.stored = scratch;

        Ok(match prop.notify {
            NotifyMode::None => None,
            NotifyMode::EmitsChange => Some(PropertyChange::Changed {
                name: prop.name.clone(),
                value: prop.read(),
            }),
            NotifyMode::EmitsInvalidation => Some(PropertyChange::Invalidated {
                name: prop.name.clone(),
            }),
        })
    }

    /// All properties as seen by readers, in registration order.
    #[must_use]
    pub fn get_all(&self) -> Vec<(String, Value)> {
        self.slots
            .iter()
            .map(|p| (p.name.clone(), p.read()))
            .collect()
    }

    /// Registered properties, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.slots.iter()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn def(name: &str, initial: Value, access: Access, notify: NotifyMode) -> PropertyDef {
        PropertyDef {
            name: name.to_string(),
            value_type: initial.value_type(),
            initial,
            access,
            notify,
            accessor: Box::new(StoredValue),
        }
    }

    fn less_than_50() -> PropertyDef {
        let setter: TypedSetter<i32> = Box::new(|req, current| {
            if *req >= 50 {
                return false;
            }
            *current = *req;
            true
        });
        PropertyDef {
            name: "lessThan50".into(),
            value_type: ValueType::Int32,
            initial: Value::Int32(23),
            access: Access::ReadWrite,
            notify: NotifyMode::EmitsChange,
            accessor: Box::new(TypedAccessor::new(Some(setter), None)),
        }
    }

    #[test]
    fn register_and_get() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def("int", Value::Int32(33), Access::ReadWrite, NotifyMode::None))
            .unwrap();
        assert_eq!(table.get("int").unwrap(), Value::Int32(33));
        assert_eq!(table.get_as::<i32>("int").unwrap(), 33);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def("int", Value::Int32(1), Access::ReadWrite, NotifyMode::None))
            .unwrap();
        let err = table
            .register(def("int", Value::Int32(2), Access::ReadWrite, NotifyMode::None))
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicateName { ref name } if name == "int"));
        assert_eq!(table.get("int").unwrap(), Value::Int32(1));
    }

    #[test]
    fn initial_value_must_match_declared_type() {
        let mut table = PropertyTable::new("xyz.test");
        let mut bad = def("int", Value::Int32(1), Access::ReadWrite, NotifyMode::None);
        bad.value_type = ValueType::String;
        assert!(matches!(
            table.register(bad),
            Err(BusError::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn unknown_property() {
        let table = PropertyTable::new("xyz.test");
        assert!(matches!(
            table.get("missing"),
            Err(BusError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn external_write_to_read_only_fails_and_keeps_value() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def(
                "Status",
                Value::String("ok".into()),
                Access::ReadOnly,
                NotifyMode::EmitsChange,
            ))
            .unwrap();
        let err = table
            .set("Status", Value::String("bad".into()), SetOrigin::External)
            .unwrap_err();
        assert!(matches!(err, BusError::ReadOnlyProperty { .. }));
        assert_eq!(table.get("Status").unwrap(), Value::String("ok".into()));
    }

    #[test]
    fn internal_write_to_read_only_is_allowed() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def(
                "Status",
                Value::String("ok".into()),
                Access::ReadOnly,
                NotifyMode::None,
            ))
            .unwrap();
        table
            .set("Status", Value::String("busy".into()), SetOrigin::Internal)
            .unwrap();
        assert_eq!(table.get("Status").unwrap(), Value::String("busy".into()));
    }

    #[test]
    fn setter_rejection_leaves_value_unchanged() {
        let mut table = PropertyTable::new("xyz.test");
        table.register(less_than_50()).unwrap();

        let err = table
            .set("lessThan50", Value::Int32(70), SetOrigin::External)
            .unwrap_err();
        assert!(matches!(err, BusError::PropertyRejected { .. }));
        assert_eq!(table.get("lessThan50").unwrap(), Value::Int32(23));

        let change = table
            .set("lessThan50", Value::Int32(49), SetOrigin::External)
            .unwrap();
        assert_eq!(
            change,
            Some(PropertyChange::Changed {
                name: "lessThan50".into(),
                value: Value::Int32(49)
            })
        );
    }

    #[test]
    fn accessor_that_mutates_then_rejects_has_no_effect() {
        struct Sneaky;
        impl PropertyAccessor for Sneaky {
            fn write(&self, _requested: &Value, stored: &mut Value) -> Result<(), Rejection> {
                *stored = Value::Int32(-1);
                Err(Rejection::new("no"))
            }
        }
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(PropertyDef {
                name: "p".into(),
                value_type: ValueType::Int32,
                initial: Value::Int32(5),
                access: Access::ReadWrite,
                notify: NotifyMode::None,
                accessor: Box::new(Sneaky),
            })
            .unwrap();
        assert!(table.set("p", Value::Int32(6), SetOrigin::External).is_err());
        assert_eq!(table.get("p").unwrap(), Value::Int32(5));
    }

    #[test]
    fn wrong_type_write_is_argument_mismatch() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def("int", Value::Int32(1), Access::ReadWrite, NotifyMode::None))
            .unwrap();
        let err = table
            .set("int", Value::String("1".into()), SetOrigin::External)
            .unwrap_err();
        assert!(matches!(err, BusError::ArgumentMismatch { .. }));
        assert_eq!(table.get("int").unwrap(), Value::Int32(1));
    }

    #[test]
    fn notify_modes() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def("quiet", Value::Int64(0), Access::ReadWrite, NotifyMode::None))
            .unwrap();
        table
            .register(def(
                "loud",
                Value::Int64(0),
                Access::ReadWrite,
                NotifyMode::EmitsChange,
            ))
            .unwrap();
        table
            .register(def(
                "lazy",
                Value::Int64(0),
                Access::ReadWrite,
                NotifyMode::EmitsInvalidation,
            ))
            .unwrap();

        assert_eq!(
            table.set("quiet", Value::Int64(1), SetOrigin::External).unwrap(),
            None
        );
        assert_eq!(
            table.set("loud", Value::Int64(10), SetOrigin::External).unwrap(),
            Some(PropertyChange::Changed {
                name: "loud".into(),
                value: Value::Int64(10)
            })
        );
        assert_eq!(
            table.set("lazy", Value::Int64(2), SetOrigin::External).unwrap(),
            Some(PropertyChange::Invalidated { name: "lazy".into() })
        );
    }

    #[test]
    fn getter_decorates_stored_value() {
        let getter: TypedGetter<String> = Box::new(|stored| format!("{stored}!"));
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(PropertyDef {
                name: "TrailTime".into(),
                value_type: ValueType::String,
                initial: Value::String("foo".into()),
                access: Access::ReadWrite,
                notify: NotifyMode::None,
                accessor: Box::new(TypedAccessor::new(None, Some(getter))),
            })
            .unwrap();
        assert_eq!(table.get("TrailTime").unwrap(), Value::String("foo!".into()));
        table
            .set("TrailTime", Value::String("bar".into()), SetOrigin::External)
            .unwrap();
        assert_eq!(table.get("TrailTime").unwrap(), Value::String("bar!".into()));
    }

    #[test]
    fn get_all_in_registration_order() {
        let mut table = PropertyTable::new("xyz.test");
        table
            .register(def("b", Value::Int32(2), Access::ReadWrite, NotifyMode::None))
            .unwrap();
        table
            .register(def("a", Value::Int32(1), Access::ReadWrite, NotifyMode::None))
            .unwrap();
        let names: Vec<String> = table.get_all().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    proptest! {
        #[test]
        fn read_only_external_writes_never_mutate(initial in any::<i64>(), attempt in any::<i64>()) {
            let mut table = PropertyTable::new("xyz.test");
            table
                .register(def("ro", Value::Int64(initial), Access::ReadOnly, NotifyMode::EmitsChange))
                .unwrap();
            let result = table.set("ro", Value::Int64(attempt), SetOrigin::External);
            let is_read_only = matches!(result, Err(BusError::ReadOnlyProperty { .. }));
            prop_assert!(is_read_only);
            prop_assert_eq!(table.get("ro").unwrap(), Value::Int64(initial));
        }
    }
}

//! Interfaces and the builder used to declare them.

use busline_core::names::{validate_interface_name, validate_member_name};
use busline_core::{FromArgs, FromValue, IntoArgs, ReturnArgs, ToValue, Value, ValueType};

use crate::error::BusError;
use crate::handler::{CallContext, Step};
use crate::method::{decode_args, Handler, Method, MethodTable};
use crate::property::{
    Access, NotifyMode, PropertyAccessor, PropertyDef, PropertyTable, StoredValue, TypedAccessor,
};

/// A signal an interface declares for introspection and argument checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDecl {
    pub name: String,
    pub args: Vec<ValueType>,
}

/// Named group of properties, methods and signals on one object.
pub struct Interface {
    pub(crate) name: String,
    pub(crate) properties: PropertyTable,
    pub(crate) methods: MethodTable,
    pub(crate) signals: Vec<SignalDecl>,
}

impl Interface {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn properties(&self) -> &PropertyTable {
        &self.properties
    }

    #[must_use]
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    #[must_use]
    pub fn signals(&self) -> &[SignalDecl] {
        &self.signals
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("properties", &self.properties.len())
            .field("methods", &self.methods.len())
            .field("signals", &self.signals)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InterfaceBuilder
// ---------------------------------------------------------------------------

/// Mutable handle given to `add_interface` callbacks. The interface is not
/// visible on the bus until the builder callback returns successfully.
pub struct InterfaceBuilder {
    iface: Interface,
}

impl InterfaceBuilder {
    /// # Errors
    ///
    /// Returns `InvalidName` if `name` is not a valid interface name.
    pub fn new(name: &str) -> Result<Self, BusError> {
        validate_interface_name(name)?;
        Ok(Self {
            iface: Interface {
                name: name.to_string(),
                properties: PropertyTable::new(name),
                methods: MethodTable::new(name),
                signals: Vec::new(),
            },
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.iface.name
    }

    /// Starts declaring a typed property. Properties default to read-only
    /// with change signals.
    pub fn property<T>(&mut self, name: &str, initial: T) -> PropertyBuilder<'_, T>
    where
        T: ToValue + FromValue + Send + Sync + 'static,
    {
        PropertyBuilder {
            owner: self,
            name: name.to_string(),
            initial,
            access: Access::ReadOnly,
            notify: NotifyMode::EmitsChange,
            setter: None,
            getter: None,
        }
    }

    /// Registers a fully described property.
    ///
    /// # Errors
    ///
    /// See [`PropertyTable::register`].
    pub fn property_def(&mut self, def: PropertyDef) -> Result<&mut Self, BusError> {
        self.iface.properties.register(def)?;
        Ok(self)
    }

    /// Registers a handler that completes in one step.
    ///
    /// # Errors
    ///
    /// `InvalidName` or `DuplicateName`.
    pub fn method<A, R, F>(&mut self, name: &str, f: F) -> Result<&mut Self, BusError>
    where
        A: FromArgs + 'static,
        R: ReturnArgs + 'static,
        F: Fn(&mut CallContext<'_>, A) -> Result<R, BusError> + Send + Sync + 'static,
    {
        let member = name.to_string();
        let handler = Handler::Sync(Box::new(move |ctx: &mut CallContext<'_>, args: Vec<Value>| {
            let args = decode_args::<A>(&member, args)?;
            f(ctx, args).map(ReturnArgs::into_reply)
        }));
        self.iface
            .methods
            .register(Method::new(name, A::signature(), R::signature(), handler))?;
        Ok(self)
    }

    /// Registers a handler that may suspend on nested calls.
    ///
    /// # Errors
    ///
    /// `InvalidName` or `DuplicateName`.
    pub fn suspending_method<A, R, F>(&mut self, name: &str, f: F) -> Result<&mut Self, BusError>
    where
        A: FromArgs + 'static,
        R: ReturnArgs + 'static,
        F: Fn(&mut CallContext<'_>, A) -> Step<R> + Send + Sync + 'static,
    {
        let member = name.to_string();
        let handler = Handler::Suspending(Box::new(move |ctx: &mut CallContext<'_>, args: Vec<Value>| {
            match decode_args::<A>(&member, args) {
                Ok(args) => f(ctx, args).erase(),
                Err(e) => Step::fail(e),
            }
        }));
        self.iface
            .methods
            .register(Method::new(name, A::signature(), R::signature(), handler))?;
        Ok(self)
    }

    /// Registers a pre-built method.
    ///
    /// # Errors
    ///
    /// `InvalidName` or `DuplicateName`.
    pub fn method_raw(&mut self, method: Method) -> Result<&mut Self, BusError> {
        self.iface.methods.register(method)?;
        Ok(self)
    }

    /// Declares a signal with the argument types of `A`.
    ///
    /// # Errors
    ///
    /// `InvalidName` or `DuplicateName`.
    pub fn signal<A: IntoArgs>(&mut self, name: &str) -> Result<&mut Self, BusError> {
        self.signal_raw(name, A::signature())
    }

    /// # Errors
    ///
    /// `InvalidName` or `DuplicateName`.
    pub fn signal_raw(&mut self, name: &str, args: Vec<ValueType>) -> Result<&mut Self, BusError> {
        validate_member_name(name)?;
        if self.iface.signals.iter().any(|s| s.name == name) {
            return Err(BusError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.iface.signals.push(SignalDecl {
            name: name.to_string(),
            args,
        });
        Ok(self)
    }

    pub(crate) fn finish(self) -> Interface {
        self.iface
    }
}

// ---------------------------------------------------------------------------
// PropertyBuilder
// ---------------------------------------------------------------------------

type Setter<T> = Box<dyn Fn(&T, &mut T) -> bool + Send + Sync>;
type Getter<T> = Box<dyn Fn(&T) -> T + Send + Sync>;

/// Fluent declaration of one typed property; nothing is registered until
/// [`PropertyBuilder::register`].
pub struct PropertyBuilder<'a, T> {
    owner: &'a mut InterfaceBuilder,
    name: String,
    initial: T,
    access: Access,
    notify: NotifyMode,
    setter: Option<Setter<T>>,
    getter: Option<Getter<T>>,
}

impl<T> PropertyBuilder<'_, T>
where
    T: ToValue + FromValue + Send + Sync + 'static,
{
    #[must_use]
    pub fn read_write(mut self) -> Self {
        self.access = Access::ReadWrite;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    #[must_use]
    pub fn emits_change(mut self) -> Self {
        self.notify = NotifyMode::EmitsChange;
        self
    }

    #[must_use]
    pub fn emits_invalidation(mut self) -> Self {
        self.notify = NotifyMode::EmitsInvalidation;
        self
    }

    #[must_use]
    pub fn no_notify(mut self) -> Self {
        self.notify = NotifyMode::None;
        self
    }

    /// Custom write policy: gets the requested value and the current one,
    /// returns `false` to reject.
    #[must_use]
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &mut T) -> bool + Send + Sync + 'static,
    {
        self.setter = Some(Box::new(f));
        self
    }

    /// Custom read policy: maps the stored value to what readers see.
    #[must_use]
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.getter = Some(Box::new(f));
        self
    }

    /// # Errors
    ///
    /// See [`PropertyTable::register`].
    pub fn register(self) -> Result<(), BusError> {
        let accessor: Box<dyn PropertyAccessor> = if self.setter.is_none() && self.getter.is_none()
        {
            Box::new(StoredValue)
        } else {
            Box::new(TypedAccessor::new(self.setter, self.getter))
        };
        self.owner.iface.properties.register(PropertyDef {
            name: self.name,
            value_type: T::value_type(),
            initial: self.initial.to_value(),
            access: self.access,
            notify: self.notify,
            accessor,
        })
    }
}

#[cfg(test)]
mod tests {
    use busline_core::Value;

    use super::*;
    use crate::handler::CallInfo;

    #[test]
    fn invalid_interface_name() {
        assert!(matches!(
            InterfaceBuilder::new("Calculator"),
            Err(BusError::InvalidName(_))
        ));
    }

    #[test]
    fn typed_method_records_signature() {
        let mut b = InterfaceBuilder::new("xyz.openbmc_project.test").unwrap();
        b.method("TestMethod", |_ctx, (n,): (i32,)| {
            Ok((n, format!("success: {n}")))
        })
        .unwrap();
        let iface = b.finish();
        let method = iface.methods().lookup("TestMethod").unwrap();
        assert_eq!(method.inputs(), &[ValueType::Int32]);
        assert_eq!(method.outputs(), &[ValueType::Int32, ValueType::String]);
        assert!(!method.is_suspending());
    }

    #[test]
    fn typed_method_runs() {
        let mut b = InterfaceBuilder::new("xyz.openbmc_project.test").unwrap();
        b.method("TestFunction", |_ctx, (n,): (i32,)| Ok(n + 1))
            .unwrap();
        let mut iface = b.finish();
        let info = CallInfo {
            sender: ":1.1".into(),
            serial: 1,
            path: "/xyz/openbmc_project/test".into(),
            interface: "xyz.openbmc_project.test".into(),
            member: "TestFunction".into(),
        };
        let Interface {
            methods,
            properties,
            signals,
            ..
        } = &mut iface;
        let mut ctx = CallContext::new(&info, properties, signals);
        let step = methods
            .dispatch("TestFunction", &mut ctx, vec![Value::Int32(4)])
            .unwrap();
        assert!(matches!(step, Step::Done(Ok(ref v)) if v == &vec![Value::Int32(5)]));
    }

    #[test]
    fn property_builder_defaults_and_options() {
        let mut b = InterfaceBuilder::new("xyz.openbmc_project.test").unwrap();
        b.property("myStringVec2", vec!["more".to_string()])
            .register()
            .unwrap();
        b.property("lessThan50", 23_i32)
            .read_write()
            .setter(|req, cur| {
                if *req >= 50 {
                    return false;
                }
                *cur = *req;
                true
            })
            .register()
            .unwrap();
        let iface = b.finish();
        let props: Vec<_> = iface.properties().iter().collect();
        assert_eq!(props[0].access(), Access::ReadOnly);
        assert_eq!(props[0].notify(), NotifyMode::EmitsChange);
        assert_eq!(props[1].access(), Access::ReadWrite);
        assert_eq!(props[1].value_type(), &ValueType::Int32);
    }

    #[test]
    fn duplicate_members_rejected() {
        let mut b = InterfaceBuilder::new("a.b").unwrap();
        b.signal::<(i64,)>("Cleared").unwrap();
        assert!(matches!(
            b.signal::<(i64,)>("Cleared"),
            Err(BusError::DuplicateName { .. })
        ));
        b.property("x", 1_i64).register().unwrap();
        assert!(matches!(
            b.property("x", 2_i64).register(),
            Err(BusError::DuplicateName { .. })
        ));
    }
}

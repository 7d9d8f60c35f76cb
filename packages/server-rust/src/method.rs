//! Per-interface method table and handler invocation.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use busline_core::names::validate_member_name;
use busline_core::{signature_of, FromArgs, Value, ValueType};

use crate::error::BusError;
use crate::handler::{CallContext, Step};

pub type SyncFn =
    dyn Fn(&mut CallContext<'_>, Vec<Value>) -> Result<Vec<Value>, BusError> + Send + Sync;
pub type SuspendFn = dyn Fn(&mut CallContext<'_>, Vec<Value>) -> Step<Vec<Value>> + Send + Sync;

/// The two handler shapes.
pub enum Handler {
    /// Runs to completion in one step.
    Sync(Box<SyncFn>),
    /// May return [`Step::Suspend`] to wait for a nested call.
    Suspending(Box<SuspendFn>),
}

impl Handler {
    #[must_use]
    pub fn is_suspending(&self) -> bool {
        matches!(self, Handler::Suspending(_))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Suspending(_) => f.write_str("Handler::Suspending"),
        }
    }
}

/// A registered method: declared signature plus handler.
#[derive(Debug)]
pub struct Method {
    name: String,
    inputs: Vec<ValueType>,
    outputs: Vec<ValueType>,
    handler: Handler,
}

impl Method {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<ValueType>,
        outputs: Vec<ValueType>,
        handler: Handler,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            handler,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inputs(&self) -> &[ValueType] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[ValueType] {
        &self.outputs
    }

    #[must_use]
    pub fn is_suspending(&self) -> bool {
        self.handler.is_suspending()
    }

    /// Validates inbound arguments against the declared inputs.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentMismatch` on any count or type disagreement.
    pub fn check_args(&self, args: &[Value]) -> Result<(), BusError> {
        check_signature(&self.name, &self.inputs, args)
    }

    /// Runs the handler's first step. Panics become `Internal` errors.
    pub fn invoke(&self, ctx: &mut CallContext<'_>, args: Vec<Value>) -> Step<Vec<Value>> {
        let outcome = catch_unwind(AssertUnwindSafe(|| match &self.handler {
            Handler::Sync(f) => Step::Done(f(ctx, args)),
            Handler::Suspending(f) => f(ctx, args),
        }));
        outcome.unwrap_or_else(|payload| Step::fail(panic_error(&self.name, payload.as_ref())))
    }
}

pub(crate) fn check_signature(
    member: &str,
    declared: &[ValueType],
    args: &[Value],
) -> Result<(), BusError> {
    let ok = declared.len() == args.len()
        && declared.iter().zip(args).all(|(ty, v)| v.conforms_to(ty));
    if ok {
        Ok(())
    } else {
        Err(BusError::ArgumentMismatch {
            member: member.to_string(),
            expected: signature_of(declared),
            found: args.iter().map(|v| v.value_type().signature()).collect(),
        })
    }
}

/// Validates reply arguments against declared outputs. A handler replying
/// off-signature is a server bug, so the error is `Internal`.
pub(crate) fn check_reply_signature(
    member: &str,
    declared: &[ValueType],
    args: &[Value],
) -> Result<(), BusError> {
    check_signature(member, declared, args).map_err(|e| {
        BusError::Internal(anyhow::anyhow!("reply of '{member}' off signature: {e}"))
    })
}

/// Checks then decodes an argument list as `A`.
///
/// # Errors
///
/// Returns `ArgumentMismatch` when `args` do not match `A::signature()`.
pub fn decode_args<A: FromArgs>(member: &str, args: Vec<Value>) -> Result<A, BusError> {
    check_signature(member, &A::signature(), &args)?;
    Ok(A::from_args(args)?)
}

pub(crate) fn panic_error(member: &str, payload: &(dyn Any + Send)) -> BusError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    BusError::Internal(anyhow::anyhow!("handler '{member}' panicked: {message}"))
}

/// Named methods of one interface, in registration order.
#[derive(Debug)]
pub struct MethodTable {
    interface: String,
    methods: HashMap<String, Method>,
    order: Vec<String>,
}

impl MethodTable {
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            methods: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// - `InvalidName` if the name is not a valid member name
    /// - `DuplicateName` if the name is already registered
    pub fn register(&mut self, method: Method) -> Result<(), BusError> {
        validate_member_name(&method.name)?;
        if self.methods.contains_key(&method.name) {
            return Err(BusError::DuplicateName { name: method.name });
        }
        self.order.push(method.name.clone());
        self.methods.insert(method.name.clone(), method);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UnknownMethod` if no such method exists.
    pub fn lookup(&self, member: &str) -> Result<&Method, BusError> {
        self.methods
            .get(member)
            .ok_or_else(|| BusError::UnknownMethod {
                interface: self.interface.clone(),
                member: member.to_string(),
            })
    }

    /// Looks up `member`, validates `args` and runs the handler's first step.
    /// Nothing runs unless the arguments match.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMethod` or `ArgumentMismatch`.
    pub fn dispatch(
        &self,
        member: &str,
        ctx: &mut CallContext<'_>,
        args: Vec<Value>,
    ) -> Result<Step<Vec<Value>>, BusError> {
        let method = self.lookup(member)?;
        method.check_args(&args)?;
        Ok(method.invoke(ctx, args))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.order.iter().filter_map(|name| self.methods.get(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

//! Handler-facing types: the call context, nested calls and continuations.
//!
//! A suspending handler does not block. When it needs a remote result it
//! returns [`Step::Suspend`] with the [`NestedCall`] to issue and a
//! continuation to run once the reply is in. The scheduler parks the
//! continuation keyed by the nested call's token and re-enters it exactly
//! once with the outcome.

use std::time::Duration;

use busline_core::{signature_of, FromValue, IntoArgs, ReturnArgs, ToValue, Value};

use crate::error::BusError;
use crate::interface::SignalDecl;
use crate::property::{PropertyTable, SetOrigin};
use crate::signal::{properties_changed, PendingSignal};

/// Outcome of a nested call as seen by a continuation.
pub type NestedResult = Result<Vec<Value>, BusError>;

// ---------------------------------------------------------------------------
// CallInfo / CallContext
// ---------------------------------------------------------------------------

/// Metadata of the inbound call being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub sender: String,
    pub serial: u64,
    pub path: String,
    pub interface: String,
    pub member: String,
}

/// What a handler can reach while it runs.
///
/// Property writes made through the context are committed immediately and
/// their change signals are queued; queued signals leave the server after
/// the handler step returns, before any reply.
pub struct CallContext<'a> {
    info: &'a CallInfo,
    properties: &'a mut PropertyTable,
    signals: &'a [SignalDecl],
    pending: Vec<PendingSignal>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        info: &'a CallInfo,
        properties: &'a mut PropertyTable,
        signals: &'a [SignalDecl],
    ) -> Self {
        Self {
            info,
            properties,
            signals,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn info(&self) -> &CallInfo {
        self.info
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.info.sender
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.info.serial
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.info.path
    }

    #[must_use]
    pub fn interface(&self) -> &str {
        &self.info.interface
    }

    #[must_use]
    pub fn member(&self) -> &str {
        &self.info.member
    }

    /// Reads a property of the handler's own interface.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty` if no such property exists.
    pub fn property(&self, name: &str) -> Result<Value, BusError> {
        self.properties.get(name)
    }

    /// Typed [`CallContext::property`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownProperty`, or `Codec` if `T` is not the declared type.
    pub fn property_as<T: FromValue>(&self, name: &str) -> Result<T, BusError> {
        self.properties.get_as(name)
    }

    /// Writes a property with server privileges (read-only is bypassed,
    /// the setter still runs) and queues its change signal.
    ///
    /// # Errors
    ///
    /// Same as [`PropertyTable::set`] minus `ReadOnlyProperty`.
    pub fn set_property<T: ToValue>(&mut self, name: &str, value: T) -> Result<(), BusError> {
        self.set_property_value(name, value.to_value())
    }

    /// Untyped [`CallContext::set_property`].
    ///
    /// # Errors
    ///
    /// Same as [`PropertyTable::set`] minus `ReadOnlyProperty`.
    pub fn set_property_value(&mut self, name: &str, value: Value) -> Result<(), BusError> {
        if let Some(change) = self.properties.set(name, value, SetOrigin::Internal)? {
            self.pending.push(properties_changed(
                &self.info.path,
                &self.info.interface,
                vec![change],
            ));
        }
        Ok(())
    }

    /// Queues a signal on the handler's own interface and object.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentMismatch` if the signal is declared with a
    /// different signature.
    pub fn emit<A: IntoArgs>(&mut self, member: &str, args: A) -> Result<(), BusError> {
        let args = args.into_args();
        check_declared_signal(self.signals, member, &args)?;
        self.pending.push(PendingSignal {
            path: self.info.path.clone(),
            interface: self.info.interface.clone(),
            member: member.to_string(),
            args,
        });
        Ok(())
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingSignal> {
        std::mem::take(&mut self.pending)
    }
}

/// Checks `args` against a declared signal. Undeclared signals pass.
pub(crate) fn check_declared_signal(
    decls: &[SignalDecl],
    member: &str,
    args: &[Value],
) -> Result<(), BusError> {
    let Some(decl) = decls.iter().find(|d| d.name == member) else {
        return Ok(());
    };
    let matches = decl.args.len() == args.len()
        && decl.args.iter().zip(args).all(|(ty, v)| v.conforms_to(ty));
    if matches {
        Ok(())
    } else {
        Err(BusError::ArgumentMismatch {
            member: member.to_string(),
            expected: signature_of(&decl.args),
            found: args.iter().map(|v| v.value_type().signature()).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// NestedCall
// ---------------------------------------------------------------------------

/// A remote call issued by a suspending handler.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
    /// Overrides the server's default nested-call timeout.
    pub timeout: Option<Duration>,
}

impl NestedCall {
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn args<A: IntoArgs>(mut self, args: A) -> Self {
        self.args = args.into_args();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ---------------------------------------------------------------------------
// Step / Continuation
// ---------------------------------------------------------------------------

/// Saved state of a suspended handler.
pub trait Continuation<R>: Send {
    fn resume(self: Box<Self>, ctx: &mut CallContext<'_>, result: NestedResult) -> Step<R>;
}

impl<R, F> Continuation<R> for F
where
    F: FnOnce(&mut CallContext<'_>, NestedResult) -> Step<R> + Send,
{
    fn resume(self: Box<Self>, ctx: &mut CallContext<'_>, result: NestedResult) -> Step<R> {
        (*self)(ctx, result)
    }
}

/// Result of running a handler (or a continuation) until it either
/// finishes or needs a remote result.
pub enum Step<R> {
    Done(Result<R, BusError>),
    Suspend {
        call: NestedCall,
        then: Box<dyn Continuation<R>>,
    },
}

impl<R> Step<R> {
    pub fn done(value: R) -> Self {
        Step::Done(Ok(value))
    }

    pub fn fail(err: BusError) -> Self {
        Step::Done(Err(err))
    }

    /// Issues `call` and continues with `then` once its outcome is known.
    pub fn suspend<F>(call: NestedCall, then: F) -> Self
    where
        F: FnOnce(&mut CallContext<'_>, NestedResult) -> Step<R> + Send + 'static,
    {
        Step::Suspend {
            call,
            then: Box::new(then),
        }
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Step::Suspend { .. })
    }
}

impl<R: ReturnArgs + 'static> Step<R> {
    /// Converts typed return values into reply arguments, including those
    /// produced by later continuations.
    pub(crate) fn erase(self) -> Step<Vec<Value>> {
        match self {
            Step::Done(result) => Step::Done(result.map(ReturnArgs::into_reply)),
            Step::Suspend { call, then } => Step::Suspend {
                call,
                then: Box::new(Erased(then)),
            },
        }
    }
}

impl<R> From<Result<R, BusError>> for Step<R> {
    fn from(result: Result<R, BusError>) -> Self {
        Step::Done(result)
    }
}

impl<R> std::fmt::Debug for Step<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Done(Ok(_)) => f.write_str("Done(Ok)"),
            Step::Done(Err(e)) => write!(f, "Done(Err({e}))"),
            Step::Suspend { call, .. } => write!(f, "Suspend({}.{})", call.interface, call.member),
        }
    }
}

struct Erased<R>(Box<dyn Continuation<R>>);

impl<R: ReturnArgs + 'static> Continuation<Vec<Value>> for Erased<R> {
    fn resume(
        self: Box<Self>,
        ctx: &mut CallContext<'_>,
        result: NestedResult,
    ) -> Step<Vec<Value>> {
        self.0.resume(ctx, result).erase()
    }
}

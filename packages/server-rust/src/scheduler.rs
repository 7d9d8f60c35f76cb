//! Call scheduler: runs handlers, parks suspended ones, resumes them.
//!
//! Every inbound call becomes an [`InFlightCall`]. Its lifecycle is
//! `Received -> Executing -> {Suspended <-> Executing}* -> Completed | Failed`.
//! A suspended call lives in the parked table keyed by its nested call's
//! token; taking it out of the table is the only way to resume it, so each
//! continuation runs at most once. [`InFlightCall::finish`] consumes the
//! call, so each call is answered at most once.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use busline_core::{summarize_args, Value, ValueType};
use tokio::time::Instant;
use tracing::{debug, error, info_span, trace, warn, Span};

use crate::config::ServerConfig;
use crate::error::BusError;
use crate::handler::{CallContext, CallInfo, Continuation, NestedResult, Step};
use crate::interface::Interface;
use crate::method::{check_reply_signature, panic_error};
use crate::registry::{is_standard_interface, ObjectRegistry};
use crate::signal::SignalEmitter;
use crate::standard::{self, machine_id};
use crate::transport::{BusTransport, CallToken, Reply};

/// Where an in-flight call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    Executing,
    Suspended(CallToken),
    Completed,
    Failed,
}

// ---------------------------------------------------------------------------
// InFlightCall
// ---------------------------------------------------------------------------

/// An inbound call between receipt and reply.
#[derive(Debug)]
pub struct InFlightCall {
    info: Arc<CallInfo>,
    args_summary: String,
    outputs: Option<Vec<ValueType>>,
    state: CallState,
    resumes: u32,
    started: Instant,
}

impl InFlightCall {
    #[must_use]
    pub fn new(info: CallInfo, args: &[Value]) -> Self {
        Self {
            info: Arc::new(info),
            args_summary: summarize_args(args),
            outputs: None,
            state: CallState::Received,
            resumes: 0,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn info(&self) -> &CallInfo {
        &self.info
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    /// How many times a continuation of this call has been re-entered.
    #[must_use]
    pub fn resumes(&self) -> u32 {
        self.resumes
    }

    fn span(&self) -> Span {
        info_span!(
            "method_call",
            sender = %self.info.sender,
            serial = self.info.serial,
            path = %self.info.path,
            interface = %self.info.interface,
            member = %self.info.member,
        )
    }

    fn resume_with(
        &mut self,
        then: Box<dyn Continuation<Vec<Value>>>,
        ctx: &mut CallContext<'_>,
        result: NestedResult,
    ) -> Step<Vec<Value>> {
        self.resumes += 1;
        self.state = CallState::Executing;
        trace!(resumes = self.resumes, ok = result.is_ok(), "resuming");
        catch_unwind(AssertUnwindSafe(|| then.resume(ctx, result)))
            .unwrap_or_else(|payload| Step::fail(panic_error(&self.info.member, payload.as_ref())))
    }

    /// Sends the single reply for this call.
    pub fn finish(mut self, transport: &dyn BusTransport, result: Result<Vec<Value>, BusError>) {
        let result = match (result, &self.outputs) {
            (Ok(args), Some(outputs)) => {
                check_reply_signature(&self.info.member, outputs, &args).map(|()| args)
            }
            (result, _) => result,
        };
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let reply = match &result {
            Ok(args) => {
                self.state = CallState::Completed;
                debug!(outcome = "ok", duration_ms = elapsed_ms, resumes = self.resumes, "call completed");
                Reply::Return(args.clone())
            }
            Err(err) => {
                self.state = CallState::Failed;
                if let BusError::Internal(cause) = err {
                    error!(
                        path = %self.info.path,
                        interface = %self.info.interface,
                        member = %self.info.member,
                        args = %self.args_summary,
                        error = %format!("{cause:#}"),
                        "internal error in handler"
                    );
                }
                debug!(
                    outcome = %err.error_name(),
                    duration_ms = elapsed_ms,
                    resumes = self.resumes,
                    "call failed"
                );
                Reply::from_error(err)
            }
        };
        if let Err(e) = transport.send_reply(&self.info.sender, self.info.serial, reply) {
            warn!(error = %e, "reply not delivered");
        }
    }
}

// ---------------------------------------------------------------------------
// CallScheduler
// ---------------------------------------------------------------------------

struct Parked {
    call: InFlightCall,
    then: Box<dyn Continuation<Vec<Value>>>,
    deadline: Instant,
    timeout: Duration,
}

/// Owns every suspended call and drives handlers step by step.
pub struct CallScheduler {
    transport: Arc<dyn BusTransport>,
    emitter: SignalEmitter,
    parked: HashMap<CallToken, Parked>,
    default_timeout: Duration,
    machine_id: String,
}

impl CallScheduler {
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>, config: &ServerConfig) -> Self {
        Self {
            emitter: SignalEmitter::new(Arc::clone(&transport)),
            transport,
            parked: HashMap::new(),
            default_timeout: config.nested_call_timeout(),
            machine_id: machine_id(),
        }
    }

    #[must_use]
    pub fn emitter(&self) -> &SignalEmitter {
        &self.emitter
    }

    /// Serves an inbound call: resolve, validate, run the first step.
    pub fn start_call(&mut self, registry: &mut ObjectRegistry, info: CallInfo, args: Vec<Value>) {
        let mut call = InFlightCall::new(info, &args);
        let span = call.span();
        let _entered = span.enter();
        let info = Arc::clone(&call.info);

        if is_standard_interface(&info.interface) {
            call.state = CallState::Executing;
            let mut pending = Vec::new();
            let result = catch_unwind(AssertUnwindSafe(|| {
                standard::handle(registry, &info, args, &self.machine_id, &mut pending)
            }))
            .unwrap_or_else(|payload| Err(panic_error(&info.member, payload.as_ref())));
            self.emitter.flush(pending);
            call.finish(self.transport.as_ref(), result);
            return;
        }

        let iface = match registry.resolve_mut(&info.path, &info.interface) {
            Ok(iface) => iface,
            Err(e) => return call.finish(self.transport.as_ref(), Err(e)),
        };
        let Interface {
            methods,
            properties,
            signals,
            ..
        } = iface;
        let mut ctx = CallContext::new(&info, properties, signals);
        call.state = CallState::Executing;
        match methods.dispatch(&info.member, &mut ctx, args) {
            Ok(step) => {
                call.outputs = methods.lookup(&info.member).ok().map(|m| m.outputs().to_vec());
                self.drive(call, &mut ctx, step);
            }
            Err(e) => call.finish(self.transport.as_ref(), Err(e)),
        }
    }

    /// Delivers a nested call's outcome. Returns `false` for tokens that
    /// are not parked (already resumed, expired or cancelled).
    pub fn resume(
        &mut self,
        registry: &mut ObjectRegistry,
        token: CallToken,
        result: NestedResult,
    ) -> bool {
        let Some(Parked { mut call, then, .. }) = self.parked.remove(&token) else {
            trace!(token = %token, "reply for unknown token ignored");
            return false;
        };
        let span = call.span();
        let _entered = span.enter();
        let info = Arc::clone(&call.info);

        match registry.resolve_mut(&info.path, &info.interface) {
            Ok(iface) => {
                let Interface {
                    properties,
                    signals,
                    ..
                } = iface;
                let mut ctx = CallContext::new(&info, properties, signals);
                let step = call.resume_with(then, &mut ctx, result);
                self.drive(call, &mut ctx, step);
            }
            Err(e) => {
                debug!(token = %token, "interface gone while suspended");
                drop(then);
                call.finish(self.transport.as_ref(), Err(e));
            }
        }
        true
    }

    fn drive(&mut self, mut call: InFlightCall, ctx: &mut CallContext<'_>, mut step: Step<Vec<Value>>) {
        loop {
            self.emitter.flush(ctx.take_pending());
            match step {
                Step::Done(result) => return call.finish(self.transport.as_ref(), result),
                Step::Suspend { call: nested, then } => match self.transport.call_async(&nested) {
                    Ok(token) => {
                        let timeout = nested.timeout.unwrap_or(self.default_timeout);
                        call.state = CallState::Suspended(token);
                        debug!(
                            token = %token,
                            destination = %nested.destination,
                            nested_member = %nested.member,
                            "suspended on nested call"
                        );
                        self.parked.insert(
                            token,
                            Parked {
                                call,
                                then,
                                deadline: Instant::now() + timeout,
                                timeout,
                            },
                        );
                        return;
                    }
                    Err(e) => {
                        debug!(error = %e, "nested call could not be issued");
                        step = call.resume_with(then, ctx, Err(e));
                    }
                },
            }
        }
    }

    /// Resumes every call whose nested call has passed its deadline with a
    /// `Timeout` result, abandoning the nested call on the transport.
    /// Returns how many expired.
    pub fn expire(&mut self, registry: &mut ObjectRegistry, now: Instant) -> usize {
        let mut expired: Vec<(CallToken, Duration)> = self
            .parked
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(token, p)| (*token, p.timeout))
            .collect();
        expired.sort_by_key(|(token, _)| *token);
        for (token, timeout) in &expired {
            self.transport.abandon_call(*token);
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            self.resume(registry, *token, Err(BusError::Timeout { timeout_ms }));
        }
        expired.len()
    }

    /// Drops every suspended call made by `peer` without replying and
    /// abandons the nested calls they waited on.
    pub fn cancel_peer(&mut self, peer: &str) -> usize {
        let tokens: Vec<CallToken> = self
            .parked
            .iter()
            .filter(|(_, p)| p.call.info.sender == peer)
            .map(|(token, _)| *token)
            .collect();
        for token in &tokens {
            if let Some(parked) = self.parked.remove(token) {
                self.transport.abandon_call(*token);
                let _entered = parked.call.span().entered();
                warn!(token = %token, "caller disconnected, suspended call discarded");
            }
        }
        tokens.len()
    }

    /// Answers every suspended call with `err()` and forgets it.
    pub fn fail_all(&mut self, err: impl Fn() -> BusError) -> usize {
        let parked: Vec<(CallToken, Parked)> = self.parked.drain().collect();
        let count = parked.len();
        for (token, Parked { call, then, .. }) in parked {
            drop(then);
            self.transport.abandon_call(token);
            let span = call.span();
            let _entered = span.enter();
            call.finish(self.transport.as_ref(), Err(err()));
        }
        count
    }

    /// Forgets every suspended call without replying.
    pub fn discard_all(&mut self) -> usize {
        let count = self.parked.len();
        if count > 0 {
            warn!(count, "connection closed, suspended calls discarded");
        }
        self.parked.clear();
        count
    }

    /// Suspended calls, keyed by the token they wait on.
    pub fn parked(&self) -> impl Iterator<Item = (CallToken, &InFlightCall)> {
        self.parked.iter().map(|(token, p)| (*token, &p.call))
    }

    #[must_use]
    pub fn contains(&self, token: CallToken) -> bool {
        self.parked.contains_key(&token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}

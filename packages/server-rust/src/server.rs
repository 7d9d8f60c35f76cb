//! `ObjectServer`: the composition root.
//!
//! Owns the registry and the call scheduler, holds the transport handle it
//! was constructed with, and runs the reactor loop that feeds inbound
//! events to them.

use std::sync::Arc;

use busline_core::{FromValue, IntoArgs, MethodCall, ToValue, Value};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::BusError;
use crate::handler::{check_declared_signal, CallInfo};
use crate::interface::{Interface, InterfaceBuilder};
use crate::property::SetOrigin;
use crate::registry::ObjectRegistry;
use crate::scheduler::{CallScheduler, InFlightCall};
use crate::shutdown::ShutdownController;
use crate::signal::properties_changed;
use crate::transport::{BusTransport, InboundEvent, Inbox};

/// Exposes objects on a bus connection.
///
/// Objects are declared with [`ObjectServer::add_interface`] and published
/// with [`ObjectServer::initialize`]; then [`ObjectServer::run`] serves
/// calls until the connection closes or shutdown is triggered.
pub struct ObjectServer {
    transport: Arc<dyn BusTransport>,
    registry: ObjectRegistry,
    scheduler: CallScheduler,
    config: ServerConfig,
    shutdown: Arc<ShutdownController>,
    draining: bool,
}

impl ObjectServer {
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>, config: ServerConfig) -> Self {
        Self {
            scheduler: CallScheduler::new(Arc::clone(&transport), &config),
            transport,
            registry: ObjectRegistry::new(),
            config,
            shutdown: Arc::new(ShutdownController::new()),
            draining: false,
        }
    }

    #[must_use]
    pub fn unique_name(&self) -> &str {
        self.transport.unique_name()
    }

    /// Claims a well-known bus name.
    ///
    /// # Errors
    ///
    /// `NameTaken` or `InvalidName`; both abort bring-up.
    pub fn request_name(&self, name: &str) -> Result<(), BusError> {
        self.transport.request_name(name)?;
        info!(name = %name, "bus name acquired");
        Ok(())
    }

    /// Declares an interface on `path`. See [`ObjectRegistry::add_interface`].
    ///
    /// # Errors
    ///
    /// `InvalidName`, `DuplicateName`, `AlreadyInitialized`, or whatever
    /// `build` returns.
    pub fn add_interface<F>(&mut self, path: &str, name: &str, build: F) -> Result<(), BusError>
    where
        F: FnOnce(&mut InterfaceBuilder) -> Result<(), BusError>,
    {
        self.registry.add_interface(path, name, build)?;
        debug!(path = %path, interface = %name, "interface declared");
        Ok(())
    }

    /// Publishes the object at `path`.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `AlreadyInitialized`.
    pub fn initialize(&mut self, path: &str) -> Result<(), BusError> {
        self.registry.initialize(path)?;
        info!(path = %path, "object published");
        Ok(())
    }

    /// Unpublishes one interface. Suspended calls on it fail when resumed.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `UnknownInterface`.
    pub fn remove_interface(&mut self, path: &str, name: &str) -> Result<Interface, BusError> {
        let removed = self.registry.remove_interface(path, name)?;
        info!(path = %path, interface = %name, "interface removed");
        Ok(removed)
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Reads a property of a published object.
    ///
    /// # Errors
    ///
    /// `UnknownObject`, `UnknownInterface` or `UnknownProperty`.
    pub fn get_property(&self, path: &str, interface: &str, name: &str) -> Result<Value, BusError> {
        self.registry.resolve(path, interface)?.properties().get(name)
    }

    /// Typed [`ObjectServer::get_property`].
    ///
    /// # Errors
    ///
    /// As [`ObjectServer::get_property`], plus `Codec` when `T` is not the
    /// declared type.
    pub fn get_property_as<T: FromValue>(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<T, BusError> {
        self.registry
            .resolve(path, interface)?
            .properties()
            .get_as(name)
    }

    /// Writes a property with server privileges: read-only is bypassed,
    /// the setter still runs, and an accepted change is announced.
    ///
    /// # Errors
    ///
    /// Lookup errors, `PropertyRejected`, or `Codec` on a type mismatch.
    pub fn set_property<T: ToValue>(
        &mut self,
        path: &str,
        interface: &str,
        name: &str,
        value: T,
    ) -> Result<(), BusError> {
        self.set_property_value(path, interface, name, value.to_value())
    }

    /// Untyped [`ObjectServer::set_property`].
    ///
    /// # Errors
    ///
    /// As [`ObjectServer::set_property`].
    pub fn set_property_value(
        &mut self,
        path: &str,
        interface: &str,
        name: &str,
        value: Value,
    ) -> Result<(), BusError> {
        let iface = self.registry.resolve_mut(path, interface)?;
        if let Some(change) = iface.properties.set(name, value, SetOrigin::Internal)? {
            self.scheduler
                .emitter()
                .send(properties_changed(path, interface, vec![change]));
        }
        Ok(())
    }

    /// Emits a signal from a published interface.
    ///
    /// # Errors
    ///
    /// Lookup errors, or `ArgumentMismatch` when the signal is declared
    /// with a different signature.
    pub fn emit_signal<A: IntoArgs>(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        args: A,
    ) -> Result<(), BusError> {
        let iface = self.registry.resolve(path, interface)?;
        let args = args.into_args();
        check_declared_signal(iface.signals(), member, &args)?;
        self.scheduler.emitter().emit(path, interface, member, args);
        Ok(())
    }

    /// Feeds one inbound event to the registry and scheduler.
    pub fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::MethodCall(call) => self.dispatch(call),
            InboundEvent::Reply { token, result } => {
                self.scheduler.resume(&mut self.registry, token, result);
            }
            InboundEvent::PeerDisconnected { name } => {
                let cancelled = self.scheduler.cancel_peer(&name);
                if cancelled > 0 {
                    debug!(peer = %name, cancelled, "peer left with suspended calls");
                }
            }
            InboundEvent::Signal(signal) => {
                trace!(
                    sender = %signal.sender,
                    interface = %signal.interface,
                    member = %signal.member,
                    "signal ignored"
                );
            }
        }
    }

    fn dispatch(&mut self, call: MethodCall) {
        let info = CallInfo {
            sender: call.sender,
            serial: call.serial,
            path: call.path,
            interface: call.interface,
            member: call.member,
        };
        if self.draining || self.shutdown.is_draining() {
            InFlightCall::new(info, &call.args)
                .finish(self.transport.as_ref(), Err(BusError::ShuttingDown));
            return;
        }
        self.scheduler.start_call(&mut self.registry, info, call.args);
    }

    /// Times out nested calls whose deadline is at or before `now`.
    pub fn expire_nested(&mut self, now: Instant) -> usize {
        let expired = self.scheduler.expire(&mut self.registry, now);
        if expired > 0 {
            debug!(expired, "nested calls timed out");
        }
        expired
    }

    /// Calls currently suspended on a nested call.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.scheduler.len()
    }

    #[must_use]
    pub fn scheduler(&self) -> &CallScheduler {
        &self.scheduler
    }

    /// Handle for triggering shutdown and observing health.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Runs the reactor until the connection closes or a triggered
    /// shutdown has drained. Returns the server for inspection.
    pub async fn run<I: Inbox>(mut self, mut inbox: I) -> Self {
        let mut shutdown_rx = self.shutdown.shutdown_receiver();
        let mut drain_deadline = None;
        if *shutdown_rx.borrow_and_update() {
            drain_deadline = Some(self.begin_drain());
        } else {
            self.shutdown.set_ready();
        }

        let mut sweep = tokio::time::interval(self.config.timeout_sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            name = %self.transport.unique_name(),
            objects = self.registry.objects().count(),
            "object server running"
        );

        loop {
            if self.draining && self.scheduler.is_empty() {
                info!("drained");
                break;
            }
            tokio::select! {
                event = inbox.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event);
                    } else {
                        self.scheduler.discard_all();
                        info!("bus connection closed");
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.expire_nested(Instant::now());
                    if drain_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        let failed = self.scheduler.fail_all(|| BusError::ShuttingDown);
                        warn!(failed, "drain timeout, suspended calls failed");
                        break;
                    }
                }
                changed = shutdown_rx.changed(), if drain_deadline.is_none() => {
                    if changed.is_ok() && *shutdown_rx.borrow_and_update() {
                        drain_deadline = Some(self.begin_drain());
                    }
                }
            }
        }

        self.shutdown.set_stopped();
        info!("object server stopped");
        self
    }

    /// [`ObjectServer::run`] on a current-thread runtime, blocking the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be built.
    pub fn run_blocking<I: Inbox>(self, inbox: I) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.run(inbox)))
    }

    fn begin_drain(&mut self) -> Instant {
        self.draining = true;
        info!(in_flight = self.scheduler.len(), "shutdown requested, draining");
        Instant::now() + self.config.drain_timeout()
    }
}

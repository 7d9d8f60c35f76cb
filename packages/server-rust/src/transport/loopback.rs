//! In-process bus.
//!
//! Every connection gets a unique name (`:1.N`) and a bounded mpsc inbox
//! of `MsgPack` frames. The bus routes method calls by unique or
//! well-known name, tracks calls awaiting a reply so a callee leaving the
//! bus produces `NoReply` errors, and announces departures with the
//! `NameOwnerChanged` signal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use busline_core::message::standard;
use busline_core::names::{validate_bus_name, NameKind};
use busline_core::{
    ErrorReply, FromArgs, FromValue, IntoArgs, Message, MethodCall, MethodReturn, NameError,
    Signal, ToValue, Value,
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{BusTransport, CallToken, InboundEvent, Inbox, OutboundSignal, Reply};
use crate::error::BusError;
use crate::handler::NestedCall;
use crate::method::decode_args;

/// Loopback bus settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of each connection's inbox, in frames.
    pub inbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 256,
        }
    }
}

struct BusInner {
    config: BusConfig,
    connections: DashMap<String, mpsc::Sender<Vec<u8>>>,
    /// Well-known name -> owning unique name.
    owners: DashMap<String, String>,
    /// (caller, serial) -> callee, for calls still awaiting a reply.
    pending: DashMap<(String, u64), String>,
    next_id: AtomicU64,
}

impl BusInner {
    fn resolve(&self, name: &str) -> Option<String> {
        if name.starts_with(':') {
            self.connections.contains_key(name).then(|| name.to_string())
        } else {
            self.owners.get(name).map(|owner| owner.value().clone())
        }
    }

    /// Enqueues a frame without waiting. Returns `false` when the target is
    /// gone or its inbox is full.
    fn deliver(&self, unique: &str, msg: &Message) -> bool {
        let Some(tx) = self.connections.get(unique).map(|tx| tx.value().clone()) else {
            return false;
        };
        let bytes = match msg.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, kind = msg.kind(), "frame encoding failed");
                return false;
            }
        };
        match tx.try_send(bytes) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(to = %unique, kind = msg.kind(), "inbox full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn broadcast(&self, msg: &Message, except: &str) {
        let targets: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| name != except)
            .collect();
        for target in targets {
            self.deliver(&target, msg);
        }
    }

    fn bus_error(&self, to: &str, reply_serial: u64, name: &str, message: String) {
        self.deliver(
            to,
            &Message::Error(ErrorReply {
                reply_serial,
                sender: standard::BUS_NAME.to_string(),
                destination: to.to_string(),
                name: name.to_string(),
                message,
            }),
        );
    }

    fn name_owner_changed(&self, name: &str, old: &str, new: &str) {
        let msg = Message::Signal(Signal {
            sender: standard::BUS_NAME.to_string(),
            destination: None,
            path: standard::BUS_PATH.to_string(),
            interface: standard::BUS_INTERFACE.to_string(),
            member: standard::NAME_OWNER_CHANGED.to_string(),
            args: vec![
                Value::String(name.to_string()),
                Value::String(old.to_string()),
                Value::String(new.to_string()),
            ],
        });
        self.broadcast(&msg, "");
    }

    fn disconnect(&self, unique: &str) {
        if self.connections.remove(unique).is_none() {
            return;
        }
        debug!(name = %unique, "connection left the bus");

        let mut released = Vec::new();
        self.owners.retain(|name, owner| {
            if owner == unique {
                released.push(name.clone());
                false
            } else {
                true
            }
        });

        let mut orphaned = Vec::new();
        self.pending.retain(|(caller, serial), callee| {
            if callee == unique {
                orphaned.push((caller.clone(), *serial));
                false
            } else {
                caller != unique
            }
        });
        for (caller, serial) in orphaned {
            self.bus_error(
                &caller,
                serial,
                standard::ERROR_NO_REPLY,
                format!("{unique} left the bus without replying"),
            );
        }

        for name in &released {
            self.name_owner_changed(name, unique, "");
        }
        self.name_owner_changed(unique, unique, "");
    }
}

/// An in-process bus. Cloning shares the same bus.
#[derive(Clone)]
pub struct LoopbackBus {
    inner: Arc<BusInner>,
}

impl LoopbackBus {
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                connections: DashMap::new(),
                owners: DashMap::new(),
                pending: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a connection. The connection sends, the inbox receives.
    #[must_use]
    pub fn connect(&self) -> (LoopbackConnection, LoopbackInbox) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let unique = format!(":1.{id}");
        let (tx, rx) = mpsc::channel(self.inner.config.inbox_capacity);
        self.inner.connections.insert(unique.clone(), tx);
        debug!(name = %unique, "connection joined the bus");
        (
            LoopbackConnection {
                bus: Arc::clone(&self.inner),
                unique: unique.clone(),
                next_serial: AtomicU64::new(1),
            },
            LoopbackInbox { unique, rx },
        )
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Unique name currently owning `name`.
    #[must_use]
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.inner.resolve(name)
    }

    /// Calls still waiting for a reply, across all connections.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

// ---------------------------------------------------------------------------
// LoopbackConnection
// ---------------------------------------------------------------------------

/// Sending half of a loopback connection. Dropping it leaves the bus.
pub struct LoopbackConnection {
    bus: Arc<BusInner>,
    unique: String,
    next_serial: AtomicU64,
}

impl LoopbackConnection {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.bus.connections.contains_key(&self.unique)
    }

    /// Leaves the bus: releases owned names, fails calls awaiting this
    /// connection's replies, and closes its inbox.
    pub fn disconnect(&self) {
        self.bus.disconnect(&self.unique);
    }

    fn ensure_connected(&self) -> Result<(), BusError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BusError::Disconnected)
        }
    }
}

impl std::fmt::Debug for LoopbackConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnection")
            .field("unique", &self.unique)
            .finish_non_exhaustive()
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.bus.disconnect(&self.unique);
    }
}

impl BusTransport for LoopbackConnection {
    fn unique_name(&self) -> &str {
        &self.unique
    }

    fn request_name(&self, name: &str) -> Result<(), BusError> {
        validate_bus_name(name)?;
        if name.starts_with(':') {
            return Err(BusError::InvalidName(NameError {
                kind: NameKind::BusName,
                name: name.to_string(),
            }));
        }
        self.ensure_connected()?;
        match self.bus.owners.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                if entry.get() == &self.unique {
                    Ok(())
                } else {
                    Err(BusError::NameTaken {
                        name: name.to_string(),
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(self.unique.clone());
                debug!(name = %name, owner = %self.unique, "name acquired");
                Ok(())
            }
        }
    }

    fn send_reply(
        &self,
        destination: &str,
        reply_serial: u64,
        reply: Reply,
    ) -> Result<(), BusError> {
        self.ensure_connected()?;
        self.bus
            .pending
            .remove(&(destination.to_string(), reply_serial));
        let msg = match reply {
            Reply::Return(args) => Message::MethodReturn(MethodReturn {
                reply_serial,
                sender: self.unique.clone(),
                destination: destination.to_string(),
                args,
            }),
            Reply::Error { name, message } => Message::Error(ErrorReply {
                reply_serial,
                sender: self.unique.clone(),
                destination: destination.to_string(),
                name,
                message,
            }),
        };
        if !self.bus.deliver(destination, &msg) {
            debug!(to = %destination, reply_serial, "reply undeliverable");
        }
        Ok(())
    }

    fn send_signal(&self, signal: OutboundSignal) -> Result<(), BusError> {
        self.ensure_connected()?;
        let msg = Message::Signal(Signal {
            sender: self.unique.clone(),
            destination: None,
            path: signal.path,
            interface: signal.interface,
            member: signal.member,
            args: signal.args,
        });
        self.bus.broadcast(&msg, &self.unique);
        Ok(())
    }

    fn call_async(&self, call: &NestedCall) -> Result<CallToken, BusError> {
        self.ensure_connected()?;
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let Some(callee) = self.bus.resolve(&call.destination) else {
            self.bus.bus_error(
                &self.unique,
                serial,
                standard::ERROR_SERVICE_UNKNOWN,
                format!("the name {} is not owned on this bus", call.destination),
            );
            return Ok(CallToken(serial));
        };

        let msg = Message::MethodCall(MethodCall {
            serial,
            sender: self.unique.clone(),
            destination: call.destination.clone(),
            path: call.path.clone(),
            interface: call.interface.clone(),
            member: call.member.clone(),
            args: call.args.clone(),
        });
        self.bus
            .pending
            .insert((self.unique.clone(), serial), callee.clone());
        if !self.bus.deliver(&callee, &msg) {
            self.bus.pending.remove(&(self.unique.clone(), serial));
            self.bus.bus_error(
                &self.unique,
                serial,
                standard::ERROR_NO_REPLY,
                format!("{callee} cannot accept calls"),
            );
        }
        trace!(serial, to = %callee, member = %call.member, "call sent");
        Ok(CallToken(serial))
    }

    fn abandon_call(&self, token: CallToken) {
        if self.bus.pending.remove(&(self.unique.clone(), token.0)).is_some() {
            trace!(serial = token.0, "pending call abandoned");
        }
    }
}

// ---------------------------------------------------------------------------
// LoopbackInbox
// ---------------------------------------------------------------------------

/// Receiving half of a loopback connection.
pub struct LoopbackInbox {
    unique: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl LoopbackInbox {
    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.unique
    }

    /// Next decodable frame. `None` once the connection has left the bus
    /// and the inbox is drained.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            let bytes = self.rx.recv().await?;
            match Message::decode(&bytes) {
                Ok(msg) => return Some(msg),
                Err(e) => warn!(name = %self.unique, error = %e, "undecodable frame skipped"),
            }
        }
    }
}

/// Maps a frame to the event the reactor consumes.
fn into_event(msg: Message) -> InboundEvent {
    match msg {
        Message::MethodCall(call) => InboundEvent::MethodCall(call),
        Message::MethodReturn(ret) => InboundEvent::Reply {
            token: CallToken(ret.reply_serial),
            result: Ok(ret.args),
        },
        Message::Error(err) => InboundEvent::Reply {
            token: CallToken(err.reply_serial),
            result: Err(BusError::from_error_reply(&err.name, &err.message)),
        },
        Message::Signal(signal) => match departed_peer(&signal) {
            Some(name) => InboundEvent::PeerDisconnected { name },
            None => InboundEvent::Signal(signal),
        },
    }
}

/// Unique name announced as gone by a `NameOwnerChanged` signal.
fn departed_peer(signal: &Signal) -> Option<String> {
    if signal.sender != standard::BUS_NAME
        || signal.interface != standard::BUS_INTERFACE
        || signal.member != standard::NAME_OWNER_CHANGED
    {
        return None;
    }
    match signal.args.as_slice() {
        [Value::String(name), Value::String(_old), Value::String(new)]
            if name.starts_with(':') && new.is_empty() =>
        {
            Some(name.clone())
        }
        _ => None,
    }
}

#[async_trait]
impl Inbox for LoopbackInbox {
    async fn recv(&mut self) -> Option<InboundEvent> {
        self.recv_message().await.map(into_event)
    }
}

// ---------------------------------------------------------------------------
// LoopbackClient
// ---------------------------------------------------------------------------

/// Calling side of a loopback connection, for tests and the demo binary.
///
/// Signals that arrive while a call is waiting are buffered. Inbound method
/// calls are answered with `UnknownObject`.
pub struct LoopbackClient {
    conn: LoopbackConnection,
    inbox: LoopbackInbox,
    signals: VecDeque<Signal>,
    timeout: Duration,
}

impl LoopbackClient {
    #[must_use]
    pub fn connect(bus: &LoopbackBus) -> Self {
        let (conn, inbox) = bus.connect();
        Self {
            conn,
            inbox,
            signals: VecDeque::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Replaces the per-call timeout (5 s by default).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.conn.unique
    }

    #[must_use]
    pub fn connection(&self) -> &LoopbackConnection {
        &self.conn
    }

    /// Calls a method and waits for its reply.
    ///
    /// # Errors
    ///
    /// The callee's error reply, `Timeout` when no reply arrives in time,
    /// or `Disconnected`.
    pub async fn call(
        &mut self,
        destination: &str,
        path: &str,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, BusError> {
        let mut nested = NestedCall::new(destination, path, interface, member);
        nested.args = args;
        let token = self.conn.call_async(&nested)?;
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            let msg = match tokio::time::timeout_at(deadline, self.inbox.recv_message()).await {
                Err(_) => {
                    return Err(BusError::Timeout {
                        timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                }
                Ok(None) => return Err(BusError::Disconnected),
                Ok(Some(msg)) => msg,
            };
            match msg {
                Message::MethodReturn(ret) if ret.reply_serial == token.0 => return Ok(ret.args),
                Message::Error(err) if err.reply_serial == token.0 => {
                    return Err(BusError::from_error_reply(&err.name, &err.message))
                }
                other => self.absorb(other),
            }
        }
    }

    /// Typed [`LoopbackClient::call`].
    ///
    /// # Errors
    ///
    /// As [`LoopbackClient::call`], plus `ArgumentMismatch` when the reply
    /// does not decode as `R`.
    pub async fn call_method<A: IntoArgs, R: FromArgs>(
        &mut self,
        destination: &str,
        path: &str,
        interface: &str,
        member: &str,
        args: A,
    ) -> Result<R, BusError> {
        let reply = self
            .call(destination, path, interface, member, args.into_args())
            .await?;
        decode_args(member, reply)
    }

    /// `org.freedesktop.DBus.Properties.Get`.
    ///
    /// # Errors
    ///
    /// As [`LoopbackClient::call_method`].
    pub async fn get_property<T: FromValue>(
        &mut self,
        destination: &str,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<T, BusError> {
        let (value,): (Value,) = self
            .call_method(
                destination,
                path,
                standard::PROPERTIES,
                "Get",
                (interface, name),
            )
            .await?;
        Ok(busline_core::decode(value)?)
    }

    /// `org.freedesktop.DBus.Properties.Set`.
    ///
    /// # Errors
    ///
    /// As [`LoopbackClient::call`].
    pub async fn set_property<T: ToValue>(
        &mut self,
        destination: &str,
        path: &str,
        interface: &str,
        name: &str,
        value: T,
    ) -> Result<(), BusError> {
        self.call(
            destination,
            path,
            standard::PROPERTIES,
            "Set",
            vec![
                Value::String(interface.to_string()),
                Value::String(name.to_string()),
                value.to_value().into_variant(),
            ],
        )
        .await
        .map(drop)
    }

    /// Signals buffered so far, oldest first.
    pub fn take_signals(&mut self) -> Vec<Signal> {
        self.signals.drain(..).collect()
    }

    /// Next signal, waiting up to `timeout` for one to arrive.
    pub async fn next_signal(&mut self, timeout: Duration) -> Option<Signal> {
        if let Some(signal) = self.signals.pop_front() {
            return Some(signal);
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.inbox.recv_message()).await {
                Ok(Some(Message::Signal(signal))) => return Some(signal),
                Ok(Some(other)) => self.absorb(other),
                Ok(None) | Err(_) => return None,
            }
        }
    }

    pub fn disconnect(self) {
        self.conn.disconnect();
    }

    fn absorb(&mut self, msg: Message) {
        match msg {
            Message::Signal(signal) => self.signals.push_back(signal),
            Message::MethodCall(call) => {
                let err = BusError::UnknownObject { path: call.path };
                // Best effort: the caller may be gone already.
                let _ = self
                    .conn
                    .send_reply(&call.sender, call.serial, Reply::from_error(&err));
            }
            Message::MethodReturn(_) | Message::Error(_) => {
                trace!("stale reply ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(destination: &str, member: &str) -> NestedCall {
        NestedCall::new(destination, "/backend", "xyz.backend", member)
    }

    #[test]
    fn unique_names_are_distinct() {
        let bus = LoopbackBus::default();
        let (a, _ia) = bus.connect();
        let (b, _ib) = bus.connect();
        assert_ne!(a.unique_name(), b.unique_name());
        assert!(a.unique_name().starts_with(":1."));
        assert_eq!(bus.connection_count(), 2);
    }

    #[test]
    fn well_known_names_are_exclusive() {
        let bus = LoopbackBus::default();
        let (a, _ia) = bus.connect();
        let (b, _ib) = bus.connect();
        a.request_name("xyz.openbmc_project.Calculator").unwrap();
        a.request_name("xyz.openbmc_project.Calculator").unwrap();
        assert!(matches!(
            b.request_name("xyz.openbmc_project.Calculator"),
            Err(BusError::NameTaken { .. })
        ));
        assert!(matches!(
            b.request_name("nodots"),
            Err(BusError::InvalidName(_))
        ));
        assert_eq!(
            bus.owner_of("xyz.openbmc_project.Calculator").as_deref(),
            Some(a.unique_name())
        );
    }

    #[tokio::test]
    async fn call_routes_by_well_known_name_and_reply_returns() {
        let bus = LoopbackBus::default();
        let (server, mut server_inbox) = bus.connect();
        server.request_name("xyz.backend").unwrap();
        let (caller, mut caller_inbox) = bus.connect();

        let token = caller
            .call_async(&nested("xyz.backend", "Echo").args((5_i32,)))
            .unwrap();
        let Some(InboundEvent::MethodCall(call)) = server_inbox.recv().await else {
            panic!("expected method call");
        };
        assert_eq!(call.args, vec![Value::Int32(5)]);
        assert_eq!(call.sender, caller.unique_name());
        assert_eq!(bus.pending_calls(), 1);

        server
            .send_reply(&call.sender, call.serial, Reply::Return(vec![Value::Int32(6)]))
            .unwrap();
        assert_eq!(bus.pending_calls(), 0);
        match caller_inbox.recv().await {
            Some(InboundEvent::Reply { token: t, result }) => {
                assert_eq!(t, token);
                assert_eq!(result.unwrap(), vec![Value::Int32(6)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn abandoned_call_leaves_no_pending_entry() {
        let bus = LoopbackBus::default();
        let (server, mut server_inbox) = bus.connect();
        server.request_name("xyz.backend").unwrap();
        let (caller, _caller_inbox) = bus.connect();

        let token = caller.call_async(&nested("xyz.backend", "Echo")).unwrap();
        assert_eq!(bus.pending_calls(), 1);
        caller.abandon_call(token);
        caller.abandon_call(token);
        assert_eq!(bus.pending_calls(), 0);

        // The callee can still answer late.
        let Some(InboundEvent::MethodCall(call)) = server_inbox.recv().await else {
            panic!("expected method call");
        };
        server
            .send_reply(&call.sender, call.serial, Reply::Return(vec![]))
            .unwrap();
        assert_eq!(bus.pending_calls(), 0);
    }

    #[tokio::test]
    async fn unroutable_call_gets_service_unknown() {
        let bus = LoopbackBus::default();
        let (caller, mut inbox) = bus.connect();
        let token = caller.call_async(&nested("xyz.nobody", "Echo")).unwrap();
        match inbox.recv().await {
            Some(InboundEvent::Reply { token: t, result: Err(BusError::Domain { name, .. }) }) => {
                assert_eq!(t, token);
                assert_eq!(name, standard::ERROR_SERVICE_UNKNOWN);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn callee_leaving_produces_no_reply_and_peer_disconnected() {
        let bus = LoopbackBus::default();
        let (callee, _callee_inbox) = bus.connect();
        callee.request_name("xyz.backend").unwrap();
        let callee_name = callee.unique_name().to_string();
        let (caller, mut inbox) = bus.connect();

        let token = caller.call_async(&nested("xyz.backend", "Echo")).unwrap();
        drop(callee);

        match inbox.recv().await {
            Some(InboundEvent::Reply { token: t, result }) => {
                assert_eq!(t, token);
                assert!(matches!(result, Err(BusError::Timeout { .. })));
            }
            other => panic!("unexpected {other:?}"),
        }
        // Well-known name release is an ordinary signal.
        assert!(matches!(inbox.recv().await, Some(InboundEvent::Signal(_))));
        match inbox.recv().await {
            Some(InboundEvent::PeerDisconnected { name }) => assert_eq!(name, callee_name),
            other => panic!("unexpected {other:?}"),
        }
        assert!(bus.owner_of("xyz.backend").is_none());
        assert_eq!(bus.pending_calls(), 0);
    }

    #[tokio::test]
    async fn own_disconnect_closes_inbox() {
        let bus = LoopbackBus::default();
        let (conn, mut inbox) = bus.connect();
        conn.disconnect();
        assert!(!conn.is_connected());
        assert!(inbox.recv().await.is_none());
        assert!(matches!(
            conn.send_signal(OutboundSignal {
                path: "/".into(),
                interface: "a.b".into(),
                member: "X".into(),
                args: vec![],
            }),
            Err(BusError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn signals_reach_everyone_but_the_sender() {
        let bus = LoopbackBus::default();
        let (emitter, mut own) = bus.connect();
        let mut listener = LoopbackClient::connect(&bus);
        emitter
            .send_signal(OutboundSignal {
                path: "/calculator".into(),
                interface: "xyz.openbmc_project.Calculator".into(),
                member: "Cleared".into(),
                args: vec![Value::Int64(3)],
            })
            .unwrap();
        let signal = listener
            .next_signal(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(signal.member, "Cleared");
        assert_eq!(signal.sender, emitter.unique_name());
        assert!(own.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn client_call_times_out() {
        let bus = LoopbackBus::default();
        let (silent, _silent_inbox) = bus.connect();
        silent.request_name("xyz.silent").unwrap();
        let mut client = LoopbackClient::connect(&bus).with_timeout(Duration::from_millis(20));
        let err = client
            .call("xyz.silent", "/", "xyz.silent", "Nothing", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout { timeout_ms: 20 }));
    }

    #[test]
    fn inbox_capacity_bounds_delivery() {
        let bus = LoopbackBus::new(BusConfig { inbox_capacity: 1 });
        let (a, _ia) = bus.connect();
        let (_b, mut ib) = bus.connect();
        let signal = OutboundSignal {
            path: "/".into(),
            interface: "a.b".into(),
            member: "X".into(),
            args: vec![],
        };
        // The second frame is dropped, not queued; sending still succeeds.
        a.send_signal(signal.clone()).unwrap();
        a.send_signal(signal).unwrap();
        assert!(ib.rx.try_recv().is_ok());
        assert!(ib.rx.try_recv().is_err());
    }
}

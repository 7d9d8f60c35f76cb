//! Bus transport boundary.
//!
//! The object server never touches a socket. It sends through a
//! [`BusTransport`] handle and receives through an [`Inbox`]; both are
//! handed to it by the composition root.

pub mod loopback;
#[cfg(test)]
pub(crate) mod recording;

use async_trait::async_trait;
use busline_core::{MethodCall, Signal, Value};
use tokio::sync::mpsc;

use crate::error::BusError;
use crate::handler::NestedCall;

pub use loopback::{BusConfig, LoopbackBus, LoopbackClient, LoopbackConnection, LoopbackInbox};

/// Identifies an outgoing call until its reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallToken(pub u64);

impl std::fmt::Display for CallToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reply body for an inbound method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Return(Vec<Value>),
    Error { name: String, message: String },
}

impl Reply {
    #[must_use]
    pub fn from_error(err: &BusError) -> Self {
        Reply::Error {
            name: err.error_name().to_string(),
            message: err.reply_message(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// A signal ready to leave the server.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSignal {
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

/// Capabilities the server consumes from a bus connection.
pub trait BusTransport: Send + Sync {
    /// Unique name of this connection, e.g. `:1.4`.
    fn unique_name(&self) -> &str;

    /// Claims a well-known name.
    ///
    /// # Errors
    ///
    /// Returns `NameTaken` if another connection owns the name, or
    /// `InvalidName` if the name is malformed.
    fn request_name(&self, name: &str) -> Result<(), BusError>;

    /// Sends the one reply for call `reply_serial` from `destination`.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if this connection is closed.
    fn send_reply(&self, destination: &str, reply_serial: u64, reply: Reply)
        -> Result<(), BusError>;

    /// Broadcasts a signal.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if this connection is closed.
    fn send_signal(&self, signal: OutboundSignal) -> Result<(), BusError>;

    /// Issues a method call whose reply arrives later as
    /// [`InboundEvent::Reply`] carrying the returned token.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if this connection is closed.
    fn call_async(&self, call: &NestedCall) -> Result<CallToken, BusError>;

    /// Gives up on a call issued by [`BusTransport::call_async`]. A reply
    /// arriving afterwards is not expected to reach the reactor.
    fn abandon_call(&self, _token: CallToken) {}
}

/// What a connection delivers to the reactor.
#[derive(Debug)]
pub enum InboundEvent {
    MethodCall(MethodCall),
    /// Reply (or error) to a call previously issued with `call_async`.
    Reply {
        token: CallToken,
        result: Result<Vec<Value>, BusError>,
    },
    Signal(Signal),
    /// A peer connection left the bus.
    PeerDisconnected { name: String },
}

/// Source of inbound events. `None` means this connection has closed.
#[async_trait]
pub trait Inbox: Send {
    async fn recv(&mut self) -> Option<InboundEvent>;
}

#[async_trait]
impl Inbox for mpsc::Receiver<InboundEvent> {
    async fn recv(&mut self) -> Option<InboundEvent> {
        mpsc::Receiver::recv(self).await
    }
}

//! Signal emission.
//!
//! Signals are fire-and-forget: a transport failure is logged and the
//! signal is dropped.

use std::sync::Arc;

use busline_core::message::standard;
use busline_core::{Value, ValueType};
use tracing::{trace, warn};

use crate::property::PropertyChange;
use crate::transport::{BusTransport, OutboundSignal};

/// A signal queued during a handler step.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSignal {
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

/// Builds `PropertiesChanged(s interface, a{sv} changed, as invalidated)`
/// for one property-table mutation.
#[must_use]
pub fn properties_changed(path: &str, interface: &str, changes: Vec<PropertyChange>) -> PendingSignal {
    let mut changed = Vec::new();
    let mut invalidated = Vec::new();
    for change in changes {
        match change {
            PropertyChange::Changed { name, value } => {
                changed.push((Value::String(name), value.into_variant()));
            }
            PropertyChange::Invalidated { name } => invalidated.push(Value::String(name)),
        }
    }
    PendingSignal {
        path: path.to_string(),
        interface: standard::PROPERTIES.to_string(),
        member: standard::PROPERTIES_CHANGED.to_string(),
        args: vec![
            Value::String(interface.to_string()),
            Value::Dict {
                key: ValueType::String,
                value: ValueType::Variant,
                entries: changed,
            },
            Value::array(ValueType::String, invalidated),
        ],
    }
}

/// Hands signals to the transport.
#[derive(Clone)]
pub struct SignalEmitter {
    transport: Arc<dyn BusTransport>,
}

impl SignalEmitter {
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self { transport }
    }

    pub fn emit(&self, path: &str, interface: &str, member: &str, args: Vec<Value>) {
        self.send(PendingSignal {
            path: path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
            args,
        });
    }

    pub fn send(&self, signal: PendingSignal) {
        trace!(
            path = %signal.path,
            interface = %signal.interface,
            member = %signal.member,
            "emitting signal"
        );
        let outbound = OutboundSignal {
            path: signal.path,
            interface: signal.interface,
            member: signal.member,
            args: signal.args,
        };
        let member = outbound.member.clone();
        if let Err(e) = self.transport.send_signal(outbound) {
            warn!(member = %member, error = %e, "signal dropped");
        }
    }

    /// Sends queued signals in the order they were queued.
    pub fn flush(&self, pending: Vec<PendingSignal>) {
        for signal in pending {
            self.send(signal);
        }
    }
}

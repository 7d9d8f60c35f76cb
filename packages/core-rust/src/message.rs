//! Bus message frames.
//!
//! Four frame kinds travel between connections: method calls, method
//! returns, error replies and signals. Frames serialize to `MsgPack` via
//! `rmp_serde::to_vec_named()`; this is the framing used by the in-process
//! loopback bus.

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;
use crate::types::Value;

/// Standard interface and error names.
pub mod standard {
    pub const BUS_NAME: &str = "org.freedesktop.DBus";
    pub const BUS_PATH: &str = "/org/freedesktop/DBus";
    pub const BUS_INTERFACE: &str = "org.freedesktop.DBus";
    pub const NAME_OWNER_CHANGED: &str = "NameOwnerChanged";

    pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";
    pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";
    pub const PEER: &str = "org.freedesktop.DBus.Peer";
    pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";

    pub const ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";
    pub const ERROR_UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const ERROR_UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const ERROR_UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const ERROR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const ERROR_PROPERTY_READ_ONLY: &str = "org.freedesktop.DBus.Error.PropertyReadOnly";
    pub const ERROR_TIMEOUT: &str = "org.freedesktop.DBus.Error.Timeout";
    pub const ERROR_NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
    pub const ERROR_SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
    pub const ERROR_NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";
    pub const ERROR_DISCONNECTED: &str = "org.freedesktop.DBus.Error.Disconnected";
    pub const ERROR_NO_SERVER: &str = "org.freedesktop.DBus.Error.NoServer";
    pub const ERROR_ADDRESS_IN_USE: &str = "org.freedesktop.DBus.Error.AddressInUse";
}

/// A method invocation addressed to an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCall {
    /// Per-sender serial; replies refer back to it.
    pub serial: u64,
    /// Unique name of the calling connection.
    pub sender: String,
    /// Well-known or unique name of the target connection.
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

/// Successful reply to a method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodReturn {
    pub reply_serial: u64,
    pub sender: String,
    pub destination: String,
    pub args: Vec<Value>,
}

/// Error reply to a method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub reply_serial: u64,
    pub sender: String,
    pub destination: String,
    /// Dotted error name, e.g. `org.freedesktop.DBus.Error.UnknownMethod`.
    pub name: String,
    pub message: String,
}

/// One-way notification. `destination` is `None` for broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub destination: Option<String>,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

/// Any frame carried by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    MethodCall(MethodCall),
    MethodReturn(MethodReturn),
    Error(ErrorReply),
    Signal(Signal),
}

impl Message {
    /// Serializes the frame to `MsgPack` with named fields.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Frame` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(self).map_err(|e| CodecError::Frame(e.to_string()))
    }

    /// Deserializes a frame produced by [`Message::encode`].
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Frame` if the bytes are not a valid frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Frame(e.to_string()))
    }

    /// Unique name of the connection that produced this frame.
    #[must_use]
    pub fn sender(&self) -> &str {
        match self {
            Message::MethodCall(m) => &m.sender,
            Message::MethodReturn(m) => &m.sender,
            Message::Error(m) => &m.sender,
            Message::Signal(m) => &m.sender,
        }
    }

    /// Short frame kind label for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::MethodCall(_) => "method_call",
            Message::MethodReturn(_) => "method_return",
            Message::Error(_) => "error",
            Message::Signal(_) => "signal",
        }
    }
}

//! Error taxonomy for registration, dispatch and nested calls.

use busline_core::message::standard;
use busline_core::{CodecError, NameError};

/// Errors raised by the object server.
///
/// Registration-time variants (`DuplicateName`, `AlreadyInitialized`,
/// `NameTaken`, `InvalidName`) abort server bring-up. Every other variant
/// is per-call: the call scheduler turns it into exactly one error reply.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("name already registered: {name}")]
    DuplicateName { name: String },
    #[error("unknown object: {path}")]
    UnknownObject { path: String },
    #[error("unknown interface '{interface}' at {path}")]
    UnknownInterface { path: String, interface: String },
    #[error("unknown method '{member}' on {interface}")]
    UnknownMethod { interface: String, member: String },
    #[error("unknown property '{name}' on {interface}")]
    UnknownProperty { interface: String, name: String },
    #[error("argument mismatch for '{member}': expected '{expected}', found '{found}'")]
    ArgumentMismatch {
        member: String,
        expected: String,
        found: String,
    },
    #[error("property '{name}' is read-only")]
    ReadOnlyProperty { name: String },
    #[error("property '{name}' rejected the value: {reason}")]
    PropertyRejected { name: String, reason: String },
    #[error("{name}: {message}")]
    Domain { name: String, message: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
    #[error("bus name already owned: {name}")]
    NameTaken { name: String },
    #[error("object {path} is already initialized")]
    AlreadyInitialized { path: String },
    #[error("nested call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("connection closed")]
    Disconnected,
    #[error("server is shutting down")]
    ShuttingDown,
}

impl BusError {
    /// Handler-reported failure with a caller-visible error name.
    pub fn domain(name: impl Into<String>, message: impl Into<String>) -> Self {
        BusError::Domain {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Bus error name sent in the error reply.
    #[must_use]
    pub fn error_name(&self) -> &str {
        match self {
            BusError::UnknownObject { .. } => standard::ERROR_UNKNOWN_OBJECT,
            BusError::UnknownInterface { .. } => standard::ERROR_UNKNOWN_INTERFACE,
            BusError::UnknownMethod { .. } => standard::ERROR_UNKNOWN_METHOD,
            BusError::UnknownProperty { .. } => standard::ERROR_UNKNOWN_PROPERTY,
            BusError::ArgumentMismatch { .. }
            | BusError::PropertyRejected { .. }
            | BusError::InvalidName(_)
            | BusError::Codec(_) => standard::ERROR_INVALID_ARGS,
            BusError::ReadOnlyProperty { .. } => standard::ERROR_PROPERTY_READ_ONLY,
            BusError::Domain { name, .. } => name,
            BusError::Timeout { .. } => standard::ERROR_TIMEOUT,
            BusError::Disconnected => standard::ERROR_DISCONNECTED,
            BusError::ShuttingDown => standard::ERROR_NO_SERVER,
            BusError::NameTaken { .. } => standard::ERROR_ADDRESS_IN_USE,
            BusError::DuplicateName { .. }
            | BusError::AlreadyInitialized { .. }
            | BusError::Internal(_) => standard::ERROR_FAILED,
        }
    }

    /// Message text sent in the error reply. Internal errors are not
    /// described to callers.
    #[must_use]
    pub fn reply_message(&self) -> String {
        match self {
            BusError::Internal(_) => "internal error".to_string(),
            BusError::Domain { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuilds an error from a received error reply.
    #[must_use]
    pub fn from_error_reply(name: &str, message: &str) -> Self {
        match name {
            standard::ERROR_TIMEOUT | standard::ERROR_NO_REPLY => BusError::Timeout {
                timeout_ms: 0,
            },
            standard::ERROR_DISCONNECTED => BusError::Disconnected,
            _ => BusError::domain(name, message),
        }
    }

    /// Whether this error can only come out of server setup.
    #[must_use]
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            BusError::DuplicateName { .. }
                | BusError::AlreadyInitialized { .. }
                | BusError::NameTaken { .. }
                | BusError::InvalidName(_)
        )
    }
}

/// A property setter's refusal to accept a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

//! Busline core: typed bus values, signatures, name rules and message frames.
//!
//! This crate has no notion of objects or dispatch; it defines what travels
//! over the bus and how Rust values map onto it.

pub mod codec;
pub mod message;
pub mod names;
pub mod signature;
pub mod types;

pub use codec::{
    decode, BusType, CodecError, FromArgs, FromValue, IntoArgs, ReturnArgs, ToValue,
};
pub use message::{ErrorReply, Message, MethodCall, MethodReturn, Signal};
pub use names::{NameError, NameKind};
pub use signature::{parse_signature, signature_of};
pub use types::{summarize_args, ObjectPath, Value, ValueType};

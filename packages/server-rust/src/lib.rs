//! Busline server: exposes objects on a message bus.
//!
//! Objects carry interfaces made of typed properties, methods and signals.
//! Method handlers either finish in one step or suspend on nested calls
//! to other services; the [`scheduler::CallScheduler`] parks and resumes
//! them on a single reactor without blocking other calls.

pub mod config;
pub mod demo;
pub mod error;
pub mod handler;
pub mod interface;
pub mod introspect;
pub mod logging;
pub mod method;
pub mod property;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod signal;
pub mod standard;
pub mod transport;

pub use config::ServerConfig;
pub use error::{BusError, Rejection};
pub use handler::{CallContext, CallInfo, Continuation, NestedCall, NestedResult, Step};
pub use interface::{Interface, InterfaceBuilder, PropertyBuilder, SignalDecl};
pub use logging::{init_tracing, LogFormat};
pub use method::{Handler, Method, MethodTable};
pub use property::{
    Access, NotifyMode, Property, PropertyAccessor, PropertyChange, PropertyDef, PropertyTable,
    SetOrigin, StoredValue, TypedAccessor,
};
pub use registry::{Object, ObjectRegistry};
pub use scheduler::{CallScheduler, CallState, InFlightCall};
pub use server::ObjectServer;
pub use shutdown::{HealthState, ShutdownController};
pub use signal::{PendingSignal, SignalEmitter};
pub use transport::{
    BusConfig, BusTransport, CallToken, InboundEvent, Inbox, LoopbackBus, LoopbackClient,
    LoopbackConnection, LoopbackInbox, OutboundSignal, Reply,
};

//! Properties, Introspectable and Peer: answered for every published object.

use std::collections::BTreeMap;

use busline_core::message::standard;
use busline_core::{ToValue, Value};

use crate::error::BusError;
use crate::handler::CallInfo;
use crate::introspect::introspect;
use crate::method::decode_args;
use crate::property::SetOrigin;
use crate::registry::ObjectRegistry;
use crate::signal::{properties_changed, PendingSignal};

/// Serves one call on a standard interface. Change signals caused by a
/// `Set` are pushed to `pending` after the value is committed.
///
/// # Errors
///
/// Whatever the addressed property or object lookup reports, or
/// `UnknownMethod` for members the standard interface does not define.
pub(crate) fn handle(
    registry: &mut ObjectRegistry,
    info: &CallInfo,
    args: Vec<Value>,
    machine_id: &str,
    pending: &mut Vec<PendingSignal>,
) -> Result<Vec<Value>, BusError> {
    let member = info.member.as_str();
    match (info.interface.as_str(), member) {
        (standard::PROPERTIES, "Get") => {
            let (interface, name): (String, String) = decode_args(member, args)?;
            let value = registry.resolve(&info.path, &interface)?.properties().get(&name)?;
            Ok(vec![value.into_variant()])
        }
        (standard::PROPERTIES, "GetAll") => {
            let (interface,): (String,) = decode_args(member, args)?;
            let all: BTreeMap<String, Value> = registry
                .resolve(&info.path, &interface)?
                .properties()
                .get_all()
                .into_iter()
                .collect();
            Ok(vec![all.to_value()])
        }
        (standard::PROPERTIES, "Set") => {
            let (interface, name, value): (String, String, Value) = decode_args(member, args)?;
            let iface = registry.resolve_mut(&info.path, &interface)?;
            if let Some(change) = iface.properties.set(&name, value, SetOrigin::External)? {
                pending.push(properties_changed(&info.path, &interface, vec![change]));
            }
            Ok(Vec::new())
        }
        (standard::INTROSPECTABLE, "Introspect") => {
            let (): () = decode_args(member, args)?;
            Ok(vec![Value::String(introspect(registry, &info.path)?)])
        }
        (standard::PEER, "Ping") => {
            let (): () = decode_args(member, args)?;
            Ok(Vec::new())
        }
        (standard::PEER, "GetMachineId") => {
            let (): () = decode_args(member, args)?;
            Ok(vec![Value::String(machine_id.to_string())])
        }
        (interface, member) => Err(BusError::UnknownMethod {
            interface: interface.to_string(),
            member: member.to_string(),
        }),
    }
}

/// Contents of `/etc/machine-id`, or all zeros when unavailable.
#[must_use]
pub fn machine_id() -> String {
    std::fs::read_to_string("/etc/machine-id")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or_else(|| "0".repeat(32))
}

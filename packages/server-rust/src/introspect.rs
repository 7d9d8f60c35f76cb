//! Introspection XML.

use std::fmt::{self, Write};

use crate::error::BusError;
use crate::interface::Interface;
use crate::registry::ObjectRegistry;

const DOCTYPE: &str = "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n";

const STANDARD_XML: &str = r#"  <interface name="org.freedesktop.DBus.Peer">
    <method name="Ping"/>
    <method name="GetMachineId">
      <arg type="s" name="machine_uuid" direction="out"/>
    </method>
  </interface>
  <interface name="org.freedesktop.DBus.Introspectable">
    <method name="Introspect">
      <arg type="s" name="data" direction="out"/>
    </method>
  </interface>
  <interface name="org.freedesktop.DBus.Properties">
    <method name="Get">
      <arg type="s" name="interface" direction="in"/>
      <arg type="s" name="property" direction="in"/>
      <arg type="v" name="value" direction="out"/>
    </method>
    <method name="GetAll">
      <arg type="s" name="interface" direction="in"/>
      <arg type="a{sv}" name="properties" direction="out"/>
    </method>
    <method name="Set">
      <arg type="s" name="interface" direction="in"/>
      <arg type="s" name="property" direction="in"/>
      <arg type="v" name="value" direction="in"/>
    </method>
    <signal name="PropertiesChanged">
      <arg type="s" name="interface"/>
      <arg type="a{sv}" name="changed_properties"/>
      <arg type="as" name="invalidated_properties"/>
    </signal>
  </interface>
"#;

/// Introspection document for `path`.
///
/// Published objects list the standard interfaces and their own; paths
/// that only have published descendants list just their children.
///
/// # Errors
///
/// `UnknownObject` if `path` is neither published nor an ancestor of a
/// published object.
pub fn introspect(registry: &ObjectRegistry, path: &str) -> Result<String, BusError> {
    if !registry.is_known_path(path) {
        return Err(BusError::UnknownObject {
            path: path.to_string(),
        });
    }
    let mut out = String::from(DOCTYPE);
    write_node(&mut out, registry, path).map_err(|e| BusError::Internal(e.into()))?;
    Ok(out)
}

fn write_node(out: &mut String, registry: &ObjectRegistry, path: &str) -> fmt::Result {
    writeln!(out, "<node>")?;
    if let Ok(object) = registry.object(path) {
        out.push_str(STANDARD_XML);
        for iface in object.interfaces() {
            write_interface(out, iface)?;
        }
    }
    for child in registry.children(path) {
        writeln!(out, "  <node name=\"{child}\"/>")?;
    }
    writeln!(out, "</node>")
}

fn write_interface(out: &mut String, iface: &Interface) -> fmt::Result {
    writeln!(out, "  <interface name=\"{}\">", iface.name())?;
    for method in iface.methods().iter() {
        if method.inputs().is_empty() && method.outputs().is_empty() {
            writeln!(out, "    <method name=\"{}\"/>", method.name())?;
            continue;
        }
        writeln!(out, "    <method name=\"{}\">", method.name())?;
        for ty in method.inputs() {
            writeln!(out, "      <arg type=\"{ty}\" direction=\"in\"/>")?;
        }
        for ty in method.outputs() {
            writeln!(out, "      <arg type=\"{ty}\" direction=\"out\"/>")?;
        }
        writeln!(out, "    </method>")?;
    }
    for signal in iface.signals() {
        if signal.args.is_empty() {
            writeln!(out, "    <signal name=\"{}\"/>", signal.name)?;
            continue;
        }
        writeln!(out, "    <signal name=\"{}\">", signal.name)?;
        for ty in &signal.args {
            writeln!(out, "      <arg type=\"{ty}\"/>")?;
        }
        writeln!(out, "    </signal>")?;
    }
    for prop in iface.properties().iter() {
        writeln!(
            out,
            "    <property name=\"{}\" type=\"{}\" access=\"{}\">",
            prop.name(),
            prop.value_type(),
            prop.access().as_str()
        )?;
        writeln!(
            out,
            "      <annotation name=\"{}\" value=\"{}\"/>",
            EMITS_CHANGED_SIGNAL,
            prop.notify().annotation()
        )?;
        writeln!(out, "    </property>")?;
    }
    writeln!(out, "  </interface>")
}

const EMITS_CHANGED_SIGNAL: &str = "org.freedesktop.DBus.Property.EmitsChangedSignal";

//! Validation of object paths, interface names, member names and bus names.

use std::sync::LazyLock;

use regex::Regex;

/// Names longer than this are rejected by the bus.
pub const MAX_NAME_LEN: usize = 255;

static OBJECT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/|(/[A-Za-z0-9_]+)+)$").expect("static regex"));
static INTERFACE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$").expect("static regex")
});
static WELL_KNOWN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_-][A-Za-z0-9_-]*(\.[A-Za-z_-][A-Za-z0-9_-]*)+$").expect("static regex")
});
static UNIQUE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").expect("static regex")
});
static MEMBER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Which kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    ObjectPath,
    Interface,
    Member,
    BusName,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NameKind::ObjectPath => "object path",
            NameKind::Interface => "interface name",
            NameKind::Member => "member name",
            NameKind::BusName => "bus name",
        };
        f.write_str(s)
    }
}

/// A name rejected by one of the validators in this module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{name}'")]
pub struct NameError {
    pub kind: NameKind,
    pub name: String,
}

fn check(kind: NameKind, re: &Regex, name: &str) -> Result<(), NameError> {
    if name.len() <= MAX_NAME_LEN && re.is_match(name) {
        Ok(())
    } else {
        Err(NameError {
            kind,
            name: name.to_string(),
        })
    }
}

/// `/` or `/seg/seg`, segments of `[A-Za-z0-9_]`.
///
/// # Errors
///
/// Returns `NameError` when the path is malformed.
pub fn validate_object_path(path: &str) -> Result<(), NameError> {
    // Object paths have no length limit on the bus.
    if OBJECT_PATH.is_match(path) {
        Ok(())
    } else {
        Err(NameError {
            kind: NameKind::ObjectPath,
            name: path.to_string(),
        })
    }
}

/// Two or more dot-separated elements, none starting with a digit.
///
/// # Errors
///
/// Returns `NameError` when the name is malformed.
pub fn validate_interface_name(name: &str) -> Result<(), NameError> {
    check(NameKind::Interface, &INTERFACE_NAME, name)
}

/// Method, signal and property names.
///
/// # Errors
///
/// Returns `NameError` when the name is malformed.
pub fn validate_member_name(name: &str) -> Result<(), NameError> {
    check(NameKind::Member, &MEMBER_NAME, name)
}

/// Either a unique (`:1.42`) or a well-known (`com.example.Service`) name.
///
/// # Errors
///
/// Returns `NameError` when the name is malformed.
pub fn validate_bus_name(name: &str) -> Result<(), NameError> {
    if name.starts_with(':') {
        check(NameKind::BusName, &UNIQUE_NAME, name)
    } else {
        check(NameKind::BusName, &WELL_KNOWN_NAME, name)
    }
}

/// Splits an object path into its parent and last segment.
/// Returns `None` for the root path.
#[must_use]
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// Returns the direct child segment of `path` under `parent`, if `path`
/// is a strict descendant of `parent`.
#[must_use]
pub fn child_segment<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
    let rest = if parent == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(parent)?.strip_prefix('/')?
    };
    if rest.is_empty() {
        return None;
    }
    Some(rest.split('/').next().unwrap_or(rest))
}

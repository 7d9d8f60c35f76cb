//! Object registry: object paths to interfaces.
//!
//! Objects are declared interface by interface, then published once with
//! [`ObjectRegistry::initialize`]. Unpublished objects resolve as unknown.

use std::collections::{BTreeMap, BTreeSet};

use busline_core::message::standard;
use busline_core::names::{child_segment, validate_object_path};

use crate::error::BusError;
use crate::interface::{Interface, InterfaceBuilder};

/// An object path and the interfaces it carries.
#[derive(Debug)]
pub struct Object {
    path: String,
    interfaces: BTreeMap<String, Interface>,
    initialized: bool,
}

impl Object {
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    #[must_use]
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }
}

/// All objects exported by one server.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<String, Object>,
}

impl ObjectRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an interface and attaches it to `path`.
    ///
    /// The builder runs before anything becomes visible; if it fails, the
    /// registry is left as it was.
    ///
    /// # Errors
    ///
    /// - `InvalidName` for a malformed path or interface name
    /// - `AlreadyInitialized` if the object is already published
    /// - `DuplicateName` if the object already has this interface, or the
    ///   name is one of the standard interfaces
    /// - whatever the builder returns
    pub fn add_interface<F>(&mut self, path: &str, name: &str, build: F) -> Result<(), BusError>
    where
        F: FnOnce(&mut InterfaceBuilder) -> Result<(), BusError>,
    {
        validate_object_path(path)?;
        let mut builder = InterfaceBuilder::new(name)?;
        if is_standard_interface(name) {
            return Err(BusError::DuplicateName {
                name: name.to_string(),
            });
        }
        if let Some(object) = self.objects.get(path) {
            if object.initialized {
                return Err(BusError::AlreadyInitialized {
                    path: path.to_string(),
                });
            }
            if object.interfaces.contains_key(name) {
                return Err(BusError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        build(&mut builder)?;

        let object = self
            .objects
            .entry(path.to_string())
            .or_insert_with(|| Object {
                path: path.to_string(),
                interfaces: BTreeMap::new(),
                initialized: false,
            });
        object.interfaces.insert(name.to_string(), builder.finish());
        Ok(())
    }

    /// Publishes an object.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if nothing was added at `path`, `AlreadyInitialized`
    /// on a second call.
    pub fn initialize(&mut self, path: &str) -> Result<(), BusError> {
        let object = self
            .objects
            .get_mut(path)
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
            })?;
        if object.initialized {
            return Err(BusError::AlreadyInitialized {
                path: path.to_string(),
            });
        }
        object.initialized = true;
        Ok(())
    }

    /// Unpublishes one interface. The object goes away with its last
    /// interface.
    ///
    /// # Errors
    ///
    /// `UnknownObject` or `UnknownInterface`.
    pub fn remove_interface(&mut self, path: &str, name: &str) -> Result<Interface, BusError> {
        let object = self
            .objects
            .get_mut(path)
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
            })?;
        let iface = object
            .interfaces
            .remove(name)
            .ok_or_else(|| BusError::UnknownInterface {
                path: path.to_string(),
                interface: name.to_string(),
            })?;
        if object.interfaces.is_empty() {
            self.objects.remove(path);
        }
        Ok(iface)
    }

    /// Published object at `path`.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if absent or not yet initialized.
    pub fn object(&self, path: &str) -> Result<&Object, BusError> {
        self.objects
            .get(path)
            .filter(|o| o.initialized)
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
            })
    }

    /// # Errors
    ///
    /// `UnknownObject` or `UnknownInterface`.
    pub fn resolve(&self, path: &str, interface: &str) -> Result<&Interface, BusError> {
        self.object(path)?
            .interfaces
            .get(interface)
            .ok_or_else(|| BusError::UnknownInterface {
                path: path.to_string(),
                interface: interface.to_string(),
            })
    }

    /// # Errors
    ///
    /// `UnknownObject` or `UnknownInterface`.
    pub fn resolve_mut(&mut self, path: &str, interface: &str) -> Result<&mut Interface, BusError> {
        let object = self
            .objects
            .get_mut(path)
            .filter(|o| o.initialized)
            .ok_or_else(|| BusError::UnknownObject {
                path: path.to_string(),
            })?;
        object
            .interfaces
            .get_mut(interface)
            .ok_or_else(|| BusError::UnknownInterface {
                path: path.to_string(),
                interface: interface.to_string(),
            })
    }

    /// Direct child segments of `path` that lead to published objects.
    #[must_use]
    pub fn children(&self, path: &str) -> BTreeSet<String> {
        self.objects
            .values()
            .filter(|o| o.initialized)
            .filter_map(|o| child_segment(path, &o.path))
            .map(str::to_string)
            .collect()
    }

    /// Whether `path` is a published object or has published descendants.
    #[must_use]
    pub fn is_known_path(&self, path: &str) -> bool {
        self.object(path).is_ok() || !self.children(path).is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values().filter(|o| o.initialized)
    }
}

/// Interfaces every published object answers on its own.
#[must_use]
pub fn is_standard_interface(name: &str) -> bool {
    matches!(
        name,
        standard::PROPERTIES | standard::INTROSPECTABLE | standard::PEER
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(registry: &mut ObjectRegistry) {
        registry
            .add_interface("/calculator", "xyz.openbmc_project.Calculator", |b| {
                b.property("LastResult", 0_i64).read_write().register()?;
                b.method("Multiply", |_ctx, (x, y): (i64, i64)| Ok(x * y))?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn unpublished_objects_are_unknown() {
        let mut registry = ObjectRegistry::new();
        calculator(&mut registry);
        assert!(matches!(
            registry.resolve("/calculator", "xyz.openbmc_project.Calculator"),
            Err(BusError::UnknownObject { .. })
        ));
        registry.initialize("/calculator").unwrap();
        assert!(registry
            .resolve("/calculator", "xyz.openbmc_project.Calculator")
            .is_ok());
    }

    #[test]
    fn initialize_twice_fails() {
        let mut registry = ObjectRegistry::new();
        calculator(&mut registry);
        registry.initialize("/calculator").unwrap();
        assert!(matches!(
            registry.initialize("/calculator"),
            Err(BusError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn no_interfaces_after_publish() {
        let mut registry = ObjectRegistry::new();
        calculator(&mut registry);
        registry.initialize("/calculator").unwrap();
        let err = registry
            .add_interface("/calculator", "xyz.openbmc_project.Extra", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, BusError::AlreadyInitialized { .. }));
    }

    #[test]
    fn duplicate_interface_fails() {
        let mut registry = ObjectRegistry::new();
        calculator(&mut registry);
        assert!(matches!(
            registry.add_interface("/calculator", "xyz.openbmc_project.Calculator", |_| Ok(())),
            Err(BusError::DuplicateName { .. })
        ));
        assert!(matches!(
            registry.add_interface("/calculator", standard::PROPERTIES, |_| Ok(())),
            Err(BusError::DuplicateName { .. })
        ));
    }

    #[test]
    fn failed_builder_leaves_no_trace() {
        let mut registry = ObjectRegistry::new();
        let err = registry
            .add_interface("/broken", "xyz.test.Broken", |b| {
                b.property("x", 1_i32).register()?;
                b.property("x", 2_i32).register()?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicateName { .. }));
        assert!(matches!(
            registry.initialize("/broken"),
            Err(BusError::UnknownObject { .. })
        ));
    }

    #[test]
    fn invalid_names() {
        let mut registry = ObjectRegistry::new();
        assert!(matches!(
            registry.add_interface("calculator", "a.b", |_| Ok(())),
            Err(BusError::InvalidName(_))
        ));
        assert!(matches!(
            registry.add_interface("/calculator", "nodots", |_| Ok(())),
            Err(BusError::InvalidName(_))
        ));
    }

    #[test]
    fn unknown_interface_on_known_object() {
        let mut registry = ObjectRegistry::new();
        calculator(&mut registry);
        registry.initialize("/calculator").unwrap();
        assert!(matches!(
            registry.resolve("/calculator", "xyz.other"),
            Err(BusError::UnknownInterface { .. })
        ));
    }

    #[test]
    fn children_and_intermediate_paths() {
        let mut registry = ObjectRegistry::new();
        registry
            .add_interface("/xyz/openbmc_project/test", "xyz.openbmc_project.test", |_| {
                Ok(())
            })
            .unwrap();
        registry.initialize("/xyz/openbmc_project/test").unwrap();
        calculator(&mut registry);
        registry.initialize("/calculator").unwrap();

        let root: Vec<String> = registry.children("/").into_iter().collect();
        assert_eq!(root, vec!["calculator", "xyz"]);
        assert!(registry.is_known_path("/xyz/openbmc_project"));
        assert!(!registry.is_known_path("/nowhere"));
    }

    #[test]
    fn removing_last_interface_removes_object() {
        let mut registry = ObjectRegistry::new();
        calculator(&mut registry);
        registry.initialize("/calculator").unwrap();
        registry
            .remove_interface("/calculator", "xyz.openbmc_project.Calculator")
            .unwrap();
        assert!(matches!(
            registry.object("/calculator"),
            Err(BusError::UnknownObject { .. })
        ));
    }
}

//! Component factories
//!
//! A context resolves `(kind, family)` to a [`ComponentFactory`] and hands it
//! the typed [`ComponentArgs`] for construction. The `null` family of every
//! kind is registered by default; applications add their own families with
//! [`FactoryRegistry::register`].

use super::{null, ComponentHandle, ComponentOps};
use crate::error::{ContextError, Result};
use crate::event::Dispatcher;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;
use vswitch_config::{ComponentArgs, ComponentKind, ContextSettings};

/// Builds the family-specific state of one kind of component
pub trait ComponentFactory {
    fn kind(&self) -> ComponentKind;

    fn family(&self) -> &str;

    fn create(&self, env: &FactoryEnv<'_>, args: &ComponentArgs) -> Result<Box<dyn ComponentOps>>;
}

/// What a factory may see of the context while constructing
pub struct FactoryEnv<'a> {
    name: &'a str,
    dispatcher: &'a Rc<Dispatcher>,
    settings: &'a ContextSettings,
    components: &'a HashMap<String, ComponentHandle>,
}

impl<'a> FactoryEnv<'a> {
    pub(crate) fn new(
        name: &'a str,
        dispatcher: &'a Rc<Dispatcher>,
        settings: &'a ContextSettings,
        components: &'a HashMap<String, ComponentHandle>,
    ) -> Self {
        Self {
            name,
            dispatcher,
            settings,
            components,
        }
    }

    /// Name the new component will be registered under
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn dispatcher(&self) -> &Rc<Dispatcher> {
        self.dispatcher
    }

    pub fn settings(&self) -> &ContextSettings {
        self.settings
    }

    /// Look up a component the new one will refer to
    pub fn resolve(&self, name: &str, kind: ComponentKind) -> Result<ComponentHandle> {
        let component = self
            .components
            .get(name)
            .ok_or_else(|| ContextError::not_found(name))?;
        if component.kind() != kind {
            return Err(ContextError::invalid_arguments(
                self.name,
                format!("'{}' is a {}, expected a {}", name, component.kind(), kind),
            ));
        }
        Ok(Rc::clone(component))
    }

    /// Error for arguments of the wrong shape
    pub fn unexpected_args(&self, args: &ComponentArgs) -> ContextError {
        ContextError::invalid_arguments(
            self.name,
            format!("unexpected '{}' arguments", args.variant()),
        )
    }
}

/// Factories keyed by `(kind, family)`
pub struct FactoryRegistry {
    factories: HashMap<(ComponentKind, String), Box<dyn ComponentFactory>>,
}

impl FactoryRegistry {
    /// Registry without any family
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the builtin `null` families
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        null::register(&mut registry);
        registry
    }

    /// Add `factory`, returning the one it replaces
    pub fn register(
        &mut self,
        factory: Box<dyn ComponentFactory>,
    ) -> Option<Box<dyn ComponentFactory>> {
        let key = (factory.kind(), factory.family().to_string());
        debug!(kind = %key.0, family = %key.1, "factory registered");
        self.factories.insert(key, factory)
    }

    pub fn get(&self, kind: ComponentKind, family: &str) -> Result<&dyn ComponentFactory> {
        self.factories
            .get(&(kind, family.to_string()))
            .map(|factory| factory.as_ref())
            .ok_or_else(|| ContextError::family_not_found(kind, family))
    }

    /// Registered families of `kind`, sorted
    pub fn families(&self, kind: ComponentKind) -> Vec<&str> {
        let mut families: Vec<&str> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, family)| family.as_str())
            .collect();
        families.sort_unstable();
        families
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

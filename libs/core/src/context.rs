//! Context
//!
//! ## Purpose
//!
//! The registry and runtime root of one switch instance. A context owns every
//! component, binds the application's [`EventHandler`], and saves or restores
//! the component graph through a snapshot codec.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► Uninitialized ──init──► Active ──fini──► Finalized ──delete──► (gone)
//! ```
//!
//! - `init` binds the event handler once. A second `init` fails with
//!   [`ContextError::AlreadyInitialized`]; a context is single-shot, so `init`
//!   after `fini` fails with [`ContextError::InvalidState`].
//! - `fini` stops every component, aborts pending connects and cancels all
//!   event registrations. Components stay registered so they can still be
//!   inspected, saved or removed. Repeated calls do nothing.
//! - `delete` (and `Drop`) runs `fini` if needed, then releases every
//!   component, dependents first.
//!
//! ## Resource exhaustion
//!
//! Allocation failure aborts a Rust process, so [`Context::new`] cannot fail.
//! The failure a caller can observe is the component limit from
//! [`ContextSettings`], reported as [`ContextError::ResourceExhausted`].

use crate::component::{
    Component, ComponentFactory, ComponentHandle, FactoryEnv, FactoryRegistry,
};
use crate::error::{ContextError, Result};
use crate::event::{Dispatcher, EventHandler};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use vswitch_config::{
    load_snapshot, save_snapshot, ComponentArgs, ComponentKind, ConfigSnapshot, ContextSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Active,
    Finalized,
}

impl ContextState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextState::Uninitialized => "uninitialized",
            ContextState::Active => "active",
            ContextState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Context {
    state: ContextState,
    settings: ContextSettings,
    dispatcher: Option<Rc<Dispatcher>>,
    factories: FactoryRegistry,
    components: HashMap<String, ComponentHandle>,
    auto_names: HashMap<ComponentKind, u64>,
}

impl Context {
    /// Uninitialized context with default settings
    pub fn new() -> Self {
        Self::with_settings(ContextSettings::default())
    }

    pub fn with_settings(settings: ContextSettings) -> Self {
        Self {
            state: ContextState::Uninitialized,
            settings,
            dispatcher: None,
            factories: FactoryRegistry::with_builtins(),
            components: HashMap::new(),
            auto_names: HashMap::new(),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// The bound event handler, once initialized
    pub fn dispatcher(&self) -> Option<&Rc<Dispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Bind `handler`; it must provide all four event operations
    pub fn init(&mut self, handler: Rc<dyn EventHandler>) -> Result<()> {
        match self.state {
            ContextState::Uninitialized => {}
            ContextState::Active => return Err(ContextError::AlreadyInitialized),
            ContextState::Finalized => {
                return Err(ContextError::invalid_state("init", self.state.as_str()))
            }
        }
        let dispatcher = Dispatcher::new(handler)?;
        self.dispatcher = Some(Rc::new(dispatcher));
        self.state = ContextState::Active;
        info!(max_components = self.settings.context.max_components, "context initialized");
        Ok(())
    }

    /// Quiesce: stop components and cancel every event registration
    pub fn fini(&mut self) {
        match self.state {
            ContextState::Finalized => return,
            ContextState::Uninitialized => {
                self.state = ContextState::Finalized;
                return;
            }
            ContextState::Active => {}
        }
        for component in self.teardown_order() {
            component.stop();
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.quiesce();
        }
        self.state = ContextState::Finalized;
        info!(components = self.components.len(), "context finalized");
    }

    /// Finalize if needed and release every component
    pub fn delete(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.fini();
        if self.components.is_empty() && self.dispatcher.is_none() {
            return;
        }
        let released = self.components.len();
        for component in self.teardown_order() {
            component.release_references();
        }
        self.components.clear();
        self.dispatcher = None;
        debug!(released, "context released");
    }

    /// Add a factory for a new family, returning the one it replaces
    pub fn register_factory(
        &mut self,
        factory: Box<dyn ComponentFactory>,
    ) -> Option<Box<dyn ComponentFactory>> {
        self.factories.register(factory)
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    /// Create a component of `kind` from `family` and register it under
    /// `name`, or under a generated `<kind>N` name when `name` is `None`.
    pub fn new_component(
        &mut self,
        kind: ComponentKind,
        family: &str,
        name: Option<&str>,
        args: ComponentArgs,
    ) -> Result<ComponentHandle> {
        self.ensure_active("new_component")?;

        let limit = self.settings.context.max_components;
        if self.components.len() >= limit {
            return Err(ContextError::resource_exhausted(
                "components",
                format!("context limit of {} reached", limit),
            ));
        }

        let name = match name {
            Some(name) => {
                validate_name(name)?;
                if self.components.contains_key(name) {
                    return Err(ContextError::name_collision(name));
                }
                name.to_string()
            }
            None => self.auto_name(kind),
        };

        let factory = self.factories.get(kind, family)?;
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or_else(|| ContextError::invalid_state("new_component", self.state.as_str()))?;
        let env = FactoryEnv::new(&name, dispatcher, &self.settings, &self.components);
        let ops = factory.create(&env, &args)?;

        let component = Rc::new(Component::new(kind, family, &name, ops));
        self.components.insert(name, Rc::clone(&component));
        info!(%kind, family, name = component.name(), "component created");
        Ok(component)
    }

    /// Look a component up by name. The registry keeps ownership; the
    /// component's reference count is unaffected.
    pub fn get_component(&self, name: &str) -> Option<&ComponentHandle> {
        self.components.get(name)
    }

    /// All components, sorted by name
    pub fn components(&self) -> Vec<&ComponentHandle> {
        let mut components: Vec<&ComponentHandle> = self.components.values().collect();
        components.sort_by(|a, b| a.name().cmp(b.name()));
        components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Remove `component`. Fails with [`ContextError::InUse`] while another
    /// component holds a reference to it; the registry is left unchanged.
    pub fn component_del(&mut self, component: &ComponentHandle) -> Result<()> {
        if self.state == ContextState::Uninitialized {
            return Err(ContextError::invalid_state("component_del", self.state.as_str()));
        }
        let name = component.name();
        match self.components.get(name) {
            Some(registered) if Rc::ptr_eq(registered, component) => {}
            _ => return Err(ContextError::not_found(name)),
        }
        if component.is_in_use() {
            return Err(ContextError::in_use(name, component.refcount()));
        }

        component.stop();
        component.release_references();
        self.components.remove(name);
        info!(kind = %component.kind(), name, "component removed");
        Ok(())
    }

    /// Every live component with its construction arguments, sorted by name
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(
            self.components
                .values()
                .map(|component| component.record())
                .collect(),
        )
    }

    /// Create every component of `snapshot`, whatever order its records are
    /// in. Either all of them are created or none is.
    pub fn load_snapshot(&mut self, snapshot: &ConfigSnapshot) -> Result<Vec<ComponentHandle>> {
        self.ensure_active("config_load")?;
        if let Some(taken) = snapshot
            .components
            .iter()
            .find(|record| self.components.contains_key(&record.name))
        {
            return Err(ContextError::name_collision(&taken.name));
        }

        let ordered = snapshot.dependency_order()?;
        let mut created = Vec::with_capacity(ordered.len());
        for record in ordered {
            let result = self.new_component(
                record.kind,
                &record.family,
                Some(&record.name),
                record.args.clone(),
            );
            match result {
                Ok(component) => created.push(component),
                Err(err) => {
                    warn!(name = %record.name, error = %err, "snapshot load failed, rolling back");
                    self.rollback(created);
                    return Err(err);
                }
            }
        }
        info!(components = created.len(), "snapshot loaded");
        Ok(created)
    }

    /// Write the component graph to `path`; `.json` selects JSON, anything
    /// else TOML
    pub fn config_save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_snapshot(path.as_ref(), &self.snapshot())?;
        Ok(())
    }

    /// Recreate the component graph stored at `path`
    pub fn config_load(&mut self, path: impl AsRef<Path>) -> Result<Vec<ComponentHandle>> {
        self.ensure_active("config_load")?;
        let snapshot = load_snapshot(path.as_ref())?;
        self.load_snapshot(&snapshot)
    }

    fn rollback(&mut self, created: Vec<ComponentHandle>) {
        for component in created.into_iter().rev() {
            if let Err(err) = self.component_del(&component) {
                warn!(name = component.name(), error = %err, "rollback could not remove component");
            }
        }
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if self.state != ContextState::Active {
            return Err(ContextError::invalid_state(operation, self.state.as_str()));
        }
        Ok(())
    }

    fn auto_name(&mut self, kind: ComponentKind) -> String {
        let counter = self.auto_names.entry(kind).or_insert(0);
        loop {
            let candidate = format!("{}{}", kind.as_str(), *counter);
            *counter += 1;
            if !self.components.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Dependents before the components they reference
    fn teardown_order(&self) -> Vec<ComponentHandle> {
        let snapshot = self.snapshot();
        let mut ordered: Vec<ComponentHandle> = match snapshot.dependency_order() {
            Ok(records) => records
                .iter()
                .filter_map(|record| self.components.get(&record.name).cloned())
                .collect(),
            Err(_) => self.components().into_iter().cloned().collect(),
        };
        ordered.reverse();
        ordered
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("state", &self.state)
            .field("components", &self.components.len())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ContextError::invalid_arguments(
            name,
            "component names must be non-empty without whitespace",
        ));
    }
    Ok(())
}

//! Components
//!
//! ## Purpose
//!
//! A component is one node of the switching graph: an engine, a transport or
//! a connection manager. Every component has a kind, the family of the
//! implementation behind it, and a name unique within its context.
//!
//! ## Ownership
//!
//! The context owns every component through a [`ComponentHandle`]. A
//! component that needs another one (a transport feeding an engine) holds a
//! [`ComponentRef`]: a weak back-reference that bumps the target's reference
//! count while held. The context refuses to remove a component whose count is
//! non-zero.
//!
//! ## Roles
//!
//! Family implementations provide [`ComponentOps`] and expose at most one of
//! the role traits [`Engine`], [`Transport`] or [`ConnectionManager`].
//! [`Component`] forwards role calls and reports a role mismatch as
//! [`ContextError::InvalidArguments`].

pub mod factory;
pub mod null;

pub use factory::{ComponentFactory, FactoryEnv, FactoryRegistry};

use crate::connect::{ConnectError, ConnectRequest};
use crate::error::{ContextError, Result};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;
use vswitch_config::{ComponentArgs, ComponentKind, ComponentRecord};
use vswitch_packet::{Packet, PacketProperties};

/// Shared handle to a live component
pub type ComponentHandle = Rc<Component>;

/// Frame counters kept by an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames: u64,
    pub bytes: u64,
}

/// Processes and forwards frames
pub trait Engine {
    /// Handle one frame arriving from the component named `from`. The packet
    /// is borrowed; keeping it means copying it.
    fn process(&mut self, from: &str, packet: &mut Packet) -> Result<()>;

    /// Margins this engine needs on every packet it receives
    fn packet_properties(&self) -> PacketProperties {
        PacketProperties::default()
    }

    fn stats(&self) -> EngineStats {
        EngineStats::default()
    }
}

/// Moves frames across a medium
pub trait Transport {
    /// Hand a frame read off the medium to the attached engine
    fn inject(&mut self, frame: &[u8]) -> Result<()>;

    fn engine(&self) -> Option<ComponentHandle>;
}

/// Establishes connections asynchronously
pub trait ConnectionManager {
    /// Start `request`. Completion is reported later through the request,
    /// never from inside this call.
    fn connect(&mut self, request: ConnectRequest) -> Result<()>;

    /// Requests started but not yet completed
    fn pending(&self) -> usize;

    /// Cancel and hand back every request still in flight
    fn drain(&mut self) -> Vec<ConnectRequest>;
}

/// Family-specific state behind a [`Component`]
pub trait ComponentOps {
    /// Arguments that reconstruct this component
    fn args(&self) -> ComponentArgs;

    /// Stop producing events; called when the component is removed or the
    /// context is finalized
    fn stop(&mut self) {}

    /// Drop every back-reference to other components
    fn release_references(&mut self) {}

    fn as_engine_mut(&mut self) -> Option<&mut dyn Engine> {
        None
    }

    fn as_transport_mut(&mut self) -> Option<&mut dyn Transport> {
        None
    }

    fn as_connection_manager_mut(&mut self) -> Option<&mut dyn ConnectionManager> {
        None
    }
}

pub struct Component {
    kind: ComponentKind,
    family: String,
    name: String,
    refcount: Cell<usize>,
    stopped: Cell<bool>,
    ops: RefCell<Box<dyn ComponentOps>>,
}

impl Component {
    pub(crate) fn new(
        kind: ComponentKind,
        family: &str,
        name: &str,
        ops: Box<dyn ComponentOps>,
    ) -> Self {
        Self {
            kind,
            family: family.to_string(),
            name: name.to_string(),
            refcount: Cell::new(0),
            stopped: Cell::new(false),
            ops: RefCell::new(ops),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one more holder
    pub fn acquire(&self) {
        self.refcount.set(self.refcount.get() + 1);
    }

    /// Drop one holder
    pub fn release(&self) {
        let count = self.refcount.get();
        debug_assert!(count > 0, "release of unreferenced component {}", self.name);
        self.refcount.set(count.saturating_sub(1));
    }

    pub fn refcount(&self) -> usize {
        self.refcount.get()
    }

    pub fn is_in_use(&self) -> bool {
        self.refcount.get() > 0
    }

    /// True once the component was removed or its context finalized
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    pub fn args(&self) -> ComponentArgs {
        self.ops.borrow().args()
    }

    pub fn record(&self) -> ComponentRecord {
        ComponentRecord {
            kind: self.kind,
            family: self.family.clone(),
            name: self.name.clone(),
            args: self.args(),
        }
    }

    /// Quiesce and abort connect requests still in flight. Abort callbacks
    /// run after the component's state is released. A stopped component
    /// accepts no new connect requests.
    pub(crate) fn stop(&self) {
        self.stopped.set(true);
        let aborted = {
            let mut ops = self.ops.borrow_mut();
            ops.stop();
            ops.as_connection_manager_mut()
                .map(|manager| manager.drain())
                .unwrap_or_default()
        };
        if !aborted.is_empty() {
            debug!(component = %self.name, count = aborted.len(), "aborting connect requests");
        }
        for request in aborted {
            request.fail(ConnectError::Aborted);
        }
    }

    pub(crate) fn release_references(&self) {
        self.ops.borrow_mut().release_references();
    }

    /// Engine role: process one frame
    pub fn process(&self, from: &str, packet: &mut Packet) -> Result<()> {
        let mut ops = self.ops.borrow_mut();
        let engine = ops.as_engine_mut().ok_or_else(|| self.wrong_role("an engine"))?;
        engine.process(from, packet)
    }

    /// Engine role: margins required on received packets
    pub fn packet_properties(&self) -> Result<PacketProperties> {
        let mut ops = self.ops.borrow_mut();
        let engine = ops.as_engine_mut().ok_or_else(|| self.wrong_role("an engine"))?;
        Ok(engine.packet_properties())
    }

    pub fn engine_stats(&self) -> Result<EngineStats> {
        let mut ops = self.ops.borrow_mut();
        let engine = ops.as_engine_mut().ok_or_else(|| self.wrong_role("an engine"))?;
        Ok(engine.stats())
    }

    /// Transport role: deliver a frame read off the medium
    pub fn inject(&self, frame: &[u8]) -> Result<()> {
        let mut ops = self.ops.borrow_mut();
        let transport = ops
            .as_transport_mut()
            .ok_or_else(|| self.wrong_role("a transport"))?;
        transport.inject(frame)
    }

    /// Transport role: engine fed by this transport, if any
    pub fn attached_engine(&self) -> Result<Option<ComponentHandle>> {
        let mut ops = self.ops.borrow_mut();
        let transport = ops
            .as_transport_mut()
            .ok_or_else(|| self.wrong_role("a transport"))?;
        Ok(transport.engine())
    }

    /// Connection manager role: start an asynchronous connect.
    ///
    /// Exactly one of `on_success` / `on_error` runs, later, from an event
    /// callback. If the event handler refuses the registration this returns
    /// [`ContextError::Registration`] and neither callback ever runs. A
    /// stopped manager refuses with [`ContextError::InvalidState`], also
    /// without running either callback.
    pub fn connect<S, E>(self: &Rc<Self>, on_success: S, on_error: E) -> Result<ConnectRequest>
    where
        S: FnOnce(&ComponentHandle) + 'static,
        E: FnOnce(&ComponentHandle, &ConnectError) + 'static,
    {
        if self.kind != ComponentKind::ConnectionManager {
            return Err(self.wrong_role("a connection manager"));
        }
        if self.stopped.get() {
            return Err(ContextError::invalid_state("connect", "removed"));
        }
        let request = ConnectRequest::new(Rc::clone(self), Box::new(on_success), Box::new(on_error));
        let started = {
            let mut ops = self.ops.borrow_mut();
            match ops.as_connection_manager_mut() {
                Some(manager) => manager.connect(request.clone()),
                None => Err(self.wrong_role("a connection manager")),
            }
        };
        if let Err(err) = started {
            request.discard();
            return Err(err);
        }
        debug!(component = %self.name, request = request.id(), "connect requested");
        Ok(request)
    }

    /// Connection manager role: requests in flight
    pub fn pending_connects(&self) -> Result<usize> {
        let mut ops = self.ops.borrow_mut();
        let manager = ops
            .as_connection_manager_mut()
            .ok_or_else(|| self.wrong_role("a connection manager"))?;
        Ok(manager.pending())
    }

    fn wrong_role(&self, role: &str) -> ContextError {
        ContextError::invalid_arguments(
            &self.name,
            format!("{} component is not {}", self.kind, role),
        )
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("kind", &self.kind)
            .field("family", &self.family)
            .field("name", &self.name)
            .field("refcount", &self.refcount.get())
            .field("stopped", &self.stopped.get())
            .finish()
    }
}

/// Counted back-reference to another component.
///
/// Holding one keeps the target's reference count raised; dropping or
/// [`release`](ComponentRef::release)-ing it lowers the count again. The
/// target's name survives release so the holder can still describe itself.
pub struct ComponentRef {
    name: String,
    target: Option<Weak<Component>>,
}

impl ComponentRef {
    pub fn acquire(target: &ComponentHandle) -> Self {
        target.acquire();
        Self {
            name: target.name().to_string(),
            target: Some(Rc::downgrade(target)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Option<ComponentHandle> {
        self.target.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_held(&self) -> bool {
        self.target.is_some()
    }

    pub fn release(&mut self) {
        if let Some(target) = self.target.take().and_then(|weak| weak.upgrade()) {
            target.release();
        }
    }
}

impl Drop for ComponentRef {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("name", &self.name)
            .field("held", &self.is_held())
            .finish()
    }
}

//! # vswitch Core
//!
//! Component framework of the virtual switch: everything a running instance
//! needs besides concrete transports and switching logic.
//!
//! - [`context`]: registry owning every component of one instance
//! - [`component`]: component model, factories and the builtin `null` families
//! - [`connect`]: asynchronous connect protocol of connection managers
//! - [`event`]: event handler contract, context-side dispatcher and a
//!   `poll(2)` reference loop
//! - [`logging`]: process-wide log sink with syslog priorities
//!
//! ## Threading
//!
//! A context and everything in it lives on one thread and is driven by the
//! event handler's callbacks. Handles are `Rc`, state is `RefCell`; nothing
//! here locks or spawns.
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use std::time::Duration;
//! use vswitch_core::{ComponentArgs, ComponentKind, Context, Reactor, TransportArgs};
//!
//! # fn main() -> vswitch_core::Result<()> {
//! let reactor = Rc::new(Reactor::new());
//! let mut ctx = Context::new();
//! ctx.init(reactor.clone())?;
//!
//! ctx.new_component(ComponentKind::Engine, "null", Some("hub"), ComponentArgs::None)?;
//! let tap = ctx.new_component(
//!     ComponentKind::Transport,
//!     "null",
//!     Some("tap0"),
//!     ComponentArgs::Transport(TransportArgs {
//!         engine: Some("hub".to_string()),
//!         ..Default::default()
//!     }),
//! )?;
//! tap.inject(&[0u8; 60])?;
//!
//! reactor.run_until_idle(Duration::from_secs(1))?;
//! ctx.delete();
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod connect;
pub mod context;
pub mod error;
pub mod event;
pub mod logging;

pub use component::{
    Component, ComponentFactory, ComponentHandle, ComponentOps, ComponentRef, ConnectionManager,
    Engine, EngineStats, FactoryEnv, FactoryRegistry, Transport,
};
pub use connect::{ConnectError, ConnectRequest, ConnectState};
pub use context::{Context, ContextState};
pub use error::{ContextError, Result};
pub use event::{
    CallbackHandler, Capabilities, Dispatcher, EventCallback, EventHandler, EventMask, EventToken,
    Reactor, NO_FD,
};
pub use logging::{init_logging, log, set_log_handler, LogHandler, LogPriority, SinkLayer};

pub use vswitch_config::{
    ComponentArgs, ComponentKind, ComponentRecord, ConfigSnapshot, ConnectionManagerArgs,
    ContextSettings, TransportArgs,
};
pub use vswitch_packet::{Packet, PacketPool, PacketProperties};

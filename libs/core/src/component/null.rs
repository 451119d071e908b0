//! Builtin `null` families
//!
//! Minimal implementations of each kind that exercise the whole framework
//! without touching a real medium:
//!
//! - engine: counts the frames and bytes it is handed
//! - transport: feeds frames injected by the application to its engine,
//!   using pooled packets laid out for that engine
//! - connection manager: completes connect requests after a configurable
//!   delay, through the context's event handler

use super::factory::{ComponentFactory, FactoryEnv, FactoryRegistry};
use super::{
    ComponentHandle, ComponentOps, ComponentRef, ConnectionManager, Engine, EngineStats, Transport,
};
use crate::connect::{ConnectError, ConnectRequest};
use crate::error::Result;
use crate::event::{Dispatcher, EventMask, EventToken};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, trace};
use vswitch_config::{ComponentArgs, ComponentKind, ConnectionManagerArgs, TransportArgs};
use vswitch_packet::{
    Packet, PacketError, PacketPool, PacketProperties, PayloadType, MAX_PAYLOAD_SIZE,
};

pub const FAMILY: &str = "null";

pub(crate) fn register(registry: &mut FactoryRegistry) {
    registry.register(Box::new(NullEngineFactory));
    registry.register(Box::new(NullTransportFactory));
    registry.register(Box::new(NullConnectionManagerFactory));
}

// Engine

pub struct NullEngine {
    props: PacketProperties,
    stats: EngineStats,
}

impl NullEngine {
    pub fn new(props: PacketProperties) -> Self {
        Self {
            props,
            stats: EngineStats::default(),
        }
    }
}

impl Engine for NullEngine {
    fn process(&mut self, from: &str, packet: &mut Packet) -> Result<()> {
        self.stats.frames += 1;
        self.stats.bytes += packet.payload_len() as u64;
        trace!(from, len = packet.payload_len(), "frame absorbed");
        Ok(())
    }

    fn packet_properties(&self) -> PacketProperties {
        self.props
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }
}

impl ComponentOps for NullEngine {
    fn args(&self) -> ComponentArgs {
        ComponentArgs::None
    }

    fn as_engine_mut(&mut self) -> Option<&mut dyn Engine> {
        Some(self)
    }
}

struct NullEngineFactory;

impl ComponentFactory for NullEngineFactory {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Engine
    }

    fn family(&self) -> &str {
        FAMILY
    }

    fn create(&self, env: &FactoryEnv<'_>, args: &ComponentArgs) -> Result<Box<dyn ComponentOps>> {
        if *args != ComponentArgs::None {
            return Err(env.unexpected_args(args));
        }
        let packet = &env.settings().packet;
        Ok(Box::new(NullEngine::new(PacketProperties::new(
            packet.head_size,
            packet.tail_size,
        ))))
    }
}

// Transport

pub struct NullTransport {
    name: String,
    engine: Option<ComponentRef>,
    /// Margins requested through the transport's own arguments
    props: PacketProperties,
    payload_max: usize,
    pool: PacketPool,
    dropped: u64,
}

impl NullTransport {
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Transport for NullTransport {
    fn inject(&mut self, frame: &[u8]) -> Result<()> {
        let Some(engine) = self.engine.as_ref().and_then(ComponentRef::get) else {
            self.dropped += 1;
            debug!(transport = %self.name, len = frame.len(), "no engine attached, frame dropped");
            return Ok(());
        };
        if frame.len() > self.payload_max {
            return Err(PacketError::PayloadTooLarge {
                size: frame.len(),
                limit: self.payload_max,
            }
            .into());
        }

        let props = engine.packet_properties()?.merge(self.props);
        if props != self.pool.properties() {
            self.pool.set_properties(props);
        }

        let mut packet = self.pool.acquire();
        if frame.len() > packet.max_payload_len() {
            let limit = packet.max_payload_len();
            self.pool.release(packet);
            return Err(PacketError::PayloadTooLarge {
                size: frame.len(),
                limit,
            }
            .into());
        }
        packet.payload_capacity_mut()[..frame.len()].copy_from_slice(frame);
        packet.set_payload_len(frame.len());
        packet.set_payload_type(PayloadType::Ethernet);
        let result = engine.process(&self.name, &mut packet);
        self.pool.release(packet);
        result
    }

    fn engine(&self) -> Option<ComponentHandle> {
        self.engine.as_ref().and_then(ComponentRef::get)
    }
}

impl ComponentOps for NullTransport {
    fn args(&self) -> ComponentArgs {
        ComponentArgs::Transport(TransportArgs {
            engine: self.engine.as_ref().map(|engine| engine.name().to_string()),
            head_size: self.props.head_size,
            tail_size: self.props.tail_size,
        })
    }

    fn release_references(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.release();
        }
    }

    fn as_transport_mut(&mut self) -> Option<&mut dyn Transport> {
        Some(self)
    }
}

struct NullTransportFactory;

impl ComponentFactory for NullTransportFactory {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Transport
    }

    fn family(&self) -> &str {
        FAMILY
    }

    fn create(&self, env: &FactoryEnv<'_>, args: &ComponentArgs) -> Result<Box<dyn ComponentOps>> {
        let args = match args {
            ComponentArgs::None => TransportArgs::default(),
            ComponentArgs::Transport(args) => args.clone(),
            other => return Err(env.unexpected_args(other)),
        };
        let engine = args
            .engine
            .as_deref()
            .map(|name| env.resolve(name, ComponentKind::Engine))
            .transpose()?
            .map(|engine| ComponentRef::acquire(&engine));

        let packet = &env.settings().packet;
        let payload_max = packet.payload_max.min(MAX_PAYLOAD_SIZE);
        let props = PacketProperties::new(args.head_size, args.tail_size);
        Ok(Box::new(NullTransport {
            name: env.name().to_string(),
            engine,
            props,
            payload_max,
            pool: PacketPool::new(payload_max, props, packet.pool_capacity),
            dropped: 0,
        }))
    }
}

// Connection manager

type PendingConnects = Rc<RefCell<BTreeMap<u64, (ConnectRequest, EventToken)>>>;

pub struct NullConnectionManager {
    name: String,
    transport: ComponentRef,
    engine: ComponentRef,
    delay: Duration,
    refuse: bool,
    dispatcher: Rc<Dispatcher>,
    pending: PendingConnects,
}

impl ConnectionManager for NullConnectionManager {
    fn connect(&mut self, request: ConnectRequest) -> Result<()> {
        let id = request.id();
        let pending = Rc::clone(&self.pending);
        let refuse = self.refuse;
        let manager = self.name.clone();
        let token = self.dispatcher.timeout_add(
            self.delay,
            EventMask::empty(),
            Box::new(move |_, _| {
                // Bind first so the map borrow ends before callbacks run.
                let entry = pending.borrow_mut().remove(&id);
                let Some((request, _)) = entry else {
                    return;
                };
                if refuse {
                    request.fail(ConnectError::Refused);
                } else {
                    info!(manager = %manager, request = id, "connection established");
                    request.succeed();
                }
            }),
        )?;
        self.pending.borrow_mut().insert(id, (request, token));
        Ok(())
    }

    fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    fn drain(&mut self) -> Vec<ConnectRequest> {
        let drained = std::mem::take(&mut *self.pending.borrow_mut());
        drained
            .into_values()
            .map(|(request, token)| {
                self.dispatcher.timeout_del(token);
                request
            })
            .collect()
    }
}

impl ComponentOps for NullConnectionManager {
    fn args(&self) -> ComponentArgs {
        ComponentArgs::ConnectionManager(ConnectionManagerArgs {
            transport: self.transport.name().to_string(),
            engine: self.engine.name().to_string(),
            delay_ms: self.delay.as_millis() as u64,
            refuse: self.refuse,
        })
    }

    fn release_references(&mut self) {
        self.transport.release();
        self.engine.release();
    }

    fn as_connection_manager_mut(&mut self) -> Option<&mut dyn ConnectionManager> {
        Some(self)
    }
}

struct NullConnectionManagerFactory;

impl ComponentFactory for NullConnectionManagerFactory {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ConnectionManager
    }

    fn family(&self) -> &str {
        FAMILY
    }

    fn create(&self, env: &FactoryEnv<'_>, args: &ComponentArgs) -> Result<Box<dyn ComponentOps>> {
        let ComponentArgs::ConnectionManager(args) = args else {
            return Err(env.unexpected_args(args));
        };
        let transport = env.resolve(&args.transport, ComponentKind::Transport)?;
        let engine = env.resolve(&args.engine, ComponentKind::Engine)?;
        Ok(Box::new(NullConnectionManager {
            name: env.name().to_string(),
            transport: ComponentRef::acquire(&transport),
            engine: ComponentRef::acquire(&engine),
            delay: Duration::from_millis(args.delay_ms),
            refuse: args.refuse,
            dispatcher: Rc::clone(env.dispatcher()),
            pending: Rc::new(RefCell::new(BTreeMap::new())),
        }))
    }
}

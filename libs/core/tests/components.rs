//! Engines, transports and application-registered families

mod common;

use common::{engine, transport, StubHandler};
use std::cell::RefCell;
use std::rc::Rc;
use vswitch_core::{
    ComponentArgs, ComponentFactory, ComponentKind, ComponentOps, Context, ContextError,
    ContextSettings, Engine, FactoryEnv, Packet, PacketProperties, TransportArgs,
};
use vswitch_packet::{PacketError, PayloadType};

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    from: String,
    head_room: usize,
    tail_room: usize,
    payload_type: Option<PayloadType>,
    payload: Vec<u8>,
}

type Log = Rc<RefCell<Vec<Seen>>>;

/// Engine that records the layout of every packet it is handed
struct RecordingEngine {
    props: PacketProperties,
    log: Log,
}

impl Engine for RecordingEngine {
    fn process(&mut self, from: &str, packet: &mut Packet) -> vswitch_core::Result<()> {
        self.log.borrow_mut().push(Seen {
            from: from.to_string(),
            head_room: packet.head_room(),
            tail_room: packet.tail_room(),
            payload_type: packet.header().payload_type().ok(),
            payload: packet.payload().to_vec(),
        });
        Ok(())
    }

    fn packet_properties(&self) -> PacketProperties {
        self.props
    }
}

impl ComponentOps for RecordingEngine {
    fn args(&self) -> ComponentArgs {
        ComponentArgs::None
    }

    fn as_engine_mut(&mut self) -> Option<&mut dyn Engine> {
        Some(self)
    }
}

struct RecordingFactory {
    props: PacketProperties,
    log: Log,
}

impl ComponentFactory for RecordingFactory {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Engine
    }

    fn family(&self) -> &str {
        "recorder"
    }

    fn create(
        &self,
        _env: &FactoryEnv<'_>,
        _args: &ComponentArgs,
    ) -> vswitch_core::Result<Box<dyn ComponentOps>> {
        Ok(Box::new(RecordingEngine {
            props: self.props,
            log: Rc::clone(&self.log),
        }))
    }
}

fn with_recorder(props: PacketProperties) -> (Context, Log) {
    let log: Log = Rc::default();
    let mut ctx = Context::new();
    ctx.init(StubHandler::new()).unwrap();
    assert!(ctx
        .register_factory(Box::new(RecordingFactory {
            props,
            log: Rc::clone(&log),
        }))
        .is_none());
    ctx.new_component(ComponentKind::Engine, "recorder", Some("recorder"), ComponentArgs::None)
        .unwrap();
    (ctx, log)
}

#[test]
fn test_transport_honours_engine_margins() {
    let (mut ctx, log) = with_recorder(PacketProperties::new(32, 0));
    let tap = ctx
        .new_component(
            ComponentKind::Transport,
            "null",
            Some("tap0"),
            ComponentArgs::Transport(TransportArgs {
                engine: Some("recorder".to_string()),
                head_size: 8,
                tail_size: 12,
            }),
        )
        .unwrap();

    tap.inject(b"hello").unwrap();
    tap.inject(b"again!").unwrap();

    let seen = log.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        Seen {
            from: "tap0".to_string(),
            head_room: 32,
            tail_room: 12,
            payload_type: Some(PayloadType::Ethernet),
            payload: b"hello".to_vec(),
        }
    );
    assert_eq!(seen[1].payload, b"again!".to_vec());
    assert_eq!(seen[1].head_room, 32);
}

#[test]
fn test_null_engine_uses_settings_margins() {
    let mut settings = ContextSettings::default();
    settings.packet.head_size = 16;
    settings.packet.tail_size = 4;
    let mut ctx = Context::with_settings(settings);
    ctx.init(StubHandler::new()).unwrap();

    let hub = engine(&mut ctx, "hub");
    assert_eq!(hub.packet_properties().unwrap(), PacketProperties::new(16, 4));
}

#[test]
fn test_frames_without_engine_are_dropped() {
    let mut ctx = Context::new();
    ctx.init(StubHandler::new()).unwrap();
    let tap = transport(&mut ctx, "tap0", None);

    tap.inject(&[1, 2, 3]).unwrap();
    assert!(tap.attached_engine().unwrap().is_none());
}

#[test]
fn test_oversized_frame_is_rejected() {
    let (mut ctx, log) = with_recorder(PacketProperties::default());
    let tap = transport(&mut ctx, "tap0", Some("recorder"));
    let limit = ctx.settings().packet.payload_max;

    let err = tap.inject(&vec![0u8; limit + 1]).unwrap_err();
    assert!(matches!(
        err,
        ContextError::Packet(PacketError::PayloadTooLarge { size, .. }) if size == limit + 1
    ));
    assert!(log.borrow().is_empty());

    tap.inject(&vec![0u8; limit]).unwrap();
    assert_eq!(log.borrow()[0].payload.len(), limit);
}

#[test]
fn test_payload_limit_is_capped_by_length_field() {
    let mut settings = ContextSettings::default();
    settings.packet.payload_max = 70_000;
    let mut ctx = Context::with_settings(settings);
    ctx.init(StubHandler::new()).unwrap();
    let hub = engine(&mut ctx, "hub");
    let tap = transport(&mut ctx, "tap0", Some("hub"));

    let err = tap.inject(&vec![0u8; 66_000]).unwrap_err();
    assert!(matches!(
        err,
        ContextError::Packet(PacketError::PayloadTooLarge { size: 66_000, limit: 65_535 })
    ));
    assert_eq!(hub.engine_stats().unwrap().frames, 0);

    tap.inject(&vec![0u8; 65_535]).unwrap();
    assert_eq!(hub.engine_stats().unwrap().bytes, 65_535);
}

#[test]
fn test_engine_counts_frames_and_bytes() {
    let mut ctx = Context::new();
    ctx.init(StubHandler::new()).unwrap();
    let hub = engine(&mut ctx, "hub");
    let tap = transport(&mut ctx, "tap0", Some("hub"));

    for len in [60, 64, 1500] {
        tap.inject(&vec![0x5a; len]).unwrap();
    }
    let stats = hub.engine_stats().unwrap();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.bytes, 1624);
    assert!(Rc::ptr_eq(&tap.attached_engine().unwrap().unwrap(), &hub));
}

#[test]
fn test_roles_are_checked() {
    let mut ctx = Context::new();
    ctx.init(StubHandler::new()).unwrap();
    let hub = engine(&mut ctx, "hub");
    let tap = transport(&mut ctx, "tap0", Some("hub"));

    assert!(matches!(
        hub.inject(&[0; 4]),
        Err(ContextError::InvalidArguments { .. })
    ));
    assert!(matches!(
        tap.engine_stats(),
        Err(ContextError::InvalidArguments { .. })
    ));
    assert!(matches!(
        tap.pending_connects(),
        Err(ContextError::InvalidArguments { .. })
    ));
}

#[test]
fn test_registered_family_is_listed() {
    let (ctx, _log) = with_recorder(PacketProperties::default());
    assert_eq!(ctx.factories().families(ComponentKind::Engine), vec!["null", "recorder"]);
    assert_eq!(ctx.factories().families(ComponentKind::Transport), vec!["null"]);
}

#[test]
fn test_null_engine_rejects_arguments() {
    let mut ctx = Context::new();
    ctx.init(StubHandler::new()).unwrap();
    let err = ctx
        .new_component(
            ComponentKind::Engine,
            "null",
            Some("hub"),
            ComponentArgs::Transport(TransportArgs::default()),
        )
        .unwrap_err();
    assert!(matches!(err, ContextError::InvalidArguments { .. }));
    assert!(ctx.is_empty());
}

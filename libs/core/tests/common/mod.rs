//! Shared fixtures for vswitch-core integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;
use vswitch_core::{
    ComponentArgs, ComponentHandle, ComponentKind, ConnectionManagerArgs, Context, EventCallback,
    EventHandler, EventMask, EventToken, TransportArgs, NO_FD,
};

struct StubRegistration {
    fd: Option<RawFd>,
    mask: EventMask,
    callback: Option<EventCallback>,
}

/// Event handler that records registrations and only fires timers on demand
#[derive(Default)]
pub struct StubHandler {
    next: Cell<u64>,
    registrations: RefCell<BTreeMap<u64, StubRegistration>>,
    refuse: Cell<bool>,
    pub added: Cell<usize>,
    pub removed: Cell<usize>,
}

impl StubHandler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registrations not yet fired or removed
    pub fn live(&self) -> usize {
        self.registrations.borrow().len()
    }

    /// Make every following `add` return no token
    pub fn refuse_registrations(&self, refuse: bool) {
        self.refuse.set(refuse);
    }

    /// Fire every registered timer once. Returns how many ran.
    pub fn fire_timers(&self) -> usize {
        let tokens: Vec<u64> = self
            .registrations
            .borrow()
            .iter()
            .filter(|(_, reg)| reg.fd.is_none())
            .map(|(token, _)| *token)
            .collect();

        let mut fired = 0;
        for token in tokens {
            let taken = {
                let mut registrations = self.registrations.borrow_mut();
                match registrations.get(&token).map(|reg| reg.mask.is_persistent()) {
                    Some(true) => registrations
                        .get_mut(&token)
                        .and_then(|reg| reg.callback.take())
                        .map(|cb| (cb, true)),
                    Some(false) => registrations
                        .remove(&token)
                        .and_then(|reg| reg.callback)
                        .map(|cb| (cb, false)),
                    None => None,
                }
            };
            let Some((mut callback, persistent)) = taken else {
                continue;
            };
            callback(NO_FD, EventMask::TIMEOUT);
            fired += 1;
            if persistent {
                if let Some(reg) = self.registrations.borrow_mut().get_mut(&token) {
                    reg.callback = Some(callback);
                }
            }
        }
        fired
    }

    fn insert(&self, fd: Option<RawFd>, mask: EventMask, callback: EventCallback) -> Option<EventToken> {
        if self.refuse.get() {
            return None;
        }
        let raw = self.next.get() + 1;
        self.next.set(raw);
        self.registrations.borrow_mut().insert(
            raw,
            StubRegistration {
                fd,
                mask,
                callback: Some(callback),
            },
        );
        self.added.set(self.added.get() + 1);
        Some(EventToken::new(raw))
    }

    fn remove(&self, token: EventToken) {
        if self.registrations.borrow_mut().remove(&token.raw()).is_some() {
            self.removed.set(self.removed.get() + 1);
        }
    }
}

impl EventHandler for StubHandler {
    fn event_add(
        &self,
        fd: RawFd,
        mask: EventMask,
        _timeout: Option<Duration>,
        callback: EventCallback,
    ) -> Option<EventToken> {
        self.insert(Some(fd), mask, callback)
    }

    fn event_del(&self, token: EventToken) {
        self.remove(token);
    }

    fn timeout_add(
        &self,
        _timeout: Duration,
        mask: EventMask,
        callback: EventCallback,
    ) -> Option<EventToken> {
        self.insert(None, mask, callback)
    }

    fn timeout_del(&self, token: EventToken) {
        self.remove(token);
    }
}

pub fn engine(ctx: &mut Context, name: &str) -> ComponentHandle {
    ctx.new_component(ComponentKind::Engine, "null", Some(name), ComponentArgs::None)
        .unwrap()
}

pub fn transport(ctx: &mut Context, name: &str, engine: Option<&str>) -> ComponentHandle {
    ctx.new_component(
        ComponentKind::Transport,
        "null",
        Some(name),
        ComponentArgs::Transport(TransportArgs {
            engine: engine.map(str::to_string),
            ..Default::default()
        }),
    )
    .unwrap()
}

pub fn manager(
    ctx: &mut Context,
    name: &str,
    transport: &str,
    engine: &str,
    delay_ms: u64,
    refuse: bool,
) -> ComponentHandle {
    ctx.new_component(
        ComponentKind::ConnectionManager,
        "null",
        Some(name),
        ComponentArgs::ConnectionManager(ConnectionManagerArgs {
            transport: transport.to_string(),
            engine: engine.to_string(),
            delay_ms,
            refuse,
        }),
    )
    .unwrap()
}

/// Success and error invocations observed for connect requests
#[derive(Default)]
pub struct Outcomes {
    pub successes: Cell<usize>,
    pub errors: RefCell<Vec<vswitch_core::ConnectError>>,
}

impl Outcomes {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn total(&self) -> usize {
        self.successes.get() + self.errors.borrow().len()
    }
}

/// Start a connect whose callbacks record into `outcomes`
pub fn connect(
    manager: &ComponentHandle,
    outcomes: &Rc<Outcomes>,
) -> vswitch_core::Result<vswitch_core::ConnectRequest> {
    let ok = Rc::clone(outcomes);
    let err = Rc::clone(outcomes);
    manager.connect(
        move |_| ok.successes.set(ok.successes.get() + 1),
        move |_, error| err.errors.borrow_mut().push(error.clone()),
    )
}

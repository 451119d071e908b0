//! Event Handler Contract
//!
//! ## Purpose
//!
//! The core never waits for I/O itself. An application supplies an
//! [`EventHandler`] at context initialization; components use it, through the
//! context's [`Dispatcher`], to be called back on descriptor readiness or
//! after a timeout.
//!
//! ## Contract
//!
//! - `event_add` registers interest in [`EventMask::READ`] and/or
//!   [`EventMask::WRITE`] on a descriptor, optionally bounded by a timeout.
//!   The callback receives the descriptor and the fired mask.
//! - `timeout_add` registers a pure timer; its callback receives fd `-1` and
//!   [`EventMask::TIMEOUT`].
//! - Registrations without [`EventMask::PERSIST`] fire at most once. Persistent
//!   ones keep firing until removed with `event_del` / `timeout_del`.
//! - Either `add` may fail by returning `None`.
//! - Callbacks never run inside the `add` call that registered them.
//! - Removing a registration from inside its own callback is not supported;
//!   removing any other registration from a callback is.
//!
//! [`Reactor`] is a complete single-threaded implementation over `poll(2)`.
//! [`CallbackHandler`] builds one from individual closures.

mod adapter;
mod dispatch;
mod reactor;

pub use adapter::CallbackHandler;
pub use dispatch::Dispatcher;
pub use reactor::Reactor;

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Descriptor passed to timeout callbacks
pub const NO_FD: RawFd = -1;

/// Readiness interest and fired-event bits
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventMask(u16);

impl EventMask {
    pub const TIMEOUT: EventMask = EventMask(0x01);
    pub const READ: EventMask = EventMask(0x02);
    pub const WRITE: EventMask = EventMask(0x04);
    pub const PERSIST: EventMask = EventMask(0x10);

    pub const fn empty() -> Self {
        EventMask(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        EventMask(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn without(self, other: EventMask) -> Self {
        EventMask(self.0 & !other.0)
    }

    /// Read/write interest only
    pub const fn io(self) -> Self {
        EventMask(self.0 & (Self::READ.0 | Self::WRITE.0))
    }

    pub const fn is_persistent(self) -> bool {
        self.contains(Self::PERSIST)
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: Self) -> Self {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = EventMask;

    fn bitand(self, rhs: Self) -> Self {
        EventMask(self.0 & rhs.0)
    }
}

impl fmt::Debug for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::TIMEOUT, "TIMEOUT"),
            (Self::READ, "READ"),
            (Self::WRITE, "WRITE"),
            (Self::PERSIST, "PERSIST"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "EventMask(0x{:02x})", self.0)
        } else {
            write!(f, "EventMask({})", set.join("|"))
        }
    }
}

/// Opaque registration handle issued by an [`EventHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventToken(u64);

impl EventToken {
    pub const fn new(raw: u64) -> Self {
        EventToken(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Invoked with the descriptor and the fired mask
pub type EventCallback = Box<dyn FnMut(RawFd, EventMask)>;

/// Operations an event handler provides
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const EVENT_ADD: Capabilities = Capabilities(0x1);
    pub const EVENT_DEL: Capabilities = Capabilities(0x2);
    pub const TIMEOUT_ADD: Capabilities = Capabilities(0x4);
    pub const TIMEOUT_DEL: Capabilities = Capabilities(0x8);
    pub const ALL: Capabilities = Capabilities(0xf);

    const NAMES: [(Capabilities, &'static str); 4] = [
        (Self::EVENT_ADD, "event_add"),
        (Self::EVENT_DEL, "event_del"),
        (Self::TIMEOUT_ADD, "timeout_add"),
        (Self::TIMEOUT_DEL, "timeout_del"),
    ];

    pub const fn empty() -> Self {
        Capabilities(0)
    }

    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Capabilities) {
        self.0 |= other.0;
    }

    /// Names of the operations in `required` that are absent from `self`
    pub fn missing(self, required: Capabilities) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(cap, _)| required.contains(*cap) && !self.contains(*cap))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", names.join("|"))
    }
}

/// Event-loop collaborator supplied by the application
pub trait EventHandler {
    /// Register interest in `mask` on `fd`, optionally bounded by `timeout`
    fn event_add(
        &self,
        fd: RawFd,
        mask: EventMask,
        timeout: Option<Duration>,
        callback: EventCallback,
    ) -> Option<EventToken>;

    /// Cancel a pending or persistent descriptor registration
    fn event_del(&self, token: EventToken);

    /// Register a timer
    fn timeout_add(
        &self,
        timeout: Duration,
        mask: EventMask,
        callback: EventCallback,
    ) -> Option<EventToken>;

    /// Cancel a pending or persistent timer
    fn timeout_del(&self, token: EventToken);

    /// Operations this handler actually implements
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }
}

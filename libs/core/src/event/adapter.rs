//! Closure-based event handler
//!
//! Mirrors a table of four function slots: each operation is an optional
//! closure and [`EventHandler::capabilities`] reports which slots are filled.
//! A context refuses a handler with empty slots.

use super::{Capabilities, EventCallback, EventHandler, EventMask, EventToken};
use std::os::unix::io::RawFd;
use std::time::Duration;

type EventAddFn = Box<dyn Fn(RawFd, EventMask, Option<Duration>, EventCallback) -> Option<EventToken>>;
type TimeoutAddFn = Box<dyn Fn(Duration, EventMask, EventCallback) -> Option<EventToken>>;
type DelFn = Box<dyn Fn(EventToken)>;

#[derive(Default)]
pub struct CallbackHandler {
    event_add: Option<EventAddFn>,
    event_del: Option<DelFn>,
    timeout_add: Option<TimeoutAddFn>,
    timeout_del: Option<DelFn>,
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event_add(
        mut self,
        f: impl Fn(RawFd, EventMask, Option<Duration>, EventCallback) -> Option<EventToken> + 'static,
    ) -> Self {
        self.event_add = Some(Box::new(f));
        self
    }

    pub fn on_event_del(mut self, f: impl Fn(EventToken) + 'static) -> Self {
        self.event_del = Some(Box::new(f));
        self
    }

    pub fn on_timeout_add(
        mut self,
        f: impl Fn(Duration, EventMask, EventCallback) -> Option<EventToken> + 'static,
    ) -> Self {
        self.timeout_add = Some(Box::new(f));
        self
    }

    pub fn on_timeout_del(mut self, f: impl Fn(EventToken) + 'static) -> Self {
        self.timeout_del = Some(Box::new(f));
        self
    }
}

impl EventHandler for CallbackHandler {
    fn event_add(
        &self,
        fd: RawFd,
        mask: EventMask,
        timeout: Option<Duration>,
        callback: EventCallback,
    ) -> Option<EventToken> {
        self.event_add
            .as_ref()
            .and_then(|f| f(fd, mask, timeout, callback))
    }

    fn event_del(&self, token: EventToken) {
        if let Some(f) = &self.event_del {
            f(token);
        }
    }

    fn timeout_add(
        &self,
        timeout: Duration,
        mask: EventMask,
        callback: EventCallback,
    ) -> Option<EventToken> {
        self.timeout_add
            .as_ref()
            .and_then(|f| f(timeout, mask, callback))
    }

    fn timeout_del(&self, token: EventToken) {
        if let Some(f) = &self.timeout_del {
            f(token);
        }
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        if self.event_add.is_some() {
            caps.insert(Capabilities::EVENT_ADD);
        }
        if self.event_del.is_some() {
            caps.insert(Capabilities::EVENT_DEL);
        }
        if self.timeout_add.is_some() {
            caps.insert(Capabilities::TIMEOUT_ADD);
        }
        if self.timeout_del.is_some() {
            caps.insert(Capabilities::TIMEOUT_DEL);
        }
        caps
    }
}

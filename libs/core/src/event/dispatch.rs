//! Context-side view of the bound event handler
//!
//! Wraps the application's [`EventHandler`] so that a null token becomes a
//! [`ContextError::Registration`], every registration the core made is known,
//! and finalization can cancel whatever is still pending.

use super::{Capabilities, EventCallback, EventHandler, EventMask, EventToken};
use crate::error::{ContextError, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Descriptor,
    Timer,
}

type LiveSet = Rc<RefCell<HashMap<EventToken, Source>>>;

pub struct Dispatcher {
    handler: Rc<dyn EventHandler>,
    live: LiveSet,
    quiesced: Cell<bool>,
}

impl Dispatcher {
    /// Bind `handler`, which must implement all four operations
    pub fn new(handler: Rc<dyn EventHandler>) -> Result<Self> {
        let missing = handler.capabilities().missing(Capabilities::ALL);
        if !missing.is_empty() {
            return Err(ContextError::malformed_handler(missing.join(", ")));
        }
        Ok(Self {
            handler,
            live: Rc::new(RefCell::new(HashMap::new())),
            quiesced: Cell::new(false),
        })
    }

    pub fn handler(&self) -> &Rc<dyn EventHandler> {
        &self.handler
    }

    pub fn event_add(
        &self,
        fd: RawFd,
        mask: EventMask,
        timeout: Option<Duration>,
        callback: EventCallback,
    ) -> Result<EventToken> {
        self.ensure_open("event_add")?;
        let (callback, slot) = self.track(mask, callback);
        let token = self
            .handler
            .event_add(fd, mask, timeout, callback)
            .ok_or_else(|| {
                warn!(fd, ?mask, "event handler refused descriptor registration");
                ContextError::registration("event_add")
            })?;
        slot.set(Some(token));
        self.live.borrow_mut().insert(token, Source::Descriptor);
        trace!(fd, ?mask, ?token, "descriptor registered");
        Ok(token)
    }

    pub fn timeout_add(
        &self,
        timeout: Duration,
        mask: EventMask,
        callback: EventCallback,
    ) -> Result<EventToken> {
        self.ensure_open("timeout_add")?;
        let (callback, slot) = self.track(mask, callback);
        let token = self
            .handler
            .timeout_add(timeout, mask, callback)
            .ok_or_else(|| {
                warn!(?timeout, "event handler refused timer registration");
                ContextError::registration("timeout_add")
            })?;
        slot.set(Some(token));
        self.live.borrow_mut().insert(token, Source::Timer);
        trace!(?timeout, ?mask, ?token, "timer registered");
        Ok(token)
    }

    /// Cancel a descriptor registration. Returns `false` when `token` is not
    /// a live descriptor registration (already fired, or never issued here).
    pub fn event_del(&self, token: EventToken) -> bool {
        if !self.take(token, Source::Descriptor) {
            return false;
        }
        self.handler.event_del(token);
        true
    }

    /// Cancel a timer. Returns `false` when `token` is not a live timer.
    pub fn timeout_del(&self, token: EventToken) -> bool {
        if !self.take(token, Source::Timer) {
            return false;
        }
        self.handler.timeout_del(token);
        true
    }

    pub fn is_live(&self, token: EventToken) -> bool {
        self.live.borrow().contains_key(&token)
    }

    /// Registrations made through this dispatcher that can still fire
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn is_quiesced(&self) -> bool {
        self.quiesced.get()
    }

    /// Refuse further registrations and cancel every live one
    pub fn quiesce(&self) {
        if self.quiesced.replace(true) {
            return;
        }
        let drained: Vec<(EventToken, Source)> = self.live.borrow_mut().drain().collect();
        for (token, source) in &drained {
            match source {
                Source::Descriptor => self.handler.event_del(*token),
                Source::Timer => self.handler.timeout_del(*token),
            }
        }
        debug!(cancelled = drained.len(), "dispatcher quiesced");
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.quiesced.get() {
            return Err(ContextError::invalid_state(operation, "finalized"));
        }
        Ok(())
    }

    fn take(&self, token: EventToken, source: Source) -> bool {
        let mut live = self.live.borrow_mut();
        if live.get(&token) != Some(&source) {
            return false;
        }
        live.remove(&token);
        true
    }

    /// One-shot callbacks drop their own live entry before running. The token
    /// slot is filled once the handler has issued it.
    fn track(
        &self,
        mask: EventMask,
        mut callback: EventCallback,
    ) -> (EventCallback, Rc<Cell<Option<EventToken>>>) {
        let slot = Rc::new(Cell::new(None));
        if mask.is_persistent() {
            return (callback, slot);
        }
        let live = Rc::downgrade(&self.live);
        let own = Rc::clone(&slot);
        let wrapped: EventCallback = Box::new(move |fd, fired| {
            if let (Some(live), Some(token)) = (live.upgrade(), own.get()) {
                live.borrow_mut().remove(&token);
            }
            callback(fd, fired);
        });
        (wrapped, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallbackHandler, Reactor};

    #[test]
    fn test_rejects_partial_handler() {
        let handler = CallbackHandler::new()
            .on_event_add(|_, _, _, _| None)
            .on_event_del(|_| {})
            .on_timeout_add(|_, _, _| None);
        let err = Dispatcher::new(Rc::new(handler)).err().unwrap();
        assert!(matches!(
            err,
            ContextError::MalformedHandler { ref missing } if missing == "timeout_del"
        ));
    }

    #[test]
    fn test_null_token_is_registration_failure() {
        let handler = CallbackHandler::new()
            .on_event_add(|_, _, _, _| None)
            .on_event_del(|_| {})
            .on_timeout_add(|_, _, _| None)
            .on_timeout_del(|_| {});
        let dispatcher = Dispatcher::new(Rc::new(handler)).unwrap();
        let err = dispatcher
            .timeout_add(Duration::ZERO, EventMask::empty(), Box::new(|_, _| {}))
            .unwrap_err();
        assert!(matches!(err, ContextError::Registration { operation: "timeout_add" }));
        assert_eq!(dispatcher.live_count(), 0);
    }

    #[test]
    fn test_one_shot_leaves_live_set() {
        let reactor = Rc::new(Reactor::new());
        let dispatcher = Dispatcher::new(reactor.clone()).unwrap();

        let once = dispatcher
            .timeout_add(Duration::ZERO, EventMask::empty(), Box::new(|_, _| {}))
            .unwrap();
        let persistent = dispatcher
            .timeout_add(
                Duration::from_millis(1),
                EventMask::PERSIST,
                Box::new(|_, _| {}),
            )
            .unwrap();
        assert_eq!(dispatcher.live_count(), 2);

        reactor.run_once(Some(Duration::from_millis(20))).unwrap();
        assert!(!dispatcher.is_live(once));
        assert!(dispatcher.is_live(persistent));
        assert!(!dispatcher.timeout_del(once));
        assert!(dispatcher.timeout_del(persistent));
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_quiesce_cancels_and_refuses() {
        let reactor = Rc::new(Reactor::new());
        let dispatcher = Dispatcher::new(reactor.clone()).unwrap();
        dispatcher
            .timeout_add(Duration::from_secs(60), EventMask::empty(), Box::new(|_, _| {}))
            .unwrap();
        assert_eq!(reactor.pending(), 1);

        dispatcher.quiesce();
        dispatcher.quiesce();
        assert_eq!(reactor.pending(), 0);
        assert_eq!(dispatcher.live_count(), 0);
        assert!(dispatcher
            .timeout_add(Duration::ZERO, EventMask::empty(), Box::new(|_, _| {}))
            .is_err());
    }
}

//! Asynchronous Connect Protocol
//!
//! ## Purpose
//!
//! A connection manager never blocks its caller. [`Component::connect`]
//! returns a [`ConnectRequest`] in state [`ConnectState::Requested`]; the
//! manager later completes it from an event callback with
//! [`ConnectRequest::succeed`] or [`ConnectRequest::fail`].
//!
//! ## Exactly once
//!
//! Both outcomes are terminal and the first one wins: the caller's callbacks
//! are stored together and taken out on the first transition, so at most one
//! of them can ever run. Managers complete or abort every request they
//! accepted, which makes "at least once" hold as well. Callbacks run with no
//! internal borrow held and may start new requests on the same manager.
//!
//! [`Component::connect`]: crate::component::Component::connect

use crate::component::ComponentHandle;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Requested,
    Succeeded,
    Failed,
}

/// Reason delivered to the error callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection refused")]
    Refused,

    /// The manager was removed or its context finalized first
    #[error("connect aborted")]
    Aborted,

    #[error("peer unreachable: {0}")]
    Unreachable(String),
}

pub type SuccessCallback = Box<dyn FnOnce(&ComponentHandle)>;
pub type ErrorCallback = Box<dyn FnOnce(&ComponentHandle, &ConnectError)>;

struct RequestInner {
    id: u64,
    manager: ComponentHandle,
    state: Cell<ConnectState>,
    callbacks: RefCell<Option<(SuccessCallback, ErrorCallback)>>,
}

/// One in-flight connect, shared between the caller and the manager
#[derive(Clone)]
pub struct ConnectRequest {
    inner: Rc<RequestInner>,
}

impl ConnectRequest {
    pub(crate) fn new(
        manager: ComponentHandle,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            inner: Rc::new(RequestInner {
                id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                manager,
                state: Cell::new(ConnectState::Requested),
                callbacks: RefCell::new(Some((on_success, on_error))),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> ConnectState {
        self.inner.state.get()
    }

    pub fn is_complete(&self) -> bool {
        self.state() != ConnectState::Requested
    }

    pub fn manager(&self) -> &ComponentHandle {
        &self.inner.manager
    }

    /// Complete successfully. Returns `false` if already complete.
    pub fn succeed(&self) -> bool {
        match self.finish(ConnectState::Succeeded) {
            Some((on_success, _)) => {
                on_success(&self.inner.manager);
                true
            }
            None => false,
        }
    }

    /// Complete with `error`. Returns `false` if already complete.
    pub fn fail(&self, error: ConnectError) -> bool {
        match self.finish(ConnectState::Failed) {
            Some((_, on_error)) => {
                on_error(&self.inner.manager, &error);
                true
            }
            None => false,
        }
    }

    /// Terminate without running either callback; used when the request
    /// never got started.
    pub(crate) fn discard(&self) {
        let _ = self.finish(ConnectState::Failed);
    }

    fn finish(&self, state: ConnectState) -> Option<(SuccessCallback, ErrorCallback)> {
        if self.inner.state.get() != ConnectState::Requested {
            return None;
        }
        self.inner.state.set(state);
        self.inner.callbacks.borrow_mut().take()
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("id", &self.inner.id)
            .field("manager", &self.inner.manager.name())
            .field("state", &self.state())
            .finish()
    }
}

//! Reference Event Loop
//!
//! ## Purpose
//!
//! A single-threaded [`EventHandler`] built on `poll(2)` and a timer list,
//! enough to drive a context in the daemon and in tests.
//!
//! ## Ordering
//!
//! Tokens are issued in increasing order and every pass fires ready
//! registrations in token order, so events pending on the same descriptor
//! are delivered in the order they were registered. A registration removed by
//! an earlier callback in the same pass does not fire.

use super::{EventCallback, EventHandler, EventMask, EventToken, NO_FD};
use crate::error::Result;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use tracing::trace;

struct Registration {
    fd: Option<RawFd>,
    mask: EventMask,
    /// Timeout re-armed after each firing of a persistent registration
    period: Option<Duration>,
    deadline: Option<Instant>,
    /// Taken out while the callback runs
    callback: Option<EventCallback>,
}

impl Registration {
    fn watched_fd(&self) -> Option<RawFd> {
        self.fd.filter(|_| !self.mask.io().is_empty())
    }
}

#[derive(Default)]
struct ReactorState {
    next_token: u64,
    registrations: BTreeMap<u64, Registration>,
}

#[derive(Default)]
pub struct Reactor {
    state: RefCell<ReactorState>,
}

impl Reactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations that can still fire
    pub fn pending(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    /// Wait for at most `max_wait` (or until the next timer, whichever is
    /// sooner; `None` waits indefinitely for descriptors) and run every
    /// callback that became ready. Returns how many callbacks ran.
    pub fn run_once(&self, max_wait: Option<Duration>) -> Result<usize> {
        let (watches, wait) = {
            let state = self.state.borrow();
            if state.registrations.is_empty() {
                return Ok(0);
            }
            let now = Instant::now();
            let until_timer = state
                .registrations
                .values()
                .filter_map(|reg| reg.deadline)
                .min()
                .map(|deadline| deadline.saturating_duration_since(now));
            let wait = match (until_timer, max_wait) {
                (Some(timer), Some(max)) => Some(timer.min(max)),
                (timer, max) => timer.or(max),
            };
            let watches: Vec<(u64, RawFd, EventMask)> = state
                .registrations
                .iter()
                .filter_map(|(token, reg)| reg.watched_fd().map(|fd| (*token, fd, reg.mask.io())))
                .collect();
            (watches, wait)
        };

        let mut ready: BTreeMap<u64, EventMask> = BTreeMap::new();
        if watches.is_empty() {
            if let Some(wait) = wait.filter(|w| !w.is_zero()) {
                std::thread::sleep(wait);
            }
        } else {
            let mut fds: Vec<PollFd<'_>> = watches
                .iter()
                .map(|(_, fd, mask)| {
                    // SAFETY: the descriptor is owned by whoever registered it
                    // and must stay open until the registration is removed.
                    let fd = unsafe { BorrowedFd::borrow_raw(*fd) };
                    PollFd::new(fd, poll_flags(*mask))
                })
                .collect();
            match poll(&mut fds, poll_timeout(wait)) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(0),
                Err(errno) => return Err(errno.into()),
            }
            for ((token, _, interest), pfd) in watches.iter().zip(&fds) {
                if let Some(revents) = pfd.revents() {
                    let fired = fired_mask(revents, *interest);
                    if !fired.is_empty() {
                        ready.insert(*token, fired);
                    }
                }
            }
        }

        let now = Instant::now();
        for (token, reg) in self.state.borrow().registrations.iter() {
            if reg.deadline.is_some_and(|deadline| deadline <= now) {
                ready.entry(*token).or_insert(EventMask::TIMEOUT);
            }
        }

        let mut fired = 0;
        for (token, events) in ready {
            let Some((mut callback, fd, persistent)) = self.take_for_firing(token) else {
                continue;
            };
            trace!(token, fd, ?events, "firing");
            callback(fd, events);
            fired += 1;
            if persistent {
                if let Some(reg) = self.state.borrow_mut().registrations.get_mut(&token) {
                    reg.callback = Some(callback);
                }
            }
        }
        Ok(fired)
    }

    /// Dispatch until nothing is registered or `limit` has elapsed
    pub fn run_until_idle(&self, limit: Duration) -> Result<usize> {
        let start = Instant::now();
        let mut total = 0;
        while self.pending() > 0 {
            let elapsed = start.elapsed();
            if elapsed >= limit {
                break;
            }
            total += self.run_once(Some(limit - elapsed))?;
        }
        Ok(total)
    }

    /// Detach the callback for one firing: one-shot registrations are
    /// removed, persistent ones re-arm their timeout and keep their slot.
    fn take_for_firing(&self, token: u64) -> Option<(EventCallback, RawFd, bool)> {
        let mut state = self.state.borrow_mut();
        let persistent = state.registrations.get(&token)?.mask.is_persistent();
        if persistent {
            let reg = state.registrations.get_mut(&token)?;
            reg.deadline = reg.period.map(|period| Instant::now() + period);
            let callback = reg.callback.take()?;
            Some((callback, reg.fd.unwrap_or(NO_FD), true))
        } else {
            let reg = state.registrations.remove(&token)?;
            let fd = reg.fd.unwrap_or(NO_FD);
            reg.callback.map(|callback| (callback, fd, false))
        }
    }

    fn insert(&self, registration: Registration) -> EventToken {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let raw = state.next_token;
        state.registrations.insert(raw, registration);
        EventToken::new(raw)
    }

    fn remove(&self, token: EventToken) {
        self.state.borrow_mut().registrations.remove(&token.raw());
    }
}

impl EventHandler for Reactor {
    fn event_add(
        &self,
        fd: RawFd,
        mask: EventMask,
        timeout: Option<Duration>,
        callback: EventCallback,
    ) -> Option<EventToken> {
        if fd < 0 || (mask.io().is_empty() && timeout.is_none()) {
            return None;
        }
        Some(self.insert(Registration {
            fd: Some(fd),
            mask,
            period: timeout,
            deadline: timeout.map(|t| Instant::now() + t),
            callback: Some(callback),
        }))
    }

    fn event_del(&self, token: EventToken) {
        self.remove(token);
    }

    fn timeout_add(
        &self,
        timeout: Duration,
        mask: EventMask,
        callback: EventCallback,
    ) -> Option<EventToken> {
        Some(self.insert(Registration {
            fd: None,
            mask,
            period: Some(timeout),
            deadline: Some(Instant::now() + timeout),
            callback: Some(callback),
        }))
    }

    fn timeout_del(&self, token: EventToken) {
        self.remove(token);
    }
}

fn poll_flags(interest: EventMask) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.contains(EventMask::READ) {
        flags |= PollFlags::POLLIN;
    }
    if interest.contains(EventMask::WRITE) {
        flags |= PollFlags::POLLOUT;
    }
    flags
}

/// Hang-up and error conditions wake every interest so the callback sees
/// the failure on its next read or write.
fn fired_mask(revents: PollFlags, interest: EventMask) -> EventMask {
    if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
        return interest;
    }
    let mut fired = EventMask::empty();
    if revents.contains(PollFlags::POLLIN) {
        fired |= EventMask::READ;
    }
    if revents.contains(PollFlags::POLLOUT) {
        fired |= EventMask::WRITE;
    }
    fired & interest
}

fn poll_timeout(wait: Option<Duration>) -> PollTimeout {
    match wait {
        None => PollTimeout::NONE,
        Some(wait) => {
            let millis = wait.as_nanos().div_ceil(1_000_000);
            PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> EventCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |label: &'static str| -> EventCallback {
            let sink = Rc::clone(&sink);
            Box::new(move |_, _| sink.borrow_mut().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_timers_fire_in_registration_order() {
        let reactor = Reactor::new();
        let (log, make) = recorder();
        reactor.timeout_add(Duration::ZERO, EventMask::empty(), make("first"));
        reactor.timeout_add(Duration::ZERO, EventMask::empty(), make("second"));

        assert_eq!(reactor.run_once(Some(Duration::ZERO)).unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_timeout_callback_gets_no_fd() {
        let reactor = Reactor::new();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        reactor.timeout_add(
            Duration::ZERO,
            EventMask::empty(),
            Box::new(move |fd, mask| *sink.borrow_mut() = Some((fd, mask))),
        );
        reactor.run_once(None).unwrap();
        assert_eq!(*seen.borrow(), Some((NO_FD, EventMask::TIMEOUT)));
    }

    #[test]
    fn test_cancel_from_another_callback() {
        let reactor = Rc::new(Reactor::new());
        let (log, make) = recorder();
        let victim = Rc::new(RefCell::new(None::<EventToken>));

        let canceller = Rc::clone(&reactor);
        let target = Rc::clone(&victim);
        let mut first = make("canceller");
        reactor.timeout_add(
            Duration::ZERO,
            EventMask::empty(),
            Box::new(move |fd, mask| {
                first(fd, mask);
                if let Some(token) = target.borrow_mut().take() {
                    canceller.timeout_del(token);
                }
            }),
        );
        let token = reactor
            .timeout_add(Duration::ZERO, EventMask::empty(), make("victim"))
            .unwrap();
        *victim.borrow_mut() = Some(token);

        reactor.run_once(Some(Duration::ZERO)).unwrap();
        assert_eq!(*log.borrow(), vec!["canceller"]);
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_persistent_timer_rearms() {
        let reactor = Reactor::new();
        let (log, make) = recorder();
        let token = reactor
            .timeout_add(Duration::from_millis(1), EventMask::PERSIST, make("tick"))
            .unwrap();

        let fired = reactor.run_until_idle(Duration::from_millis(30)).unwrap();
        assert!(fired >= 2);
        assert_eq!(reactor.pending(), 1);
        reactor.timeout_del(token);
        assert_eq!(reactor.pending(), 0);
        assert!(log.borrow().len() >= 2);
    }

    #[test]
    fn test_rejects_unusable_registrations() {
        let reactor = Reactor::new();
        assert!(reactor
            .event_add(-1, EventMask::READ, None, Box::new(|_, _| {}))
            .is_none());
        assert!(reactor
            .event_add(0, EventMask::PERSIST, None, Box::new(|_, _| {}))
            .is_none());
    }
}

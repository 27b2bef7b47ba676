use std::{
    io::{self, ErrorKind},
    sync::Arc,
    time::Duration,
};

use mio::{Events, Poll, Token, Waker};
use tracing::{event, Level};

use crate::Listener;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Waits for listener readiness, a wake from another thread, or a timeout.
///
/// The event loop uses this as its interval wait between accept steps, so incoming connections
/// and stop requests don't have to wait out the full interval.
pub struct Poller {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

/// What woke up a `Poller::wait` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub woken: bool,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(16),
            waker: Arc::new(waker),
        })
    }

    /// Get a thread-safe handle that interrupts a pending `wait`.
    pub fn wake_handle(&self) -> WakeHandle {
        WakeHandle {
            waker: self.waker.clone(),
        }
    }

    pub fn register(&self, listener: &mut Listener) -> io::Result<()> {
        listener.register(self.poll.registry(), LISTENER)
    }

    pub fn deregister(&self, listener: &mut Listener) -> io::Result<()> {
        listener.deregister(self.poll.registry())
    }

    pub fn wait(&mut self, timeout: Duration) -> io::Result<Readiness> {
        let mut readiness = Readiness::default();

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            // A signal landing during the wait is not a failure, just a short wait
            Err(error) if error.kind() == ErrorKind::Interrupted => return Ok(readiness),
            Err(error) => return Err(error),
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER => readiness.readable |= event.is_readable(),
                WAKER => readiness.woken = true,
                token => event!(Level::TRACE, ?token, "ignoring unknown token"),
            }
        }

        Ok(readiness)
    }
}

/// Wakes the `Poller` it was created from.
#[derive(Clone)]
pub struct WakeHandle {
    waker: Arc<Waker>,
}

impl WakeHandle {
    pub fn wake(&self) {
        if let Err(error) = self.waker.wake() {
            event!(Level::WARN, %error, "failed to wake poller");
        }
    }
}

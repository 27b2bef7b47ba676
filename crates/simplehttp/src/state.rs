use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a `Server`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Uninitialized = 0,
    Started = 1,
    StopRequested = 2,
    Error = 3,
    Closed = 4,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::Uninitialized,
            1 => ServerState::Started,
            2 => ServerState::StopRequested,
            3 => ServerState::Error,
            _ => ServerState::Closed,
        }
    }
}

/// Server state shared between the event loop, stop handles, and workers.
pub(crate) struct StateCell {
    value: AtomicU8,
}

impl StateCell {
    pub fn new(state: ServerState) -> Self {
        Self {
            value: AtomicU8::new(state as u8),
        }
    }

    pub fn get(&self) -> ServerState {
        ServerState::from_u8(self.value.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ServerState) {
        self.value.store(state as u8, Ordering::Release);
    }

    /// Flag a worker-side failure.
    ///
    /// Only a started server moves to `Error`, a pending stop or close is never overwritten.
    pub fn mark_error(&self) {
        let _ = self.value.compare_exchange(
            ServerState::Started as u8,
            ServerState::Error as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_error_only_from_started() {
        let cell = StateCell::new(ServerState::Started);
        cell.mark_error();
        assert_eq!(cell.get(), ServerState::Error);

        cell.set(ServerState::StopRequested);
        cell.mark_error();
        assert_eq!(cell.get(), ServerState::StopRequested);
    }

    #[test]
    fn stored_state_is_read_back() {
        let cell = StateCell::new(ServerState::Uninitialized);

        for state in [
            ServerState::Started,
            ServerState::StopRequested,
            ServerState::Error,
            ServerState::Closed,
            ServerState::Uninitialized,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}

//! Socket plumbing for the simplehttp engine.
//!
//! This crate owns everything that touches the listening socket: resolving the bind address,
//! binding with retries, non-blocking accept, and the poller the event loop waits on between
//! accept steps.

mod listener;
mod poller;

use std::io::ErrorKind;

pub use self::{
    listener::{bind, BindConfig, BindError, Listener},
    poller::{Poller, Readiness, WakeHandle},
};

fn check_io<T>(value: Result<T, std::io::Error>) -> Result<Option<T>, std::io::Error> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            // WouldBlock just means we've run out of things to handle
            if error.kind() == ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(error)
            }
        }
    }
}

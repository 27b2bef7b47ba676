use std::{io, net::SocketAddr, sync::Arc};

use simplehttp_mio::{BindError, Listener, Poller, WakeHandle};
use thiserror::Error;
use tracing::{event, instrument, Level};

use crate::{
    state::StateCell,
    worker::{self, Shared},
    Routes, ServerConfig, ServerState,
};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server can't start from state {0:?}")]
    InvalidState(ServerState),
    #[error("failed to bind listener")]
    Bind(#[from] BindError),
    #[error("failed to poll for events")]
    Poll(#[source] io::Error),
}

/// An HTTP server serving one request per connection.
///
/// `C` is the application context, shared by reference with every callback route.
pub struct Server<C> {
    config: ServerConfig,
    shared: Arc<Shared<C>>,
    state: Arc<StateCell>,
    poller: Poller,
    listener: Option<Listener>,
}

impl<C> Server<C>
where
    C: Send + Sync + 'static,
{
    /// Create a server for `routes`, the route table can no longer change after this.
    pub fn new(config: ServerConfig, routes: Routes<C>, context: C) -> Result<Self, ServerError> {
        let poller = Poller::new().map_err(ServerError::Poll)?;

        let shared = Shared {
            routes,
            context,
            max_recv_buffer: config.max_recv_buffer,
            read_timeout: config.read_timeout,
            resolve_peer_host: config.resolve_peer_host,
        };

        Ok(Self {
            config,
            shared: Arc::new(shared),
            state: Arc::new(StateCell::new(ServerState::Uninitialized)),
            poller,
            listener: None,
        })
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    pub fn context(&self) -> &C {
        &self.shared.context
    }

    /// Get a handle that can request a stop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: self.state.clone(),
            wake: self.poller.wake_handle(),
        }
    }

    /// Bind the listener and start accepting.
    ///
    /// Only valid on a new or closed server. Binding is retried as configured, if it never
    /// succeeds the server ends up in the `Error` state.
    #[instrument("server::start", skip_all, fields(port = self.config.port))]
    pub fn start(&mut self) -> Result<(), ServerError> {
        let state = self.state.get();
        if !matches!(state, ServerState::Uninitialized | ServerState::Closed) {
            event!(Level::WARN, ?state, "attempted start in invalid state");
            return Err(ServerError::InvalidState(state));
        }

        event!(Level::DEBUG, "starting");

        let mut listener = match simplehttp_mio::bind(&self.config.bind_config()) {
            Ok(listener) => listener,
            Err(error) => {
                self.state.set(ServerState::Error);
                return Err(error.into());
            }
        };

        if let Err(error) = self.poller.register(&mut listener) {
            self.state.set(ServerState::Error);
            return Err(ServerError::Poll(error));
        }

        self.listener = Some(listener);
        self.state.set(ServerState::Started);
        event!(Level::INFO, "server started");

        Ok(())
    }

    /// Accept at most one pending connection and hand it to a new worker, without blocking.
    ///
    /// Starts the server first if it wasn't yet. Returns whether a connection was accepted.
    pub fn handle_once(&mut self) -> Result<bool, ServerError> {
        if self.state.get() == ServerState::Uninitialized {
            event!(Level::DEBUG, "not started yet, starting");
            self.start()?;
        }

        let state = self.state.get();
        if !matches!(state, ServerState::Started | ServerState::Error) {
            event!(Level::TRACE, ?state, "not accepting");
            return Ok(false);
        }

        let Some(listener) = &self.listener else {
            return Ok(false);
        };

        match listener.accept() {
            Ok(Some((stream, peer_addr))) => {
                event!(Level::DEBUG, %peer_addr, "connection accepted");
                worker::spawn(self.shared.clone(), self.state.clone(), stream, peer_addr);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(error) => {
                event!(Level::WARN, %error, "failed to accept");
                Ok(false)
            }
        }
    }

    /// Accept and dispatch connections until a stop is requested.
    ///
    /// A closed server is started again first. In-flight workers are not waited for.
    #[instrument("server::run", skip_all)]
    pub fn run_forever(&mut self) -> Result<(), ServerError> {
        if self.state.get() == ServerState::Closed {
            self.start()?;
        }

        loop {
            while self.handle_once()? {}

            if self.is_stopped() {
                break;
            }

            self.poller
                .wait(self.config.poll_interval)
                .map_err(ServerError::Poll)?;
        }

        event!(Level::INFO, "event loop stopped");
        Ok(())
    }

    /// Ask the event loop to stop at its next iteration.
    pub fn request_stop(&self) {
        request_stop(&self.state, &self.poller.wake_handle());
    }

    pub fn is_stopped(&self) -> bool {
        self.state.get() == ServerState::StopRequested
    }
}

impl<C> Server<C> {
    /// Close the listening socket.
    ///
    /// Calling this again is a no-op apart from the state staying `Closed`.
    pub fn shutdown(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            if let Err(error) = self.poller.deregister(&mut listener) {
                event!(Level::DEBUG, %error, "failed to deregister listener");
            }

            event!(Level::INFO, local_addr = %listener.local_addr(), "listener closed");
        }

        self.state.set(ServerState::Closed);
    }
}

impl<C> Drop for Server<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Requests a stop of a `Server` event loop from any thread.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<StateCell>,
    wake: WakeHandle,
}

impl StopHandle {
    pub fn request_stop(&self) {
        request_stop(&self.state, &self.wake);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.get() == ServerState::StopRequested
    }
}

fn request_stop(state: &StateCell, wake: &WakeHandle) {
    event!(Level::DEBUG, "stop requested");
    state.set(ServerState::StopRequested);
    wake.wake();
}

use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    thread,
    time::Duration,
};

use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{event, instrument, Level};

use crate::check_io;

/// Settings used to bind a listening socket.
#[derive(Debug, Clone)]
pub struct BindConfig {
    /// Host to resolve the bind address from, `0.0.0.0` binds all IPv4 interfaces.
    pub host: String,
    pub port: u16,
    /// Number of full resolve-and-bind passes before giving up.
    pub max_retries: u32,
    /// Delay between two failed passes.
    pub retry_wait: Duration,
    /// Set `TCP_NODELAY` on the listener and on every accepted stream.
    pub tcp_nodelay: bool,
    pub backlog: i32,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            max_retries: 7,
            retry_wait: Duration::from_secs(15),
            tcp_nodelay: false,
            backlog: 1024,
        }
    }
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error("failed to resolve bind address {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no candidate address could be bound after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("failed to listen on bound socket")]
    Listen(#[source] io::Error),
}

/// A bound, listening, non-blocking TCP socket.
pub struct Listener {
    listener: mio::net::TcpListener,
    local_addr: SocketAddr,
    tcp_nodelay: bool,
}

/// Bind a listening socket, retrying whole passes over the resolved candidates.
///
/// A failure on one candidate address moves on to the next one, only when every candidate of
/// a pass failed is the pass considered failed. Resolution failures are not retried.
#[instrument("tcp::bind", skip_all, fields(host = %config.host, port = config.port))]
pub fn bind(config: &BindConfig) -> Result<Listener, BindError> {
    let attempts = config.max_retries.max(1);

    for attempt in 1..=attempts {
        if let Some(socket) = bind_pass(config)? {
            if attempt > 1 {
                event!(Level::INFO, attempt, max = attempts, "bound on retry");
            }
            return listen(socket, config);
        }

        if attempt < attempts {
            event!(
                Level::WARN,
                attempt,
                max = attempts,
                wait = ?config.retry_wait,
                "no address could be bound, retrying"
            );
            thread::sleep(config.retry_wait);
        }
    }

    event!(Level::ERROR, attempts, "giving up on binding");
    Err(BindError::Exhausted { attempts })
}

fn bind_pass(config: &BindConfig) -> Result<Option<Socket>, BindError> {
    let candidates = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|source| BindError::Resolve {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

    for addr in candidates {
        match bind_candidate(addr) {
            Ok(socket) => {
                event!(Level::DEBUG, %addr, "bound");
                return Ok(Some(socket));
            }
            Err(error) => {
                event!(Level::DEBUG, %addr, %error, "bind failed, trying next candidate");
            }
        }
    }

    Ok(None)
}

fn bind_candidate(addr: SocketAddr) -> Result<Socket, io::Error> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;

    // Reuse has to be in place before bind to help with restarts
    if let Err(error) = socket.set_reuse_address(true) {
        event!(Level::WARN, %error, "failed to set SO_REUSEADDR");
    }
    set_reuse_port(&socket);

    socket.bind(&addr.into())?;
    Ok(socket)
}

#[cfg(unix)]
fn set_reuse_port(socket: &Socket) {
    if let Err(error) = socket.set_reuse_port(true) {
        event!(Level::WARN, %error, "failed to set SO_REUSEPORT");
    }
}

#[cfg(not(unix))]
fn set_reuse_port(_socket: &Socket) {}

fn listen(socket: Socket, config: &BindConfig) -> Result<Listener, BindError> {
    if config.tcp_nodelay {
        if let Err(error) = socket.set_nodelay(true) {
            event!(Level::WARN, %error, "failed to set TCP_NODELAY");
        }
    }

    socket.listen(config.backlog).map_err(BindError::Listen)?;

    let listener: std::net::TcpListener = socket.into();
    let local_addr = listener.local_addr().map_err(BindError::Listen)?;
    event!(Level::INFO, %local_addr, "listening");

    Ok(Listener {
        listener: mio::net::TcpListener::from_std(listener),
        local_addr,
        tcp_nodelay: config.tcp_nodelay,
    })
}

impl Listener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.listener, token, Interest::READABLE)
    }

    pub(crate) fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.listener)
    }

    /// Accept one pending connection without blocking.
    ///
    /// Returns `None` if no connection is pending. The returned stream is switched to blocking
    /// mode, it is meant to be handed off to its own worker.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let Some((stream, peer_addr)) = check_io(self.listener.accept())? else {
            return Ok(None);
        };

        let stream = TcpStream::from(stream);
        stream.set_nonblocking(false)?;

        if self.tcp_nodelay {
            if let Err(error) = stream.set_nodelay(true) {
                event!(Level::WARN, %error, "failed to set TCP_NODELAY on stream");
            }
        }

        Ok(Some((stream, peer_addr)))
    }
}

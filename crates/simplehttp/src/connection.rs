use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{event, Level};
use uuid::Uuid;

use crate::Status;

const CHUNK_SIZE: usize = 1024;

/// An accepted client connection.
///
/// Callback routes write their response through this. The connection is shut down in both
/// directions and closed when it is dropped, whichever way the request ended.
pub struct Connection {
    id: Uuid,
    stream: TcpStream,
    peer_addr: SocketAddr,
    peer_host: Option<String>,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            peer_addr,
            peer_host: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Host name of the peer, if it could be resolved.
    pub fn peer_host(&self) -> Option<&str> {
        self.peer_host.as_deref()
    }

    /// Best-effort reverse lookup of the peer address.
    pub(crate) fn resolve_peer_host(&mut self) {
        match dns_lookup::lookup_addr(&self.peer_addr.ip()) {
            Ok(host) => self.peer_host = Some(host),
            Err(error) => event!(Level::DEBUG, %error, "failed to resolve peer host"),
        }
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Receive once, up to `max` bytes.
    ///
    /// There is no attempt to drain the stream beyond a single read, an empty result means the
    /// peer closed the connection.
    pub(crate) fn recv(&mut self, max: usize) -> io::Result<Bytes> {
        let mut buffer = BytesMut::zeroed(max);

        let read = loop {
            match self.stream.read(&mut buffer) {
                Ok(read) => break read,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        };

        buffer.truncate(read);
        Ok(buffer.freeze())
    }

    /// Send raw bytes to the client.
    pub fn send(&mut self, data: impl AsRef<[u8]>) -> io::Result<()> {
        self.stream.write_all(data.as_ref())
    }

    /// Send a `200 OK` status line followed by the extra header lines and the blank line.
    ///
    /// Header lines should each end in CRLF, a missing final line ending is added.
    pub fn send_ok(&mut self, headers: &str) -> io::Result<()> {
        let mut data = BytesMut::new();

        data.put(Status::Ok.status_line().as_bytes());
        if !headers.is_empty() {
            data.put(headers.as_bytes());
            if !headers.ends_with('\n') {
                data.put(&b"\r\n"[..]);
            }
        }
        data.put(&b"\r\n"[..]);

        self.send(data)
    }

    /// Send a body-less response with `status`.
    pub fn send_status(&mut self, status: Status) -> io::Result<()> {
        let mut data = status.status_line();
        data.push_str("\r\n");
        self.send(data)
    }

    /// Copy everything from `reader` to the client in fixed-size chunks.
    pub fn send_from(&mut self, mut reader: impl Read) -> io::Result<u64> {
        let mut buffer = [0; CHUNK_SIZE];
        let mut total = 0;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            };

            event!(Level::TRACE, bytes = read, "sending chunk");
            self.stream.write_all(&buffer[..read])?;
            total += read as u64;
        }

        Ok(total)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        event!(Level::DEBUG, "closing connection");

        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            // Peer already gone, nothing left to shut down
            if error.kind() != ErrorKind::NotConnected {
                event!(Level::DEBUG, %error, "failed to shut down connection");
            }
        }
    }
}

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Error};
use simplehttp::{Routes, Server, ServerConfig, ServerError, StopHandle};

pub fn test_config() -> ServerConfig {
    ServerConfig::default()
        .with_host("127.0.0.1")
        .with_port(0)
        .with_retries(1, Duration::ZERO)
        .with_poll_interval(Duration::from_millis(20))
        .with_resolve_peer_host(false)
}

/// A server running its event loop on a background thread.
pub struct RunningServer {
    addr: SocketAddr,
    stop: StopHandle,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
}

impl RunningServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(mut self) -> Result<(), Error> {
        self.stop.request_stop();

        let thread = self.thread.take().context("server already stopped")?;
        thread
            .join()
            .map_err(|_| anyhow!("server thread panicked"))??;

        Ok(())
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop.request_stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn given_server<C>(routes: Routes<C>, context: C) -> Result<RunningServer, Error>
where
    C: Send + Sync + 'static,
{
    given_server_with(test_config(), routes, context)
}

pub fn given_server_with<C>(
    config: ServerConfig,
    routes: Routes<C>,
    context: C,
) -> Result<RunningServer, Error>
where
    C: Send + Sync + 'static,
{
    let mut server = Server::new(config, routes, context)?;
    server.start()?;

    let addr = server.local_addr().context("started server has no address")?;
    let stop = server.stop_handle();
    let thread = thread::spawn(move || server.run_forever());

    Ok(RunningServer {
        addr,
        stop,
        thread: Some(thread),
    })
}

pub struct Response {
    pub raw: Vec<u8>,
    pub status_line: String,
    pub body: Vec<u8>,
}

impl Response {
    fn parse(raw: Vec<u8>) -> Self {
        let head_end = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4)
            .unwrap_or(raw.len());
        let line_end = raw
            .windows(2)
            .position(|window| window == b"\r\n")
            .unwrap_or(raw.len());

        Self {
            status_line: String::from_utf8_lossy(&raw[..line_end]).into_owned(),
            body: raw[head_end..].to_vec(),
            raw,
        }
    }

    pub fn head(&self) -> String {
        let head_len = self.raw.len() - self.body.len();
        String::from_utf8_lossy(&self.raw[..head_len]).into_owned()
    }
}

/// Send raw bytes and read until the server closes the connection.
pub fn when_sent(addr: SocketAddr, request: &[u8]) -> Result<Vec<u8>, Error> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    stream.write_all(request)?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .context("failed to read response")?;

    Ok(response)
}

pub fn when_get(addr: SocketAddr, target: &str) -> Result<Response, Error> {
    let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let raw = when_sent(addr, request.as_bytes())?;
    Ok(Response::parse(raw))
}

pub fn when_post(addr: SocketAddr, target: &str, body: &str) -> Result<Response, Error> {
    let request = format!(
        "POST {target} HTTP/1.0\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let raw = when_sent(addr, request.as_bytes())?;
    Ok(Response::parse(raw))
}

pub fn then_status(response: &Response, status_line: &str) {
    assert_eq!(response.status_line, status_line, "unexpected status line");
}

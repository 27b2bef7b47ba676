use std::{
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread,
    time::Duration,
};

use tracing::{event, instrument, Level};

use crate::{
    dispatch::{dispatch, Outcome},
    state::StateCell,
    Connection, Request, Routes, Status,
};

/// Read-only data every worker needs.
pub(crate) struct Shared<C> {
    pub routes: Routes<C>,
    pub context: C,
    pub max_recv_buffer: usize,
    pub read_timeout: Option<Duration>,
    pub resolve_peer_host: bool,
}

/// Serve an accepted connection on its own thread.
pub(crate) fn spawn<C>(
    shared: Arc<Shared<C>>,
    state: Arc<StateCell>,
    stream: TcpStream,
    peer_addr: SocketAddr,
) where
    C: Send + Sync + 'static,
{
    let connection = Connection::new(stream, peer_addr);

    let result = thread::Builder::new()
        .name("http-worker".to_string())
        .spawn(move || serve(&shared, &state, connection));

    // The connection is dropped, and so closed, along with the failed closure
    if let Err(error) = result {
        event!(Level::ERROR, %error, "failed to spawn worker");
    }
}

#[instrument("http-connection", skip_all, fields(id = %connection.id(), peer = %connection.peer_addr()))]
fn serve<C>(shared: &Shared<C>, state: &StateCell, mut connection: Connection) {
    if shared.resolve_peer_host {
        connection.resolve_peer_host();
    }

    if let Err(error) = connection.set_read_timeout(shared.read_timeout) {
        event!(Level::WARN, %error, "failed to set read timeout");
    }

    let data = match connection.recv(shared.max_recv_buffer) {
        Ok(data) if data.is_empty() => {
            event!(Level::WARN, "client disconnected unexpectedly");
            state.mark_error();
            return;
        }
        Ok(data) => data,
        Err(error) => {
            event!(Level::WARN, %error, "failed to receive");
            state.mark_error();
            return;
        }
    };

    let truncated = data.len() >= shared.max_recv_buffer;
    if truncated {
        event!(
            Level::WARN,
            limit = shared.max_recv_buffer,
            "request filled receive buffer, may be truncated"
        );
    }

    let mut request = match Request::parse(data) {
        Ok(request) => request,
        Err(error) if error.is_answered() => {
            event!(Level::DEBUG, %error, "bad request");
            if let Err(error) = connection.send_status(Status::BadRequest) {
                event!(Level::WARN, %error, "failed to send response");
            }
            return;
        }
        Err(error) => {
            event!(Level::DEBUG, %error, "dropping request");
            return;
        }
    };
    request.truncated = truncated;

    match dispatch(&shared.routes, &shared.context, &mut connection, &request) {
        Ok(outcome) => {
            let status = match outcome {
                Outcome::Responded(status) => status.code().to_string(),
                Outcome::Callback => "callback".to_string(),
            };
            event!(
                Level::INFO,
                host = connection.peer_host().unwrap_or(""),
                method = %request.method(),
                path = request.path(),
                %status,
                "served"
            );
        }
        Err(error) => {
            event!(Level::WARN, path = request.path(), "failed to respond: {:#}", error);
        }
    }
}

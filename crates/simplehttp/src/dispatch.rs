use std::{
    fs::File,
    io::{self, ErrorKind},
    path::Path,
};

use anyhow::Error;
use tracing::{event, Level};

use crate::{Connection, Method, Request, Route, Routes, Status};

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The engine wrote a response with this status.
    Responded(Status),
    /// A callback route wrote its own response.
    Callback,
}

/// Look up the route for `request` and answer it on `connection`.
///
/// Content and file routes only answer GET, any other miss is a `404`. A file is opened before
/// anything is written, so a missing file or a directory is a plain `404` too.
pub(crate) fn dispatch<C>(
    routes: &Routes<C>,
    context: &C,
    connection: &mut Connection,
    request: &Request,
) -> Result<Outcome, Error> {
    let route = routes.get(request.path());

    match (route, request.method()) {
        (Some(Route::Callback(callback)), _) => {
            event!(Level::TRACE, "handling with callback");
            callback(connection, request, context)?;
            Ok(Outcome::Callback)
        }
        (Some(Route::Content { content, headers }), Method::Get) => {
            connection.send_ok(headers)?;
            connection.send(content)?;
            Ok(Outcome::Responded(Status::Ok))
        }
        (Some(Route::File { path, headers }), Method::Get) => {
            let file = match open_regular(path) {
                Ok(file) => file,
                Err(error) => {
                    event!(Level::WARN, path = %path.display(), %error, "failed to open file");
                    return not_found(connection);
                }
            };

            connection.send_ok(headers)?;
            let sent = connection.send_from(file)?;
            event!(Level::TRACE, bytes = sent, "sent file");

            Ok(Outcome::Responded(Status::Ok))
        }
        _ => {
            event!(Level::DEBUG, path = request.path(), "no route");
            not_found(connection)
        }
    }
}

/// Open `path` for reading, only if it is a regular file.
fn open_regular(path: &Path) -> io::Result<File> {
    let file = File::open(path)?;

    if !file.metadata()?.is_file() {
        return Err(io::Error::new(ErrorKind::InvalidInput, "not a regular file"));
    }

    Ok(file)
}

fn not_found(connection: &mut Connection) -> Result<Outcome, Error> {
    connection.send_status(Status::NotFound)?;
    Ok(Outcome::Responded(Status::NotFound))
}

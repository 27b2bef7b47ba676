//! A minimal embeddable HTTP/1.x server.
//!
//! Register routes on a `Routes` table, hand it to a `Server`, then either call
//! `Server::run_forever` or drive `Server::handle_once` from your own loop. Every accepted
//! connection is served by its own worker thread: one request is read, dispatched and answered,
//! then the connection is closed.

mod config;
mod connection;
mod dispatch;
mod parser;
mod protocol;
mod routes;
mod server;
mod state;
pub mod url;
mod worker;

pub use self::{
    config::ServerConfig,
    connection::Connection,
    parser::{HeaderField, ParseError, Request},
    protocol::{Method, Status, Version},
    routes::{Callback, Route, Routes},
    server::{Server, ServerError, StopHandle},
    state::ServerState,
    url::QueryParams,
};

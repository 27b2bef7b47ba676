//! Handles GET query parameters and POST form bodies, counting visits across workers.

use std::{
    io::Write,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::Error;
use clap::Parser;
use simplehttp::{url, Connection, Request, Routes, Server, ServerConfig};

const FORM: &str = "<html><body>\
    <form method='post' action='/submit'>\
    Name: <input name='name'> <input type='submit'>\
    </form>\
    <a href='/greet?name=stranger'>Greet with GET</a>\
    </body></html>";

#[derive(Parser)]
#[command(about = "Serve a form and echo what it receives")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 9192)]
    port: u16,
}

#[derive(Default)]
struct Visits {
    count: AtomicUsize,
}

fn main() -> Result<(), Error> {
    devutils::init_logging()?;
    let args = Args::parse();

    let mut routes = Routes::new();
    routes
        .page_with_headers("/", FORM, "Content-Type: text/html\r\n")
        .callback("/greet", greet)
        .callback("/submit", submit);

    let config = ServerConfig::from_env()
        .with_host(args.host)
        .with_port(args.port);
    let mut server = Server::new(config, routes, Visits::default())?;
    server.run_forever()?;

    Ok(())
}

fn greet(connection: &mut Connection, request: &Request, visits: &Visits) -> Result<(), Error> {
    let visit = visits.count.fetch_add(1, Ordering::Relaxed) + 1;
    let name = request.param("name").unwrap_or("nobody");

    connection.send_ok("Content-Type: text/plain\r\n")?;
    write!(connection, "Hello {name}, you are visitor {visit}.")?;

    Ok(())
}

fn submit(connection: &mut Connection, request: &Request, visits: &Visits) -> Result<(), Error> {
    let visit = visits.count.fetch_add(1, Ordering::Relaxed) + 1;

    // Form bodies use the same encoding as a query string
    let body = String::from_utf8_lossy(request.body());
    let fields = url::parse_query(&body, false);

    connection.send_ok("Content-Type: text/plain\r\n")?;
    writeln!(connection, "Visitor {visit} submitted {} fields:", fields.len())?;
    for (key, value) in &fields {
        writeln!(connection, "{key} = {value}")?;
    }

    Ok(())
}

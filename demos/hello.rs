//! Serves a static page, a callback page and an image file.
//!
//! Run from a directory containing `image.jpg`, then open `http://localhost:9191/`.

use anyhow::Error;
use clap::Parser;
use simplehttp::{Connection, Request, Routes, Server, ServerConfig};
use tracing::{event, Level};

const INDEX: &str = "<html><body>\
    This is a test HTML page for <i>simplehttp</i>.<br>\
    <br>Here is a JPEG Image:<br>\
    <img src='image.jpg'><br><br>\
    <a href='nextpage.html'>Next Page</a>\
    </body></html>";

#[derive(Parser)]
#[command(about = "Serve a couple of demo pages")]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = 9191)]
    port: u16,
}

fn main() -> Result<(), Error> {
    devutils::init_logging()?;
    let args = Args::parse();

    let mut routes = Routes::new();
    routes
        .page_with_headers("/", INDEX, "Content-Type: text/html\r\n")
        .callback("/nextpage.html", next_page)
        .file_with_headers("/image.jpg", "image.jpg", "Content-Type: image/jpeg\r\n");

    let config = ServerConfig::from_env().with_port(args.port);
    let mut server = Server::new(config, routes, ())?;
    server.start()?;

    if let Some(addr) = server.local_addr() {
        event!(Level::INFO, "listening ... http://localhost:{}", addr.port());
    }

    server.run_forever()?;

    Ok(())
}

fn next_page(connection: &mut Connection, _request: &Request, _: &()) -> Result<(), Error> {
    connection.send_ok("Content-Type: text/html\r\n")?;
    connection.send(
        "<html><body>\
        This is another page...<br>\
        <a href='/'>Previous Page</a>\
        </body></html>",
    )?;

    Ok(())
}

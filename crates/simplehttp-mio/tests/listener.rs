use std::{
    io::{Read, Write},
    net::TcpStream,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Error};
use simplehttp_mio::{bind, BindConfig, BindError, Poller};
use tracing_test::traced_test;

fn local_config(port: u16) -> BindConfig {
    BindConfig {
        host: "127.0.0.1".to_string(),
        port,
        max_retries: 2,
        retry_wait: Duration::from_millis(10),
        ..BindConfig::default()
    }
}

#[test]
#[traced_test]
fn bind_ephemeral_port() -> Result<(), Error> {
    let listener = bind(&local_config(0))?;

    let addr = listener.local_addr();
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);

    Ok(())
}

#[test]
#[traced_test]
fn bind_occupied_port_exhausts_retries() -> Result<(), Error> {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = occupied.local_addr()?.port();

    let result = bind(&local_config(port));

    match result {
        Err(BindError::Exhausted { attempts }) => assert_eq!(attempts, 2),
        Err(error) => panic!("unexpected error: {error}"),
        Ok(_) => panic!("bind unexpectedly succeeded on occupied port"),
    }

    Ok(())
}

#[test]
#[traced_test]
fn bind_succeeds_once_port_is_released() -> Result<(), Error> {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = occupied.local_addr()?.port();

    let config = BindConfig {
        max_retries: 5,
        retry_wait: Duration::from_millis(100),
        ..local_config(port)
    };

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        drop(occupied);
    });

    let start = Instant::now();
    let listener = bind(&config)?;
    releaser.join().ok().context("releasing thread panicked")?;

    assert_eq!(listener.local_addr().port(), port);
    assert!(start.elapsed() >= config.retry_wait);
    assert!(logs_contain("bound on retry"));

    Ok(())
}

#[test]
#[traced_test]
fn accept_without_pending_returns_none() -> Result<(), Error> {
    let listener = bind(&local_config(0))?;

    assert!(listener.accept()?.is_none());

    Ok(())
}

#[test]
#[traced_test]
fn accept_after_readiness() -> Result<(), Error> {
    let config = BindConfig {
        tcp_nodelay: true,
        ..local_config(0)
    };
    let mut listener = bind(&config)?;
    let mut poller = Poller::new()?;
    poller.register(&mut listener)?;

    let mut client = TcpStream::connect(listener.local_addr())?;

    let readiness = poller.wait(Duration::from_secs(5))?;
    assert!(readiness.readable);

    let (mut stream, peer_addr) = listener.accept()?.context("no connection pending")?;
    assert_eq!(peer_addr, client.local_addr()?);
    assert!(stream.nodelay()?);

    // Accepted streams are blocking, a plain read waits for the data
    client.write_all(b"ping")?;
    let mut buffer = [0; 4];
    stream.read_exact(&mut buffer)?;
    assert_eq!(&buffer, b"ping");

    Ok(())
}

#[test]
#[traced_test]
fn wake_interrupts_wait() -> Result<(), Error> {
    let mut poller = Poller::new()?;
    let handle = poller.wake_handle();

    let waker = std::thread::spawn(move || handle.wake());

    let readiness = poller.wait(Duration::from_secs(10))?;
    waker.join().ok().context("waker thread panicked")?;

    assert!(readiness.woken);
    assert!(!readiness.readable);

    Ok(())
}

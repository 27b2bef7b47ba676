use std::{env, str::FromStr, time::Duration};

use simplehttp_mio::BindConfig;
use tracing::{event, Level};

const ENV_HOST: &str = "SIMPLEHTTP_HOST";
const ENV_PORT: &str = "SIMPLEHTTP_PORT";
const ENV_MAX_RETRIES: &str = "SIMPLEHTTP_MAX_RETRIES";
const ENV_RETRY_WAIT_SECS: &str = "SIMPLEHTTP_RETRY_WAIT_SECS";
const ENV_TCP_NODELAY: &str = "SIMPLEHTTP_TCP_NODELAY";
const ENV_MAX_RECV_BUFFER: &str = "SIMPLEHTTP_MAX_RECV_BUFFER";

/// Server settings.
///
/// The defaults bind all IPv4 interfaces on port 80, retry binding 7 times 15 seconds apart,
/// and read requests of up to 128 KiB.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    pub max_retries: u32,
    pub retry_wait: Duration,
    pub tcp_nodelay: bool,
    pub backlog: i32,
    /// Size of the single receive per request, anything beyond is cut off.
    pub max_recv_buffer: usize,
    /// Longest wait between two accept steps of the event loop.
    pub poll_interval: Duration,
    pub read_timeout: Option<Duration>,
    pub resolve_peer_host: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 80,
            max_retries: 7,
            retry_wait: Duration::from_secs(15),
            tcp_nodelay: false,
            backlog: 1024,
            max_recv_buffer: 128 * 1024,
            poll_interval: Duration::from_millis(250),
            read_timeout: None,
            resolve_peer_host: true,
        }
    }
}

impl ServerConfig {
    /// Load the defaults, overridden by `SIMPLEHTTP_*` environment variables.
    ///
    /// Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_host: env::var(ENV_HOST).unwrap_or(defaults.bind_host),
            port: env_or(ENV_PORT, defaults.port),
            max_retries: env_or(ENV_MAX_RETRIES, defaults.max_retries),
            retry_wait: Duration::from_secs(env_or(
                ENV_RETRY_WAIT_SECS,
                defaults.retry_wait.as_secs(),
            )),
            tcp_nodelay: env_or(ENV_TCP_NODELAY, defaults.tcp_nodelay),
            max_recv_buffer: env_or(ENV_MAX_RECV_BUFFER, defaults.max_recv_buffer),
            ..defaults
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_wait: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_wait = retry_wait;
        self
    }

    pub fn with_tcp_nodelay(mut self, tcp_nodelay: bool) -> Self {
        self.tcp_nodelay = tcp_nodelay;
        self
    }

    pub fn with_max_recv_buffer(mut self, max_recv_buffer: usize) -> Self {
        self.max_recv_buffer = max_recv_buffer;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_resolve_peer_host(mut self, resolve_peer_host: bool) -> Self {
        self.resolve_peer_host = resolve_peer_host;
        self
    }

    pub(crate) fn bind_config(&self) -> BindConfig {
        BindConfig {
            host: self.bind_host.clone(),
            port: self.port,
            max_retries: self.max_retries,
            retry_wait: self.retry_wait,
            tcp_nodelay: self.tcp_nodelay,
            backlog: self.backlog,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    let Ok(value) = env::var(name) else {
        return default;
    };

    match value.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            event!(Level::WARN, name, %value, "ignoring malformed environment variable");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        env::set_var(ENV_PORT, "9191");
        env::set_var(ENV_TCP_NODELAY, "true");
        env::set_var(ENV_MAX_RETRIES, "not a number");

        let config = ServerConfig::from_env();

        env::remove_var(ENV_PORT);
        env::remove_var(ENV_TCP_NODELAY);
        env::remove_var(ENV_MAX_RETRIES);

        assert_eq!(config.port, 9191);
        assert!(config.tcp_nodelay);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.max_recv_buffer, 128 * 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn bind_config_carries_socket_settings() {
        let config = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(8080)
            .with_retries(2, Duration::from_secs(1))
            .with_tcp_nodelay(true);

        let bind = config.bind_config();

        assert_eq!(bind.host, "127.0.0.1");
        assert_eq!(bind.port, 8080);
        assert_eq!(bind.max_retries, 2);
        assert_eq!(bind.retry_wait, Duration::from_secs(1));
        assert!(bind.tcp_nodelay);
    }
}

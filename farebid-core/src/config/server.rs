use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Upper bound on the time a mutating request may take end to end.
    pub request_deadline: Duration,
    /// A push write slower than this drops the subscriber.
    pub push_write_timeout: Duration,
    /// Frames buffered per push subscriber before it counts as slow.
    pub push_buffer: usize,
}

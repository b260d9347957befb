use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::{MTU, RECV_TIMEOUT, SEGMENT_ATTEMPTS, SEND_TIMEOUT};
use crate::retry::RetryPolicy;

/// Segment size, per-segment retry and socket timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub mtu: NonZeroUsize,
    pub segment_retry: RetryPolicy,
    pub recv_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            mtu: NonZeroUsize::new(MTU).unwrap_or(NonZeroUsize::MIN),
            segment_retry: RetryPolicy::bounded(SEGMENT_ATTEMPTS),
            recv_timeout: RECV_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    /// Whole-request retry; unbounded unless configured.
    pub request_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            transport: TransportConfig::default(),
            request_retry: RetryPolicy::Forever,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory the server reads, writes and lists.
    pub root: PathBuf,
    pub transport: TransportConfig,
    /// STUN server queried at startup to log the public address.
    pub stun_server: Option<String>,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        ServerConfig {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            root: PathBuf::from("."),
            transport: TransportConfig::default(),
            stun_server: None,
        }
    }
}

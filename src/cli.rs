use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use uftp::protocol::{MTU, SEGMENT_ATTEMPTS};
use uftp::{ClientConfig, RetryPolicy, ServerConfig, TransportConfig};

#[derive(Parser, Debug)]
#[command(name = "uftp", version, about = "Reliable file transfer over UDP")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a server and read commands from stdin
    Client(ClientArgs),
    /// Serve files from a directory
    Server(ServerArgs),
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server host name or IP address
    pub server_address: String,

    /// Server port
    pub port: u16,

    /// Give up on a request after this many attempts (default: never)
    #[arg(long)]
    pub max_request_attempts: Option<u32>,

    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Port to listen on
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_ip: IpAddr,

    /// Directory to serve
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// STUN server used to log the public address at startup (e.g. stun.l.google.com:19302)
    #[arg(long)]
    pub stun: Option<String>,

    #[command(flatten)]
    pub transport: TransportArgs,
}

#[derive(Args, Debug)]
pub struct TransportArgs {
    /// Largest segment sent in one datagram
    #[arg(long, default_value_t = NonZeroUsize::new(MTU).unwrap_or(NonZeroUsize::MIN))]
    pub mtu: NonZeroUsize,

    /// Attempts per segment before a transmission fails
    #[arg(long, default_value_t = SEGMENT_ATTEMPTS)]
    pub segment_attempts: u32,

    /// How long to wait for a segment or an acknowledgment
    #[arg(long, default_value_t = 2000)]
    pub recv_timeout_ms: u64,

    /// How long a single datagram send may take
    #[arg(long, default_value_t = 2000)]
    pub send_timeout_ms: u64,
}

impl From<&TransportArgs> for TransportConfig {
    fn from(args: &TransportArgs) -> Self {
        TransportConfig {
            mtu: args.mtu,
            segment_retry: RetryPolicy::bounded(args.segment_attempts),
            recv_timeout: Duration::from_millis(args.recv_timeout_ms),
            send_timeout: Duration::from_millis(args.send_timeout_ms),
        }
    }
}

impl ClientArgs {
    pub fn server(&self) -> String {
        match self.server_address.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => SocketAddr::from((ip, self.port)).to_string(),
            _ => format!("{}:{}", self.server_address, self.port),
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            transport: (&self.transport).into(),
            request_retry: RetryPolicy::from_limit(self.max_request_attempts),
        }
    }
}

impl ServerArgs {
    pub fn config(&self) -> ServerConfig {
        ServerConfig {
            bind: SocketAddr::new(self.bind_ip, self.port),
            root: self.root.clone(),
            transport: (&self.transport).into(),
            stun_server: self.stun.clone(),
        }
    }
}

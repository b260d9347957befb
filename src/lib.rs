//! File transfer over UDP with per-segment acknowledgments and
//! at-most-once request execution.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod exchange;
pub mod frame;
pub mod fs;
pub mod protocol;
pub mod retry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::{ClientConfig, ServerConfig, TransportConfig};
pub use exchange::ExchangeError;
pub use frame::{FrameError, Header, Message};
pub use fs::{FileStore, FsError, LocalFs};
pub use protocol::{Command, StatusCode};
pub use retry::RetryPolicy;
pub use server::{Served, UftpServer};
pub use shutdown::Shutdown;
pub use transport::{Datagram, Endpoint, TransportError};

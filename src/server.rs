use std::io;
use std::net::SocketAddr;

use stunclient::StunClient;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, trace, warn};

use crate::config::{ServerConfig, TransportConfig};
use crate::dispatch::Dispatcher;
use crate::exchange::ExchangeError;
use crate::fs::{FileStore, LocalFs};
use crate::session::Session;
use crate::shutdown::Shutdown;
use crate::transport::{Datagram, Endpoint, TransportError};

/// What happened to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Served {
    pub sequence_num: u32,
    /// Answered from the session instead of being executed.
    pub replayed: bool,
    pub session_ended: bool,
}

/// Serves one client at a time from a single socket.
pub struct UftpServer<D = UdpSocket, F = LocalFs> {
    endpoint: Endpoint<D>,
    dispatcher: Dispatcher<F>,
    session: Session,
}

impl UftpServer {
    pub async fn bind(config: &ServerConfig) -> io::Result<UftpServer> {
        let socket = UdpSocket::bind(config.bind).await?;
        Ok(UftpServer::new(
            socket,
            LocalFs::new(config.root.clone()),
            config.transport,
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.socket().local_addr()
    }

    /// Asks a STUN server which address the socket is seen from outside.
    pub async fn discover_public_addr(&self, stun_server: &str) -> io::Result<SocketAddr> {
        let stun_addr = lookup_host(stun_server)
            .await?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no IPv4 address for {stun_server}"),
                )
            })?;
        StunClient::new(stun_addr)
            .query_external_address_async(self.endpoint.socket())
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, format!("STUN query failed: {err:?}")))
    }
}

impl<D: Datagram, F: FileStore> UftpServer<D, F> {
    pub fn new(socket: D, store: F, transport: TransportConfig) -> Self {
        UftpServer {
            endpoint: Endpoint::new(socket, transport),
            dispatcher: Dispatcher::new(store),
            session: Session::new(),
        }
    }

    /// Receives one request and answers it.
    ///
    /// A request carrying the sequence number that was answered last gets the
    /// stored response again; nothing is executed a second time.
    pub async fn receive_and_dispatch(&mut self) -> Result<Served, ExchangeError> {
        let request = self.endpoint.receive_message().await?;
        let sequence_num = request.sequence_num;

        if let Some(cached) = self.session.replay(sequence_num) {
            debug!(seq = sequence_num, command = %request.command, "replaying response to retransmitted request");
            let cached = cached.clone();
            self.endpoint.send_message(&cached).await?;
            return Ok(Served {
                sequence_num,
                replayed: true,
                session_ended: false,
            });
        }

        let dispatched = self.dispatcher.dispatch(&request).await;
        self.session.record(sequence_num, dispatched.response.clone());
        let sent = self.endpoint.send_message(&dispatched.response).await;

        if dispatched.end_session {
            info!(peer = ?self.endpoint.peer(), "client closed the session");
            self.session.reset();
        }
        sent?;

        Ok(Served {
            sequence_num,
            replayed: false,
            session_ended: dispatched.end_session,
        })
    }

    /// Serves requests until `shutdown` fires.
    pub async fn listen(&mut self, mut shutdown: Shutdown) {
        info!("Server is now listening");
        while !shutdown.fired() {
            tokio::select! {
                served = self.receive_and_dispatch() => match served {
                    Ok(served) => trace!(?served, "request served"),
                    // Nothing arrived within the receive timeout.
                    Err(ExchangeError::Transport(TransportError::ReceiveFailed("header"))) => {}
                    Err(err) => warn!(error = %err, "request failed"),
                },
                _ = shutdown.wait() => {}
            }
        }
        info!("Terminating server...");
    }
}

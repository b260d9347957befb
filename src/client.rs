use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use crypto_hash::{hex_digest, Algorithm};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::frame::{FrameError, Message};
use crate::fs::FileStore;
use crate::protocol::{Command, StatusCode};
use crate::retry::RetryPolicy;
use crate::transport::{Datagram, Endpoint};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request cannot be sent: {0}")]
    Frame(#[from] FrameError),
    #[error("no response from server after {attempts} attempts")]
    NoResponse { attempts: u32 },
}

/// Sends requests to one server and waits for the matching responses.
pub struct Client<D = UdpSocket> {
    endpoint: Endpoint<D>,
    sequence_num: u32,
    request_retry: RetryPolicy,
}

impl Client {
    /// Resolves `server` (`host:port`) and binds a local socket for it.
    pub async fn connect(server: &str, config: &ClientConfig) -> io::Result<Client> {
        let server_addr = lookup_host(server).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("could not resolve {server}"))
        })?;
        let local: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        debug!(server = %server_addr, local = %socket.local_addr()?, "opened socket");
        Ok(Client::new(socket, server_addr, config))
    }
}

impl<D: Datagram> Client<D> {
    pub fn new(socket: D, server: SocketAddr, config: &ClientConfig) -> Self {
        Client {
            endpoint: Endpoint::with_peer(socket, server, config.transport),
            sequence_num: 0,
            request_retry: config.request_retry,
        }
    }

    /// Sequence number the next request will carry.
    pub fn sequence_num(&self) -> u32 {
        self.sequence_num
    }

    /// Sends one request and returns the server's response to it.
    ///
    /// The whole request is sent again whenever no response arrives or the
    /// response belongs to another request.
    pub async fn send_command(
        &mut self,
        command: &str,
        argument: &str,
        payload: Vec<u8>,
    ) -> Result<Message, ClientError> {
        let request = Message::request(self.sequence_num, command, argument, payload);
        request.header()?;

        let mut attempts = 0;
        for attempt in self.request_retry.attempts() {
            attempts = attempt;
            if let Err(err) = self.endpoint.send_message(&request).await {
                debug!(seq = request.sequence_num, attempt, error = %err, "request not delivered");
                continue;
            }
            match self.endpoint.receive_message().await {
                Ok(response) if response.sequence_num == request.sequence_num => {
                    self.sequence_num = self.sequence_num.wrapping_add(1);
                    return Ok(response);
                }
                Ok(response) => debug!(
                    expected = request.sequence_num,
                    got = response.sequence_num,
                    "mismatched sequence numbers"
                ),
                Err(err) => debug!(seq = request.sequence_num, attempt, error = %err, "no response received"),
            }
        }

        // The server may have executed the request, so its number is spent.
        self.sequence_num = self.sequence_num.wrapping_add(1);
        warn!(seq = request.sequence_num, attempts, "giving up on request");
        Err(ClientError::NoResponse { attempts })
    }
}

/// Splits a line into a command and its argument; extra words are ignored.
pub fn parse_input(line: &str) -> Option<(&str, &str)> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    Some((command, words.next().unwrap_or("")))
}

/// Reads commands from `input` until `exit` or end of input.
///
/// End of input closes the session as if `exit` had been typed.
pub async fn run_interactive<D, F, R, W>(
    client: &mut Client<D>,
    local: &F,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    D: Datagram,
    F: FileStore,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, ">> ")?;
        out.flush()?;

        let (line, eof) = match lines.next_line().await? {
            Some(line) => (line, false),
            None => ("exit".to_owned(), true),
        };
        let Some((command, argument)) = parse_input(&line) else {
            continue;
        };

        let mut payload = Vec::new();
        if Command::parse(command) == Command::Put {
            match local.read_file(argument).await {
                Ok(bytes) => {
                    debug!(file = argument, sha256 = %hex_digest(Algorithm::SHA256, &bytes), "uploading");
                    payload = bytes;
                }
                Err(err) => {
                    debug!(file = argument, error = %err, "cannot read local file");
                    writeln!(out, "Unknown file: {argument}")?;
                    continue;
                }
            }
        }

        match client.send_command(command, argument, payload).await {
            Ok(response) => {
                if !handle_response(&response, local, out).await? || eof {
                    return Ok(());
                }
            }
            // Nothing more to read, so the closing `exit` is not repeated.
            Err(err) if eof => return Err(err.into()),
            Err(err) => writeln!(out, "{err}")?,
        }
    }
}

/// Shows a response to the user; returns `false` once the session is over.
pub async fn handle_response<F, W>(response: &Message, local: &F, out: &mut W) -> io::Result<bool>
where
    F: FileStore,
    W: Write,
{
    match Command::parse(&response.command) {
        Command::Exit => {
            writeln!(out, "Closing connection with server...")?;
            return Ok(false);
        }
        Command::Ls if response.status.is_ok() => {
            out.write_all(&response.payload)?;
        }
        Command::Get if response.status.is_ok() => {
            match local.write_file(&response.argument, &response.payload).await {
                Ok(()) => info!(
                    file = %response.argument,
                    len = response.payload.len(),
                    sha256 = %hex_digest(Algorithm::SHA256, &response.payload),
                    "downloaded"
                ),
                Err(err) => writeln!(out, "Could not write {}: {err}", response.argument)?,
            }
        }
        Command::Get if response.status == StatusCode::FileNotFound => {
            writeln!(out, "File not found: {}", response.argument)?;
        }
        _ if !response.status.is_ok() => {
            writeln!(out, "{}", response.status)?;
        }
        _ => {}
    }
    Ok(true)
}

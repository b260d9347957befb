//! Stop-and-wait transport over a datagram socket.
//!
//! A buffer is cut into segments of at most `mtu` bytes. Every segment is
//! answered with a single [`ACK`] byte, and the sender only moves on to the
//! next segment once that byte has arrived, so at most one segment is ever
//! unacknowledged. A segment whose transmission or acknowledgment fails is
//! sent again under the configured [`RetryPolicy`](crate::retry::RetryPolicy).
//! Receiving never retries; a missing segment fails the receive and the
//! caller decides whether to start the whole message over.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::protocol::ACK;
use crate::retry::retry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to send {0}")]
    SendFailed(&'static str),
    #[error("failed to receive {0}")]
    ReceiveFailed(&'static str),
    #[error("no peer address to send {0} to")]
    NoPeer(&'static str),
}

/// The datagram operations the transport needs from a socket.
#[async_trait]
pub trait Datagram: Send + Sync {
    async fn send_datagram(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl Datagram for UdpSocket {
    async fn send_datagram(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.send_to(buf, target).await
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }
}

/// A socket together with the peer it currently talks to.
pub struct Endpoint<D = UdpSocket> {
    socket: D,
    peer: Option<SocketAddr>,
    config: TransportConfig,
    // One byte larger than a segment so oversized datagrams are detected.
    scratch: Vec<u8>,
}

impl<D: Datagram> Endpoint<D> {
    pub fn new(socket: D, config: TransportConfig) -> Self {
        Endpoint {
            socket,
            peer: None,
            scratch: vec![0u8; config.mtu.get() + 1],
            config,
        }
    }

    pub fn with_peer(socket: D, peer: SocketAddr, config: TransportConfig) -> Self {
        let mut endpoint = Endpoint::new(socket, config);
        endpoint.peer = Some(peer);
        endpoint
    }

    pub fn socket(&self) -> &D {
        &self.socket
    }

    /// Last address a segment was received from, or the configured peer.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub async fn send(&mut self, buffer: &[u8], label: &'static str) -> Result<(), TransportError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let peer = self.peer.ok_or(TransportError::NoPeer(label))?;
        let config = self.config;
        let socket = &self.socket;
        let mtu = config.mtu.get();
        let segments = buffer.len().div_ceil(mtu);

        for (index, segment) in buffer.chunks(mtu).enumerate() {
            retry(config.segment_retry, |attempt| async move {
                let result = transmit(socket, segment, peer, &config).await;
                if let Err(err) = &result {
                    debug!(label, segment = index, attempt, error = %err, "segment attempt failed");
                }
                result
            })
            .await
            .map_err(|exhausted| {
                warn!(
                    label,
                    segment = index,
                    attempts = exhausted.attempts,
                    error = %exhausted.last,
                    "giving up on segment"
                );
                TransportError::SendFailed(label)
            })?;
            trace!(label, segment = index, segments, len = segment.len(), "segment acknowledged");
        }
        Ok(())
    }

    pub async fn receive(&mut self, length: usize, label: &'static str) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::with_capacity(length.min(self.config.mtu.get()));
        self.receive_into(&mut buffer, length, label).await?;
        Ok(buffer)
    }

    /// Appends exactly `length` received bytes to `buffer`.
    pub async fn receive_into(
        &mut self,
        buffer: &mut Vec<u8>,
        length: usize,
        label: &'static str,
    ) -> Result<(), TransportError> {
        let mtu = self.config.mtu.get();
        let mut remaining = length;

        while remaining > 0 {
            let expected = remaining.min(mtu);
            let from = match self.receive_segment(expected).await {
                Ok(from) => from,
                Err(err) => {
                    debug!(label, expected, error = %err, "segment not received");
                    return Err(TransportError::ReceiveFailed(label));
                }
            };
            self.peer = Some(from);

            if let Err(err) = self.socket.send_datagram(&[ACK], from).await {
                debug!(label, %from, error = %err, "could not acknowledge segment");
                return Err(TransportError::ReceiveFailed(label));
            }

            buffer.extend_from_slice(&self.scratch[..expected]);
            remaining -= expected;
            trace!(label, len = expected, remaining, "segment received");
        }
        Ok(())
    }

    async fn receive_segment(&mut self, expected: usize) -> io::Result<SocketAddr> {
        let (len, from) = timeout(
            self.config.recv_timeout,
            self.socket.recv_datagram(&mut self.scratch[..expected + 1]),
        )
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))??;

        if len != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected a {expected} byte segment from {from}, got {len} bytes"),
            ));
        }
        Ok(from)
    }
}

/// One attempt: send the whole segment, then wait for its acknowledgment.
async fn transmit<D: Datagram>(
    socket: &D,
    segment: &[u8],
    peer: SocketAddr,
    config: &TransportConfig,
) -> io::Result<()> {
    let sent = timeout(config.send_timeout, socket.send_datagram(segment, peer))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "send timed out"))??;
    if sent != segment.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("partial send: {sent} of {} bytes", segment.len()),
        ));
    }
    await_ack(socket, peer, config.recv_timeout).await
}

/// Waits for a one byte datagram from `peer`; anything else is dropped.
async fn await_ack<D: Datagram>(socket: &D, peer: SocketAddr, wait: Duration) -> io::Result<()> {
    let mut buf = [0u8; 16];
    timeout(wait, async {
        loop {
            let (len, from) = socket.recv_datagram(&mut buf).await?;
            if len == 1 && from == peer {
                return Ok::<(), io::Error>(());
            }
            trace!(%from, len, "ignoring datagram while waiting for acknowledgment");
        }
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no acknowledgment"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::net::Ipv4Addr;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn config(mtu: usize) -> TransportConfig {
        TransportConfig {
            mtu: NonZeroUsize::new(mtu).unwrap(),
            segment_retry: RetryPolicy::bounded(3),
            recv_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(500),
        }
    }

    fn peer() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 9))
    }

    /// Records every segment and acknowledges it immediately.
    #[derive(Default)]
    struct Recorder {
        segments: Mutex<Vec<Vec<u8>>>,
        receives: AtomicUsize,
    }

    #[async_trait]
    impl Datagram for Recorder {
        async fn send_datagram(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            self.segments.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            buf[0] = ACK;
            Ok((1, peer()))
        }
    }

    /// Every transmission fails.
    #[derive(Default)]
    struct Broken {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Datagram for Broken {
        async fn send_datagram(&self, _buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::Other, "network unreachable"))
        }

        async fn recv_datagram(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            std::future::pending().await
        }
    }

    /// Accepts only part of every segment.
    struct Stingy;

    #[async_trait]
    impl Datagram for Stingy {
        async fn send_datagram(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            Ok(buf.len() / 2)
        }

        async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            buf[0] = ACK;
            Ok((1, peer()))
        }
    }

    /// Takes every segment but loses some acknowledgments.
    struct Lossy {
        sent: Mutex<Vec<Vec<u8>>>,
        recvs: AtomicUsize,
        // Receive calls, counted from zero, whose acknowledgment never comes.
        lost: fn(usize) -> bool,
        ack_from: SocketAddr,
    }

    impl Lossy {
        fn new(lost: fn(usize) -> bool) -> Self {
            Lossy {
                sent: Mutex::new(Vec::new()),
                recvs: AtomicUsize::new(0),
                lost,
                ack_from: peer(),
            }
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Datagram for Lossy {
        async fn send_datagram(&self, buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let call = self.recvs.fetch_add(1, Ordering::SeqCst);
            if (self.lost)(call) {
                std::future::pending::<()>().await;
            }
            buf[0] = ACK;
            Ok((1, self.ack_from))
        }
    }

    fn quick(mtu: usize) -> TransportConfig {
        TransportConfig {
            recv_timeout: Duration::from_millis(100),
            ..config(mtu)
        }
    }

    #[tokio::test]
    async fn test_lost_ack_resends_same_segment() {
        let data: Vec<u8> = (0..150u8).collect();
        let mut endpoint = Endpoint::with_peer(Lossy::new(|call| call == 0), peer(), quick(100));
        endpoint.send(&data, "payload").await.unwrap();

        let sent = endpoint.socket().sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], data[..100]);
        assert_eq!(sent[1], data[..100]);
        assert_eq!(sent[2], data[100..]);
    }

    #[tokio::test]
    async fn test_never_acknowledged_segment_fails_after_three_sends() {
        let data = [7u8; 150];
        let mut endpoint = Endpoint::with_peer(Lossy::new(|_| true), peer(), quick(100));
        let result = endpoint.send(&data, "payload").await;

        assert_eq!(result, Err(TransportError::SendFailed("payload")));
        let sent = endpoint.socket().sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|segment| segment[..] == data[..100]));
    }

    #[tokio::test]
    async fn test_ack_from_another_host_is_ignored() {
        let stranger = SocketAddr::from((Ipv4Addr::LOCALHOST, 4000));
        // Every other receive answers from a stranger, the rest stay silent.
        let mut socket = Lossy::new(|call| call % 2 == 1);
        socket.ack_from = stranger;
        let mut endpoint = Endpoint::with_peer(socket, peer(), quick(100));

        let result = endpoint.send(b"hello", "command").await;
        assert_eq!(result, Err(TransportError::SendFailed("command")));
        assert_eq!(endpoint.socket().sent().len(), 3);
    }

    #[tokio::test]
    async fn test_segment_count_and_sizes() {
        let mtu = 100;
        for k in [0usize, 1, 2, 5] {
            for r in [0usize, 1, 37, 99] {
                let len = k * mtu + r;
                let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let mut endpoint = Endpoint::with_peer(Recorder::default(), peer(), config(mtu));
                endpoint.send(&data, "payload").await.unwrap();

                let segments = endpoint.socket().segments.lock().unwrap().clone();
                assert_eq!(segments.len(), k + usize::from(r > 0), "k={k} r={r}");
                assert!(segments.iter().all(|s| !s.is_empty() && s.len() <= mtu));
                assert_eq!(segments.concat(), data);
            }
        }
    }

    #[tokio::test]
    async fn test_empty_buffer_needs_no_io() {
        let mut endpoint = Endpoint::new(Recorder::default(), config(100));
        // No peer is needed when there is nothing to send.
        endpoint.send(&[], "command").await.unwrap();
        assert!(endpoint.receive(0, "command").await.unwrap().is_empty());
        assert!(endpoint.socket().segments.lock().unwrap().is_empty());
        assert_eq!(endpoint.socket().receives.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_always_failing_send_stops_after_retry_bound() {
        let mut endpoint = Endpoint::with_peer(Broken::default(), peer(), config(100));
        let result = endpoint.send(&[1u8; 250], "payload").await;
        assert_eq!(result, Err(TransportError::SendFailed("payload")));
        assert_eq!(endpoint.socket().sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_partial_send_is_a_failed_attempt() {
        let mut endpoint = Endpoint::with_peer(Stingy, peer(), config(100));
        let result = endpoint.send(&[1u8; 10], "header").await;
        assert_eq!(result, Err(TransportError::SendFailed("header")));
    }

    #[tokio::test]
    async fn test_send_without_peer() {
        let mut endpoint = Endpoint::new(Recorder::default(), config(100));
        assert_eq!(
            endpoint.send(b"abc", "header").await,
            Err(TransportError::NoPeer("header"))
        );
    }

    async fn socket_pair(mtu: usize) -> (Endpoint, Endpoint) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();
        (
            Endpoint::with_peer(a, b_addr, config(mtu)),
            Endpoint::new(b, config(mtu)),
        )
    }

    #[tokio::test]
    async fn test_reassembly_over_udp() {
        let mtu = 512;
        for k in [0usize, 1, 2, 5] {
            let len = k * mtu + 123;
            let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
            let (mut sender, mut receiver) = socket_pair(mtu).await;

            let (sent, received) = tokio::join!(
                sender.send(&data, "payload"),
                receiver.receive(len, "payload")
            );
            sent.unwrap();
            assert_eq!(received.unwrap(), data);
            assert_eq!(
                receiver.peer(),
                Some(sender.socket().local_addr().unwrap())
            );
        }
    }

    #[tokio::test]
    async fn test_short_segment_fails_receive() {
        let (sender, mut receiver) = socket_pair(512).await;
        let target = sender.peer().unwrap();
        sender.socket().send_to(b"tiny", target).await.unwrap();

        let result = receiver.receive(10, "command").await;
        assert_eq!(result, Err(TransportError::ReceiveFailed("command")));
    }

    #[tokio::test]
    async fn test_oversized_segment_fails_receive() {
        let (sender, mut receiver) = socket_pair(512).await;
        let target = sender.peer().unwrap();
        sender.socket().send_to(&[0u8; 40], target).await.unwrap();

        let result = receiver.receive(24, "header").await;
        assert_eq!(result, Err(TransportError::ReceiveFailed("header")));
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let (_sender, mut receiver) = socket_pair(512).await;
        let result = receiver.receive(24, "header").await;
        assert_eq!(result, Err(TransportError::ReceiveFailed("header")));
    }
}

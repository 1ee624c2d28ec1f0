//! Bound UDP socket adapter used by both the SIP signalling engine and the
//! RTP media engine.
//!
//! This crate deliberately knows nothing about SIP or RTP framing: it hands
//! back raw datagrams and lets the caller decide what they mean. Two access
//! patterns are supported on the same socket:
//!
//! - [`UdpEndpoint::recv_timeout`] — a single timed receive, used by workers
//!   that poll in a loop and need to observe a cancellation flag between
//!   attempts.
//! - [`UdpEndpoint::drain`] — best-effort non-blocking flush of whatever is
//!   currently queued, used before starting a new SIP transaction so a stale
//!   response from a previous one can't be mistaken for the new one.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

/// Errors surfaced by the UDP adapter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("UDP send failed: {0}")]
    Send(#[source] io::Error),

    #[error("UDP receive failed: {0}")]
    Recv(#[source] io::Error),

    #[error("socket closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a single timed receive.
pub enum RecvOutcome {
    /// A datagram arrived.
    Datagram { data: Vec<u8>, from: SocketAddr },
    /// No datagram arrived before the timeout elapsed.
    Timeout,
    /// The socket was closed from another task; the caller should exit.
    Closed,
}

/// A bound UDP socket with timed-receive and drain helpers.
///
/// Cloning is cheap: the underlying socket is shared via `Arc`, and `close`
/// is the mechanism that unblocks any task currently parked in
/// `recv_timeout` — closing drops the socket, which turns the next poll on
/// a clone into an error that `recv_timeout` maps to `RecvOutcome::Closed`.
#[derive(Clone)]
pub struct UdpEndpoint {
    socket: Arc<UdpSocket>,
    closed: Arc<AtomicBool>,
}

impl UdpEndpoint {
    /// Binds a new UDP socket on `addr` (use port 0 to let the OS choose).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        debug!(local = %socket.local_addr().unwrap_or(addr), "bound UDP endpoint");
        Ok(Self {
            socket: Arc::new(socket),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Recv)
    }

    /// Sends a single datagram. Fails immediately if the endpoint is closed.
    pub async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.socket
            .send_to(buf, dest)
            .await
            .map(|_| ())
            .map_err(Error::Send)
    }

    /// Waits up to `timeout` for a single datagram.
    pub async fn recv_timeout(&self, timeout: Duration, buf_size: usize) -> RecvOutcome {
        if self.is_closed() {
            return RecvOutcome::Closed;
        }
        let mut buf = vec![0u8; buf_size];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                buf.truncate(n);
                RecvOutcome::Datagram { data: buf, from }
            }
            Ok(Err(e)) => {
                if self.is_closed() {
                    RecvOutcome::Closed
                } else {
                    warn!(error = %e, "UDP recv error");
                    RecvOutcome::Timeout
                }
            }
            Err(_elapsed) => {
                if self.is_closed() {
                    RecvOutcome::Closed
                } else {
                    RecvOutcome::Timeout
                }
            }
        }
    }

    /// Drains every datagram currently queued on the socket without blocking.
    /// Used to flush stale responses before starting a fresh transaction.
    pub fn drain(&self) {
        let mut buf = [0u8; 2048];
        let mut drained = 0;
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(n) => {
                    drained += 1;
                    trace!(bytes = n, "drained stale datagram");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        if drained > 0 {
            debug!(count = drained, "drained pending datagrams before new transaction");
        }
    }

    /// Marks the endpoint closed. Any task blocked in `recv_timeout` observes
    /// this on its next poll and returns `RecvOutcome::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let a = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        a.send_to(b"hello", b_addr).await.unwrap();

        match b.recv_timeout(Duration::from_millis(500), 2048).await {
            RecvOutcome::Datagram { data, .. } => assert_eq!(&data, b"hello"),
            _ => panic!("expected a datagram"),
        }
    }

    #[tokio::test]
    async fn recv_timeout_without_data() {
        let a = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        match a.recv_timeout(Duration::from_millis(50), 2048).await {
            RecvOutcome::Timeout => {}
            _ => panic!("expected a timeout"),
        }
    }

    #[tokio::test]
    async fn close_unblocks_pending_receivers() {
        let a = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        a.close();
        match a.recv_timeout(Duration::from_millis(500), 2048).await {
            RecvOutcome::Closed => {}
            _ => panic!("expected Closed"),
        }
    }
}

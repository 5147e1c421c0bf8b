use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// The datagram operations a transfer needs. Implemented for [`UdpSocket`].
#[async_trait]
pub trait Datagram: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl Datagram for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

/// Sends one datagram, retrying failed send calls immediately.
///
/// Only the send itself is retried; waiting for a reply is up to the caller.
pub async fn send_with_retry<D: Datagram + ?Sized>(
    socket: &D,
    bytes: &[u8],
    dest: SocketAddr,
    max_attempts: u8,
) -> Result<()> {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match socket.send_to(bytes, dest).await {
            Ok(_) => {
                debug!("sent {} bytes to {dest}", bytes.len());
                return Ok(());
            }
            Err(e) => warn!("send to {dest} failed ({e}), attempt {attempt}/{max_attempts}"),
        }
    }
    Err(Error::TransportExhausted {
        attempts: max_attempts,
    })
}

/// One bounded receive. `Ok(None)` means the wait timed out.
pub async fn recv_timeout<D: Datagram + ?Sized>(
    socket: &D,
    buf: &mut [u8],
    duration: Duration,
) -> io::Result<Option<(usize, SocketAddr)>> {
    match timeout(duration, socket.recv_from(buf)).await {
        Ok(res) => res.map(Some),
        Err(_) => Ok(None),
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedSocket;
    use super::*;

    fn dest() -> SocketAddr {
        "127.0.0.1:1069".parse().unwrap()
    }

    #[tokio::test]
    async fn send_succeeds_after_failures() {
        let socket = ScriptedSocket::new().failing_sends(4);
        send_with_retry(&socket, b"hi", dest(), 5).await.unwrap();
        assert_eq!(socket.send_calls(), 5);
        assert_eq!(socket.sent(), vec![(b"hi".to_vec(), dest())]);
    }

    #[tokio::test]
    async fn send_gives_up_at_bound() {
        let socket = ScriptedSocket::new().failing_sends(10);
        let err = send_with_retry(&socket, b"hi", dest(), 5).await.unwrap_err();
        assert!(matches!(err, Error::TransportExhausted { attempts: 5 }));
        assert_eq!(socket.send_calls(), 5);
        assert!(socket.sent().is_empty());
    }

    #[tokio::test]
    async fn recv_times_out() {
        let socket = ScriptedSocket::new().silence();
        let mut buf = [0u8; 16];
        let res = recv_timeout(&socket, &mut buf, Duration::from_millis(5))
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn recv_returns_datagram() {
        let socket = ScriptedSocket::new().reply(vec![1, 2, 3], dest());
        let mut buf = [0u8; 16];
        let res = recv_timeout(&socket, &mut buf, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(res, Some((3, dest())));
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}

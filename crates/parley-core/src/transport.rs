//! Datagram socket abstraction.
//!
//! The client runtime and relay server are generic over [`DatagramSocket`]
//! so the same driver code runs on a real `tokio` UDP socket in production
//! and on a simulated socket under turmoil.

use std::{io, net::SocketAddr};

use async_trait::async_trait;

/// Unreliable, unordered datagram socket.
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    /// Send one datagram to `target`.
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram. Excess bytes beyond `buf` are discarded.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Address this socket is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl DatagramSocket for tokio::net::UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        Self::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        Self::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Self::local_addr(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_once<S: DatagramSocket>(server: &S) -> io::Result<()> {
        let mut buf = [0u8; 64];
        let (len, from) = server.recv_from(&mut buf).await?;
        server.send_to(&buf[..len], from).await?;
        Ok(())
    }

    #[tokio::test]
    async fn tokio_socket_roundtrip() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = DatagramSocket::local_addr(&server).unwrap();

        DatagramSocket::send_to(&client, b"ping", server_addr).await.unwrap();
        echo_once(&server).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = DatagramSocket::recv_from(&client, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, server_addr);
    }
}

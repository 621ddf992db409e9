//! Turmoil UDP socket.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use parley_core::DatagramSocket;

/// [`DatagramSocket`] on turmoil's simulated network.
pub struct SimSocket {
    inner: turmoil::net::UdpSocket,
}

impl SimSocket {
    /// Bind on the current simulated host.
    ///
    /// # Errors
    ///
    /// Returns error if the port is taken.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let inner = turmoil::net::UdpSocket::bind(addr).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl DatagramSocket for SimSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

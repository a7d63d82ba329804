/// The multicast socket and the seam the manager opens it through.
/// `UdpTransportFactory` builds the real socket with socket2; tests supply an
/// in-memory factory so failures can be injected without a network.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::config::MulticastConfig;
use crate::error::TransportError;
use crate::interfaces;

/// A bound socket that has joined the motor group.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, payload: &[u8], target: SocketAddrV4) -> io::Result<usize>;

    /// Receive one datagram into `buf`, returning its length.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens a fresh transport for each start attempt. A handle that failed is
/// never reused.
pub trait TransportFactory: Send + Sync {
    fn open(
        &self,
        interface: Ipv4Addr,
        config: &MulticastConfig,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

pub struct UdpTransport {
    socket: UdpSocket,
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, payload: &[u8], target: SocketAddrV4) -> io::Result<usize> {
        self.socket.send_to(payload, target).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, from) = self.socket.recv_from(buf).await?;
        trace!(len, from = %from, "Datagram received");
        Ok(len)
    }
}

/// Real multicast sockets. Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransportFactory;

impl TransportFactory for UdpTransportFactory {
    fn open(
        &self,
        interface: Ipv4Addr,
        config: &MulticastConfig,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let candidate =
            interfaces::find_by_address(interface).ok_or(TransportError::UnknownInterface(interface))?;

        let std_socket =
            create_multicast_socket(interface, config).map_err(TransportError::Setup)?;
        let socket = UdpSocket::from_std(std_socket).map_err(TransportError::Setup)?;

        debug!(
            interface = %candidate.name,
            addr = %interface,
            group = %config.group,
            port = config.bind_port,
            "Multicast socket joined group"
        );

        Ok(Arc::new(UdpTransport { socket }))
    }
}

/// Create a socket bound to the group port, joined on `interface`, with
/// loopback off so our own requests are not read back.
fn create_multicast_socket(
    interface: Ipv4Addr,
    config: &MulticastConfig,
) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    #[cfg(any(target_os = "macos", target_os = "freebsd"))]
    socket.set_reuse_port(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.bind_port);
    socket.bind(&addr.into())?;

    socket.set_broadcast(true)?;
    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_multicast_if_v4(&interface)?;
    socket.join_multicast_v4(&config.group, &interface)?;
    socket.set_multicast_loop_v4(false)?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

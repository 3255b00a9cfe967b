//! UDP socket setup shared by the client and the server workers.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// OS receive buffer size. One stop-and-wait transfer never has more than a
/// few frames queued, so this stays small.
pub const UDP_RECV_BUFFER: usize = 256 * 1024;

/// Create a blocking UDP socket bound to `addr` with a read timeout.
///
/// The timeout is what lets receive loops count retries and notice shutdown.
pub fn bind_udp(addr: SocketAddr, read_timeout: Duration) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(false)?;
    socket.set_recv_buffer_size(UDP_RECV_BUFFER)?;
    socket.set_read_timeout(Some(read_timeout))?;
    socket.bind(&addr.into())?;

    Ok(socket.into())
}

/// Bind a fresh socket on an OS-chosen port, on the same IP family as `peer`.
///
/// The server gives every transfer one of these so its public port stays free.
pub fn bind_ephemeral(local_ip: IpAddr, peer: SocketAddr, read_timeout: Duration) -> io::Result<UdpSocket> {
    let ip = match (local_ip, peer) {
        (IpAddr::V4(_), SocketAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        (IpAddr::V6(_), SocketAddr::V4(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        (ip, _) => ip,
    };
    bind_udp(SocketAddr::new(ip, 0), read_timeout)
}

/// Client socket able to reach `server`.
pub fn bind_client(server: SocketAddr, read_timeout: Duration) -> io::Result<UdpSocket> {
    let ip = match server {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    bind_udp(SocketAddr::new(ip, 0), read_timeout)
}

/// Whether a receive error is just the read timeout expiring.
///
/// Windows returns TimedOut, Unix returns WouldBlock.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

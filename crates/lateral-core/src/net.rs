//! Local host address resolution.

use std::io;
use std::net::{IpAddr, SocketAddrV4, UdpSocket};

/// Address of the interface the OS would use to reach `group`.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick a
/// route and a source address, which we then read back.
pub fn local_host_address(group: SocketAddrV4) -> io::Result<IpAddr> {
    let probe = UdpSocket::bind("0.0.0.0:0")?;
    probe.connect(group)?;
    let addr = probe.local_addr()?.ip();
    if addr.is_unspecified() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no route to discovery group",
        ));
    }
    Ok(addr)
}

use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::sync::Arc;
use std::{io, mem};

use async_trait::async_trait;
use log::{debug, trace};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::packet::{ProbeKind, ProbePacket};
use crate::transmit::PacketTransmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawSocketProtocol {
    Igmp,
    Icmpv6,
}

impl RawSocketProtocol {
    pub fn for_probe(kind: ProbeKind) -> RawSocketProtocol {
        match kind {
            ProbeKind::Igmp => RawSocketProtocol::Igmp,
            ProbeKind::Icmpv6EchoRequest => RawSocketProtocol::Icmpv6,
        }
    }

    fn domain(&self) -> libc::c_int {
        match self {
            RawSocketProtocol::Igmp => libc::AF_INET,
            RawSocketProtocol::Icmpv6 => libc::AF_INET6,
        }
    }

    fn protocol(&self) -> libc::c_int {
        match self {
            RawSocketProtocol::Igmp => libc::IPPROTO_IGMP,
            RawSocketProtocol::Icmpv6 => libc::IPPROTO_ICMPV6,
        }
    }
}

/// Raw IP socket. The kernel builds the IP header and, for ICMPv6, the
/// checksum; writes carry only the transport payload.
#[derive(Debug)]
pub struct RawSocketHandle {
    protocol: RawSocketProtocol,
    lower: libc::c_int,
}

impl AsRawFd for RawSocketHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl IntoRawFd for RawSocketHandle {
    fn into_raw_fd(self) -> RawFd {
        let fd = self.lower;
        mem::forget(self);
        fd
    }
}

impl RawSocketHandle {
    pub fn new(protocol: RawSocketProtocol) -> io::Result<RawSocketHandle> {
        let lower = unsafe {
            let lower = libc::socket(
                protocol.domain(),
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol.protocol(),
            );
            if lower == -1 {
                return Err(io::Error::last_os_error());
            }
            lower
        };

        Ok(RawSocketHandle { protocol, lower })
    }

    pub fn protocol(&self) -> RawSocketProtocol {
        self.protocol
    }

    /// Applies the TTL or hop limit to both unicast and multicast sends.
    pub fn set_hop_limit(&self, hop_limit: u8) -> io::Result<()> {
        let value = hop_limit as libc::c_int;
        let options = match self.protocol {
            RawSocketProtocol::Igmp => [
                (libc::IPPROTO_IP, libc::IP_TTL),
                (libc::IPPROTO_IP, libc::IP_MULTICAST_TTL),
            ],
            RawSocketProtocol::Icmpv6 => [
                (libc::IPPROTO_IPV6, libc::IPV6_UNICAST_HOPS),
                (libc::IPPROTO_IPV6, libc::IPV6_MULTICAST_HOPS),
            ],
        };

        for (level, name) in options {
            unsafe {
                let res = libc::setsockopt(
                    self.lower,
                    level,
                    name,
                    &value as *const libc::c_int as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
                if res == -1 {
                    return Err(io::Error::last_os_error());
                }
            }
        }
        Ok(())
    }
}

impl Drop for RawSocketHandle {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.lower);
        }
    }
}

/// Sends probes through one raw socket per protocol, opened on first use.
#[derive(Default)]
pub struct RawSocketTransmitter {
    sockets: Mutex<HashMap<RawSocketProtocol, Arc<UdpSocket>>>,
}

impl RawSocketTransmitter {
    pub fn new() -> RawSocketTransmitter {
        RawSocketTransmitter::default()
    }

    async fn socket_for(&self, packet: &ProbePacket) -> Result<Arc<UdpSocket>> {
        let protocol = RawSocketProtocol::for_probe(packet.kind());
        let mut sockets = self.sockets.lock().await;
        if let Some(socket) = sockets.get(&protocol) {
            return Ok(socket.clone());
        }

        let handle = RawSocketHandle::new(protocol)?;
        handle.set_hop_limit(packet.hop_limit())?;
        let socket = unsafe { std::net::UdpSocket::from_raw_fd(handle.into_raw_fd()) };
        let socket: Arc<UdpSocket> = Arc::new(socket.try_into()?);
        debug!(
            "opened raw {:?} socket with hop limit {}",
            protocol,
            packet.hop_limit()
        );
        sockets.insert(protocol, socket.clone());
        Ok(socket)
    }
}

#[async_trait]
impl PacketTransmitter for RawSocketTransmitter {
    async fn transmit(&self, packet: &ProbePacket) -> Result<usize> {
        let socket = self.socket_for(packet).await?;
        let target = SocketAddr::new(packet.destination(), 0);
        let size = socket.send_to(packet.payload(), target).await?;
        trace!("sent {} bytes of {} to {}", size, packet.kind(), target);
        Ok(size)
    }
}

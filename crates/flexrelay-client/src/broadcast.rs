//! Local rebroadcaster: re-emits recovered discovery packets as UDP
//! broadcasts so SmartSDR on this segment sees the radio natively.

use flexrelay_core::error::{Result, TransportError};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, info};

pub struct Rebroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Rebroadcaster {
    /// Opens the broadcast socket. SO_BROADCAST is required for the
    /// 255.255.255.255 default; SO_REUSEADDR lets the client share the
    /// discovery port with a local SmartSDR instance.
    pub fn new(broadcast_address: &str, port: u16) -> Result<Self> {
        let ip: IpAddr = broadcast_address.parse().map_err(|e| {
            TransportError::bind_failed(
                broadcast_address,
                format!("invalid broadcast address: {e}"),
            )
        })?;
        let target = SocketAddr::new(ip, port);

        let bind_addr: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };

        let open = || -> std::io::Result<UdpSocket> {
            let socket =
                Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_broadcast(true)?;
            socket.set_reuse_address(true)?;
            socket.set_nonblocking(true)?;
            socket.bind(&bind_addr.into())?;
            UdpSocket::from_std(socket.into())
        };

        let socket = open()
            .map_err(|e| TransportError::bind_failed(bind_addr.to_string(), e.to_string()))?;

        info!(target = %target, "Rebroadcast socket ready");
        Ok(Self { socket, target })
    }

    /// Broadcasts one packet verbatim.
    pub async fn send(&self, packet: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(packet, self.target).await?;
        debug!(target = %self.target, size = sent, "Packet rebroadcast");
        Ok(())
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

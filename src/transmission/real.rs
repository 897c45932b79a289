use bytes::{BufMut, Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket as TokioUdpSocket;
use tokio::time::Instant;

use super::RadioLike;
use crate::constants::MAX_FRAME_SIZE;
use crate::error::{LinkError, LinkResult};

/// An auto-acknowledged radio pipe emulated over UDP.
///
/// Every payload travels as `address ++ pid ++ payload`, where `pid` is a
/// one byte packet id that changes with every `send`. The peer acknowledges
/// by echoing `address ++ pid`. Unacknowledged payloads are retransmitted
/// with the same pid every `retransmit_delay` until the caller's timeout runs
/// out, and each silent transmission counts as a lost packet. The peer drops
/// repeated pids, so a late ack never duplicates a payload.
pub struct UdpRadio {
    socket: TokioUdpSocket,
    peer: SocketAddr,
    address: Bytes,
    retransmit_delay: Duration,
    pid: u8,
    pending: Option<Bytes>,
    lost: u8,
    powered: bool,
}

impl UdpRadio {
    pub async fn bind(
        local: SocketAddr,
        peer: SocketAddr,
        address: &str,
        retransmit_delay: Duration,
    ) -> std::io::Result<Self> {
        let domain = match local {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;

        socket.bind(&local.into())?;
        let tokio_socket = TokioUdpSocket::from_std(socket.into())?;

        Ok(Self {
            socket: tokio_socket,
            peer,
            address: Bytes::copy_from_slice(address.as_bytes()),
            retransmit_delay,
            pid: 0,
            pending: None,
            lost: 0,
            powered: true,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    // Acks for earlier pids are still in flight after a retransmission.
    fn is_ack(&self, from: SocketAddr, data: &[u8]) -> bool {
        from == self.peer && data.strip_prefix(self.address.as_ref()) == Some(&[self.pid][..])
    }
}

#[async_trait::async_trait]
impl RadioLike for UdpRadio {
    async fn reset_lost_counter(&mut self) -> LinkResult<()> {
        self.lost = 0;
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> LinkResult<()> {
        if !self.powered {
            return Err(LinkError::Hardware("radio is powered down".into()));
        }
        if payload.len() > MAX_FRAME_SIZE {
            return Err(LinkError::Hardware(format!(
                "payload of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
                payload.len()
            )));
        }

        self.pid = self.pid.wrapping_add(1);
        let mut datagram = BytesMut::with_capacity(self.address.len() + 1 + payload.len());
        datagram.put_slice(&self.address);
        datagram.put_u8(self.pid);
        datagram.put_slice(payload);
        let datagram = datagram.freeze();

        self.socket.send_to(&datagram, self.peer).await?;
        self.pending = Some(datagram);
        Ok(())
    }

    async fn wait_until_sent(&mut self, timeout: Duration) -> LinkResult<()> {
        let Some(datagram) = self.pending.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 64];
        loop {
            let retransmit_at = (Instant::now() + self.retransmit_delay).min(deadline);
            match tokio::time::timeout_at(retransmit_at, self.socket.recv_from(&mut buffer)).await
            {
                Ok(Ok((length, from))) => {
                    if self.is_ack(from, &buffer[..length]) {
                        return Ok(());
                    }
                    log::trace!("Ignoring stale or stray datagram from {from}");
                }
                // ICMP unreachable from a peer that is not up yet.
                Ok(Err(err)) if err.kind() == ErrorKind::ConnectionRefused => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {
                    self.lost = self.lost.saturating_add(1);
                    if Instant::now() >= deadline {
                        return Err(LinkError::Timeout(timeout));
                    }
                    self.socket.send_to(&datagram, self.peer).await?;
                }
            }
        }
    }

    async fn packets_lost(&mut self) -> LinkResult<u8> {
        Ok(self.lost)
    }

    async fn power_down(&mut self) -> LinkResult<()> {
        self.powered = false;
        self.pending = None;
        Ok(())
    }
}

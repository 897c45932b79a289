use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use crate::constants::MAX_FRAME_SIZE;
use crate::rtcm::RtcmFramer;

/// What `RadioSink::receive` did with one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A new payload, acknowledged and appended to the reassembly buffer.
    Frame { pid: u8, len: usize },
    /// A retransmission of the previous payload, acknowledged again and dropped.
    Duplicate { pid: u8 },
    /// Addressed to another pipe.
    OtherPipe,
    /// No packet id, or an empty or oversized payload. Never acknowledged.
    Malformed { len: usize },
}

/// Receiving end of a [`UdpRadio`](super::real::UdpRadio) pipe.
///
/// Acknowledges `address ++ pid ++ payload` datagrams for its own address,
/// drops repeated pids and reassembles RTCM messages from the payloads in
/// arrival order.
pub struct RadioSink {
    socket: UdpSocket,
    address: Bytes,
    last_pid: Option<u8>,
    framer: RtcmFramer,
}

impl RadioSink {
    pub async fn bind(local: SocketAddr, address: &str) -> std::io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(local).await?,
            address: Bytes::copy_from_slice(address.as_bytes()),
            last_pid: None,
            framer: RtcmFramer::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn framer(&self) -> &RtcmFramer {
        &self.framer
    }

    /// Handles exactly one datagram. Completed messages are then available
    /// from `next_message`.
    pub async fn receive(&mut self) -> std::io::Result<Received> {
        let mut buffer = [0u8; 256];
        let (length, from) = self.socket.recv_from(&mut buffer).await?;
        let datagram = &buffer[..length];

        let received = self.accept(datagram);
        match received {
            Received::Frame { .. } | Received::Duplicate { .. } => {
                let ack = &datagram[..self.address.len() + 1];
                self.socket.send_to(ack, from).await?;
            }
            Received::OtherPipe => {
                log::debug!("Ignoring {length} bytes from {from} for another pipe");
            }
            Received::Malformed { len } => {
                log::warn!("Ignoring malformed frame of {len} bytes from {from}");
            }
        }
        Ok(received)
    }

    pub fn next_message(&mut self) -> Option<Bytes> {
        self.framer.next_frame()
    }

    fn accept(&mut self, datagram: &[u8]) -> Received {
        let Some(rest) = datagram.strip_prefix(self.address.as_ref()) else {
            return Received::OtherPipe;
        };
        let Some((&pid, payload)) = rest.split_first() else {
            return Received::Malformed { len: 0 };
        };
        if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
            return Received::Malformed { len: payload.len() };
        }
        if self.last_pid == Some(pid) {
            log::debug!("Packet {pid} repeated, acknowledging again");
            return Received::Duplicate { pid };
        }

        log::trace!("Frame {pid}: {}", hex::encode(payload));
        self.last_pid = Some(pid);
        self.framer.extend(payload);
        Received::Frame {
            pid,
            len: payload.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::split;
    use crate::rtcm::encode_frame;
    use crate::transmission::RadioLike;
    use crate::transmission::real::UdpRadio;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    async fn sink() -> std::io::Result<(RadioSink, SocketAddr)> {
        let sink = RadioSink::bind("127.0.0.1:0".parse().unwrap(), "NTRIP").await?;
        let addr = sink.local_addr()?;
        Ok((sink, addr))
    }

    fn datagram(pid: u8, payload: &[u8]) -> Vec<u8> {
        let mut datagram = b"NTRIP".to_vec();
        datagram.push(pid);
        datagram.extend_from_slice(payload);
        datagram
    }

    async fn ack(peer: &UdpSocket) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
        Ok(buf[..len].to_vec())
    }

    #[tokio::test]
    async fn test_acks_and_reassembles() -> std::io::Result<()> {
        let (mut sink, sink_addr) = sink().await?;
        let peer = UdpSocket::bind("127.0.0.1:0").await?;
        let message = encode_frame(&[0x3E, 0xD0, 1, 2, 3, 4, 5, 6, 7, 8]);

        for (pid, piece) in message.chunks(8).enumerate() {
            let pid = pid as u8 + 1;
            peer.send_to(&datagram(pid, piece), sink_addr).await?;
            assert_eq!(
                sink.receive().await?,
                Received::Frame {
                    pid,
                    len: piece.len()
                }
            );
            assert_eq!(ack(&peer).await?, datagram(pid, &[]));
        }

        assert_eq!(sink.next_message(), Some(message));
        assert_eq!(sink.next_message(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_pid_is_acked_but_not_appended() -> std::io::Result<()> {
        let (mut sink, sink_addr) = sink().await?;
        let peer = UdpSocket::bind("127.0.0.1:0").await?;

        for _ in 0..2 {
            peer.send_to(&datagram(7, b"\xD3\x00\x0A"), sink_addr).await?;
        }
        assert_eq!(sink.receive().await?, Received::Frame { pid: 7, len: 3 });
        assert_eq!(sink.receive().await?, Received::Duplicate { pid: 7 });
        assert_eq!(ack(&peer).await?, datagram(7, &[]));
        assert_eq!(ack(&peer).await?, datagram(7, &[]));
        assert_eq!(sink.framer().buffered(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_datagrams_are_not_acked() -> std::io::Result<()> {
        let (mut sink, sink_addr) = sink().await?;
        let peer = UdpSocket::bind("127.0.0.1:0").await?;

        peer.send_to(b"OTHER\x01payload", sink_addr).await?;
        peer.send_to(b"NTRIP", sink_addr).await?;
        peer.send_to(&datagram(1, &[]), sink_addr).await?;
        peer.send_to(&datagram(1, &[0u8; MAX_FRAME_SIZE + 1]), sink_addr).await?;
        peer.send_to(&datagram(2, b"ok"), sink_addr).await?;

        assert_eq!(sink.receive().await?, Received::OtherPipe);
        assert_eq!(sink.receive().await?, Received::Malformed { len: 0 });
        assert_eq!(sink.receive().await?, Received::Malformed { len: 0 });
        assert_eq!(
            sink.receive().await?,
            Received::Malformed {
                len: MAX_FRAME_SIZE + 1
            }
        );
        assert_eq!(sink.receive().await?, Received::Frame { pid: 2, len: 2 });

        // The first ack the peer sees belongs to the only valid frame.
        assert_eq!(ack(&peer).await?, datagram(2, &[]));
        assert_eq!(sink.framer().buffered(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_radio_to_sink_rebuilds_rtcm() -> anyhow::Result<()> {
        let (mut sink, sink_addr) = sink().await?;
        let messages = vec![
            encode_frame(&(0..100).map(|i| i as u8).collect::<Vec<_>>()),
            encode_frame(&[0x3E, 0xD0, 0xAA]),
        ];

        let sink_task = tokio::spawn(async move {
            let mut rebuilt = vec![];
            while rebuilt.len() < 2 {
                sink.receive().await.unwrap();
                while let Some(message) = sink.next_message() {
                    rebuilt.push(message);
                }
            }
            rebuilt
        });

        let mut radio = UdpRadio::bind(
            "127.0.0.1:0".parse().unwrap(),
            sink_addr,
            "NTRIP",
            Duration::from_millis(20),
        )
        .await?;
        for message in &messages {
            for frame in split(message, NonZeroUsize::new(32).unwrap()) {
                radio.reset_lost_counter().await?;
                radio.send(&frame).await?;
                radio.wait_until_sent(Duration::from_secs(2)).await?;
            }
        }

        assert_eq!(sink_task.await.unwrap(), messages);
        Ok(())
    }
}

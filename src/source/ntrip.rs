use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{MessageSource, NextMessage};
use crate::config::NtripConfig;
use crate::constants::NTRIP_USER_AGENT;
use crate::error::{SourceError, SourceResult};
use crate::rtcm::RtcmFramer;

const MAX_RESPONSE_HEADER: usize = 8192;
const READ_CHUNK: usize = 4096;

/// An NTRIP v1 client streaming RTCM from one caster mountpoint.
pub struct NtripClient {
    stream: Option<TcpStream>,
    framer: RtcmFramer,
    read_buffer: Vec<u8>,
}

fn build_request(config: &NtripConfig) -> String {
    let mut request = format!(
        "GET /{} HTTP/1.0\r\nUser-Agent: {}\r\n",
        config.mountpoint, NTRIP_USER_AGENT
    );
    if let Some(username) = &config.username {
        let password = config.password.as_deref().unwrap_or_default();
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        request.push_str(&format!("Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");
    request
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl NtripClient {
    pub async fn connect(config: &NtripConfig) -> SourceResult<Self> {
        log::info!(
            "Connecting to NTRIP caster {}:{} ...",
            config.host,
            config.port
        );
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream.set_nodelay(true)?;

        let mut client = Self {
            stream: Some(stream),
            framer: RtcmFramer::new(),
            read_buffer: vec![0u8; READ_CHUNK],
        };
        client.handshake(config).await?;
        log::info!("Streaming RTCM from mountpoint {}", config.mountpoint);
        Ok(client)
    }

    async fn handshake(&mut self, config: &NtripConfig) -> SourceResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SourceError::Protocol("connection already closed".into()))?;

        stream.write_all(build_request(config).as_bytes()).await?;

        let mut response = BytesMut::with_capacity(READ_CHUNK);
        let status_end = loop {
            if let Some(pos) = find(&response, b"\r\n") {
                break pos;
            }
            read_more(stream, &mut response).await?;
        };

        let status = String::from_utf8_lossy(&response[..status_end]).into_owned();
        log::debug!("Caster replied: {status}");

        let body_start = if status.starts_with("ICY 200") {
            status_end + 2
        } else if status.starts_with("HTTP/1.") && status.split_whitespace().nth(1) == Some("200")
        {
            loop {
                if let Some(pos) = find(&response, b"\r\n\r\n") {
                    break pos + 4;
                }
                read_more(stream, &mut response).await?;
            }
        } else if status.starts_with("SOURCETABLE 200") {
            return Err(SourceError::Rejected(format!(
                "mountpoint `{}` is not served by the caster",
                config.mountpoint
            )));
        } else {
            return Err(SourceError::Rejected(status));
        };

        self.framer.extend(&response[body_start..]);
        Ok(())
    }
}

async fn read_more(stream: &mut TcpStream, response: &mut BytesMut) -> SourceResult<()> {
    if response.len() > MAX_RESPONSE_HEADER {
        return Err(SourceError::Protocol("response header too long".into()));
    }
    if stream.read_buf(response).await? == 0 {
        return Err(SourceError::Protocol(
            "caster closed the connection during the handshake".into(),
        ));
    }
    Ok(())
}

#[async_trait]
impl MessageSource for NtripClient {
    async fn next_message(&mut self) -> NextMessage {
        loop {
            if let Some(frame) = self.framer.next_frame() {
                return NextMessage::Message(frame);
            }

            let Some(stream) = self.stream.as_mut() else {
                return NextMessage::EndOfStream;
            };

            match stream.read(&mut self.read_buffer).await {
                Ok(0) => {
                    self.stream = None;
                    return NextMessage::EndOfStream;
                }
                Ok(length) => self.framer.extend(&self.read_buffer[..length]),
                Err(err) => return NextMessage::Error(err.into()),
            }
        }
    }

    async fn shutdown(&mut self) -> SourceResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        if self.framer.skipped() > 0 {
            log::debug!(
                "{} bytes outside RTCM frames were skipped",
                self.framer.skipped()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcm::encode_frame;
    use bytes::Bytes;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn config(port: u16) -> NtripConfig {
        NtripConfig {
            host: "127.0.0.1".into(),
            port,
            mountpoint: "MOUNT".into(),
            username: Some("user".into()),
            password: Some("pass".into()),
        }
    }

    // Accepts one client, answers with `reply`, then closes the connection.
    async fn caster(reply: Vec<u8>) -> std::io::Result<(u16, JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![];
            let mut buf = [0u8; 512];
            while find(&request, b"\r\n\r\n").is_none() {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
            }
            for piece in reply.chunks(5) {
                if socket.write_all(piece).await.is_err() {
                    break;
                }
            }
            String::from_utf8(request).unwrap()
        });
        Ok((port, handle))
    }

    #[test]
    fn request_carries_basic_auth() {
        let request = build_request(&config(2101));
        assert!(request.starts_with("GET /MOUNT HTTP/1.0\r\n"));
        assert!(request.contains("Authorization: Basic dXNlcjpwYXNz\r\n"));
        assert!(request.ends_with("\r\n\r\n"));

        let anonymous = NtripConfig {
            username: None,
            password: None,
            ..config(2101)
        };
        assert!(!build_request(&anonymous).contains("Authorization"));
    }

    #[tokio::test]
    async fn test_icy_stream() -> SourceResult<()> {
        let first = encode_frame(&[0x3E, 0xD0, 1, 2, 3]);
        let second = encode_frame(&[0x43, 0x50, 9, 9, 9, 9, 9, 9]);
        let mut reply = b"ICY 200 OK\r\n\r\n".to_vec();
        reply.extend_from_slice(&first);
        reply.extend_from_slice(&second);

        let (port, caster) = caster(reply).await?;
        let mut client = NtripClient::connect(&config(port)).await?;

        let mut messages: Vec<Bytes> = vec![];
        loop {
            match client.next_message().await {
                NextMessage::Message(message) => messages.push(message),
                NextMessage::EndOfStream => break,
                NextMessage::Error(err) => return Err(err),
            }
        }
        assert_eq!(messages, vec![first, second]);

        let request = caster.await.unwrap();
        assert!(request.contains("User-Agent: NTRIP rtcmrelay/"));
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_http_stream() -> SourceResult<()> {
        let frame = encode_frame(&[0x3E, 0xD0, 0xAA]);
        let mut reply =
            b"HTTP/1.1 200 OK\r\nContent-Type: gnss/data\r\nCache-Control: no-store\r\n\r\n"
                .to_vec();
        reply.extend_from_slice(&frame);

        let (port, _caster) = caster(reply).await?;
        let mut client = NtripClient::connect(&config(port)).await?;
        assert!(matches!(client.next_message().await, NextMessage::Message(m) if m == frame));
        assert!(matches!(client.next_message().await, NextMessage::EndOfStream));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_mountpoint() -> std::io::Result<()> {
        let (port, _caster) = caster(b"SOURCETABLE 200 OK\r\n\r\nENDSOURCETABLE\r\n".to_vec()).await?;
        let result = NtripClient::connect(&config(port)).await;
        assert!(matches!(result, Err(SourceError::Rejected(reason)) if reason.contains("MOUNT")));
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized() -> std::io::Result<()> {
        let (port, _caster) = caster(b"HTTP/1.1 401 Unauthorized\r\n\r\n".to_vec()).await?;
        let result = NtripClient::connect(&config(port)).await;
        assert!(matches!(result, Err(SourceError::Rejected(reason)) if reason.contains("401")));
        Ok(())
    }
}

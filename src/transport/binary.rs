//! The binary, length-prefixed transport (§4.D, §6): one TCP connection per
//! open server, a fixed 65 KB scratch buffer, reconnect-before-send, and a
//! 5-second per-attempt receive timeout.

use std::net::ToSocketAddrs;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;

use super::{ConnState, TransportError, MAX_FRAME_LEN, RECV_TIMEOUT};
use crate::codec::request::{encode_request_frame, Opcode};

/// Appends the wire frame for `opcode`/`args_body` and writes it in full.
///
/// Mirrors `encode_request_frame`'s own bounds check (§4.C): a body that
/// would push the frame past [`MAX_FRAME_LEN`] is rejected before anything
/// is written to `writer`.
async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    opcode: Opcode,
    args_body: &[u8],
) -> Result<(), TransportError> {
    let mut frame = Vec::new();
    encode_request_frame(opcode, args_body, &mut frame)
        .map_err(|_| TransportError::Io(std::io::Error::from(std::io::ErrorKind::InvalidInput)))?;
    timeout(RECV_TIMEOUT, writer.write_all(&frame))
        .await
        .map_err(|_| TransportError::TimedOut(RECV_TIMEOUT))?
        .map_err(TransportError::Io)
}

/// Reads one `length: u32, body: length×u8` reply frame, enforcing
/// [`MAX_FRAME_LEN`] on the prefix before any body bytes are read.
async fn recv_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0_u8; 4];
    match timeout(RECV_TIMEOUT, reader.read_exact(&mut len_buf)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed)
        }
        Ok(Err(e)) => return Err(TransportError::Io(e)),
        Err(_) => return Err(TransportError::TimedOut(RECV_TIMEOUT)),
    }
    let declared = u32::from_le_bytes(len_buf);
    if declared as usize > MAX_FRAME_LEN {
        return Err(TransportError::ReplyTooLarge {
            declared,
            max: MAX_FRAME_LEN,
        });
    }
    #[allow(
        clippy::cast_possible_truncation,
        reason = "declared was just checked against MAX_FRAME_LEN"
    )]
    let mut body = vec![0_u8; declared as usize];
    timeout(RECV_TIMEOUT, reader.read_exact(&mut body))
        .await
        .map_err(|_| TransportError::TimedOut(RECV_TIMEOUT))?
        .map_err(TransportError::Io)?;
    Ok(body)
}

/// A live binary transport connection over `tokio::net::TcpStream`.
///
/// `open_server`/`close_server` (§4.H) own the lifetime of one instance per
/// server handle; every other façade call reuses it, reconnecting
/// transparently if it finds [`ConnState::Disconnected`] (§4.D, §8).
#[derive(Debug)]
pub struct BinaryTransport {
    host: String,
    port: u16,
    state: ConnState,
    stream: Option<TcpStream>,
}

impl BinaryTransport {
    /// Creates a transport targeting `host:port`, not yet connected.
    #[must_use]
    pub const fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            state: ConnState::Uninit,
            stream: None,
        }
    }

    /// The configured host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnState {
        self.state
    }

    /// Connects (or reconnects) the underlying socket if it is not already
    /// [`ConnState::Connected`].
    ///
    /// # Errors
    /// Returns [`TransportError::Connect`] if the TCP connect fails.
    pub async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if matches!(self.state, ConnState::Connected) && self.stream.is_some() {
            return Ok(());
        }
        tracing::debug!(host = %self.host, port = self.port, "connecting transport");
        let connect_err = |source| TransportError::Connect {
            host: self.host.clone(),
            port: self.port,
            source,
        };
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| connect_err(std::io::Error::from(std::io::ErrorKind::InvalidInput)))?;
        // A fresh socket per (re)connect with address-reuse set, rather than
        // reusing one across reconnects (§4.D).
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(connect_err)?;
        socket.set_reuseaddr(true).map_err(connect_err)?;
        let stream = socket.connect(addr).await.map_err(connect_err)?;
        let _ = stream.set_nodelay(true);
        self.stream = Some(stream);
        self.state = ConnState::Connected;
        Ok(())
    }

    /// Sends one request and waits for its paired reply, reconnecting first
    /// if necessary (§4.D "Reconnect"). Returns the reply's `result` body
    /// (the bytes after the length prefix).
    ///
    /// # Errors
    /// Returns a [`TransportError`]; on any I/O failure the connection is
    /// marked [`ConnState::Disconnected`] per [`TransportError::disconnects`].
    pub async fn request(
        &mut self,
        opcode: Opcode,
        args_body: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        self.ensure_connected().await?;
        let result = self.request_inner(opcode, args_body).await;
        if let Err(ref e) = result {
            if e.disconnects() {
                tracing::warn!(error = %e, "transport disconnected");
                self.state = ConnState::Disconnected;
                self.stream = None;
            }
        }
        result
    }

    /// Sends `mcd_exit` with no expectation of a reply (§4.C).
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the send itself fails.
    pub async fn send_exit(&mut self) -> Result<(), TransportError> {
        self.ensure_connected().await?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        let result = send_frame(stream, Opcode::Exit, &[]).await;
        self.stream = None;
        self.state = ConnState::Disconnected;
        result
    }

    async fn request_inner(
        &mut self,
        opcode: Opcode,
        args_body: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        send_frame(stream, opcode, args_body).await?;
        recv_frame(stream).await
    }

    /// Performs a full-duplex shutdown and drops the socket (§4.D "close").
    ///
    /// # Errors
    /// Returns a [`TransportError::Io`] if the shutdown call fails; the
    /// socket is dropped regardless.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            let res = stream.shutdown().await.map_err(TransportError::Io);
            self.state = ConnState::Disconnected;
            return res;
        }
        self.state = ConnState::Disconnected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn send_frame_then_recv_frame_round_trips() {
        let (mut a, mut b) = duplex(4096);
        send_frame(&mut a, Opcode::OpenServer, &[1, 2, 3]).await.unwrap();
        let body = recv_frame(&mut b).await.unwrap();
        // recv_frame reads the generic length/body shape; here it's reading
        // what was written as a *request* frame (length/uid/args), so the
        // body includes the uid byte followed by the args.
        assert_eq!(body, vec![Opcode::OpenServer as u8, 1, 2, 3]);
    }

    #[tokio::test]
    async fn recv_frame_rejects_oversize_length_prefix() {
        let (mut a, mut b) = duplex(8);
        tokio::spawn(async move {
            let _ = a.write_all(&70_000_u32.to_le_bytes()).await;
        });
        let err = recv_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, TransportError::ReplyTooLarge { declared: 70_000, .. }));
    }

    #[tokio::test]
    async fn recv_frame_reports_closed_on_zero_length_read() {
        let (a, mut b) = duplex(8);
        drop(a);
        let err = recv_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn fresh_transport_starts_uninit() {
        let transport = BinaryTransport::new("127.0.0.1".to_string(), 1235);
        assert_eq!(transport.state(), ConnState::Uninit);
        assert_eq!(transport.host(), "127.0.0.1");
        assert_eq!(transport.port(), 1235);
    }
}

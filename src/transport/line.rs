//! The alternative newline-delimited JSON transport (§4.C "Alternative JSON
//! transport", §6). Carries the same semantic payloads as the binary
//! transport as QMP-style `{"execute": ..., "arguments": ...}` lines,
//! draining interleaved asynchronous event lines until it finds one
//! carrying a `"return"` key.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{ConnState, TransportError, MAX_FRAME_LEN, RECV_TIMEOUT};

/// Appends one JSON request line: `{"execute": name, "arguments": args}\n`.
async fn send_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    name: &str,
    arguments: Value,
) -> Result<(), TransportError> {
    let line = serde_json::json!({ "execute": name, "arguments": arguments }).to_string();
    timeout(RECV_TIMEOUT, async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await
    })
    .await
    .map_err(|_| TransportError::TimedOut(RECV_TIMEOUT))?
    .map_err(TransportError::Io)
}

/// Reads one newline-terminated line out of `pending`, refilling it from
/// `reader` as needed. A read returning zero bytes is "connection closed";
/// a line exceeding [`MAX_FRAME_LEN`] without a newline is an overflow.
async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut R,
    pending: &mut Vec<u8>,
) -> Result<Vec<u8>, TransportError> {
    loop {
        if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line = pending[..pos].to_vec();
            pending.drain(..=pos);
            return Ok(line);
        }
        if pending.len() > MAX_FRAME_LEN {
            return Err(TransportError::LineOverflow(MAX_FRAME_LEN));
        }
        let mut chunk = [0_u8; 1024];
        let n = timeout(RECV_TIMEOUT, reader.read(&mut chunk))
            .await
            .map_err(|_| TransportError::TimedOut(RECV_TIMEOUT))?
            .map_err(TransportError::Io)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        let Some(received) = chunk.get(..n) else {
            return Err(TransportError::Closed);
        };
        pending.extend_from_slice(received);
    }
}

/// Reads lines until one parses as a JSON object containing a `"return"`
/// key; malformed lines and event lines lacking that key are silently
/// skipped (§4.C, §5 "Ordering").
async fn read_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
    pending: &mut Vec<u8>,
) -> Result<Value, TransportError> {
    loop {
        let line = read_line(reader, pending).await?;
        let Ok(text) = std::str::from_utf8(&line) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            tracing::trace!("skipping unparsable line on line transport");
            continue;
        };
        if value.get("return").is_some() {
            return Ok(value);
        }
        tracing::trace!("skipping async event line on line transport");
    }
}

/// A live line-delimited JSON transport connection.
pub struct LineTransport {
    host: String,
    port: u16,
    state: ConnState,
    stream: Option<TcpStream>,
    pending: Vec<u8>,
}

impl LineTransport {
    /// Creates a transport targeting `host:port`, not yet connected.
    #[must_use]
    pub const fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            state: ConnState::Uninit,
            stream: None,
            pending: Vec::new(),
        }
    }

    /// The current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnState {
        self.state
    }

    /// Connects (or reconnects) the underlying socket if needed.
    ///
    /// # Errors
    /// Returns [`TransportError::Connect`] if the TCP connect fails.
    pub async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if matches!(self.state, ConnState::Connected) && self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Connect {
                host: self.host.clone(),
                port: self.port,
                source,
            })?;
        let _ = stream.set_nodelay(true);
        self.stream = Some(stream);
        self.pending.clear();
        self.state = ConnState::Connected;
        Ok(())
    }

    /// Sends one `{"execute": name, "arguments": ...}` request and returns
    /// the next line carrying a `"return"` key, reconnecting first if
    /// necessary.
    ///
    /// # Errors
    /// Returns a [`TransportError`]; any I/O failure marks the connection
    /// [`ConnState::Disconnected`].
    pub async fn request(&mut self, name: &str, arguments: Value) -> Result<Value, TransportError> {
        self.ensure_connected().await?;
        let result = self.request_inner(name, arguments).await;
        if let Err(ref e) = result {
            if e.disconnects() {
                self.state = ConnState::Disconnected;
                self.stream = None;
            }
        }
        result
    }

    async fn request_inner(&mut self, name: &str, arguments: Value) -> Result<Value, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        send_line(stream, name, arguments).await?;
        read_reply(stream, &mut self.pending).await
    }

    /// Full-duplex shutdown and drop the socket.
    ///
    /// # Errors
    /// Returns a [`TransportError::Io`] if the shutdown call fails.
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
    async fn read_reply_skips_event_lines_before_return() {
        let (mut a, mut b) = duplex(4096);
        tokio::spawn(async move {
            a.write_all(b"not json at all\n").await.unwrap();
            a.write_all(b"{\"event\": \"SHUTDOWN\"}\n").await.unwrap();
            a.write_all(b"{\"return\": {\"ok\": true}}\n").await.unwrap();
        });
        let mut pending = Vec::new();
        let value = read_reply(&mut b, &mut pending).await.unwrap();
        assert_eq!(value["return"]["ok"], Value::Bool(true));
    }

    #[tokio::test]
    async fn send_line_then_read_reply_round_trips_request_shape() {
        let (mut a, mut b) = duplex(4096);
        send_line(&mut a, "qry-error-info", serde_json::json!({"core-uid": 1}))
            .await
            .unwrap();
        let mut pending = Vec::new();
        let line = read_line(&mut b, &mut pending).await.unwrap();
        let value: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["execute"], "qry-error-info");
        assert_eq!(value["arguments"]["core-uid"], 1);
    }

    #[tokio::test]
    async fn read_line_reports_closed_on_eof() {
        let (a, mut b) = duplex(8);
        drop(a);
        let mut pending = Vec::new();
        assert!(matches!(
            read_line(&mut b, &mut pending).await,
            Err(TransportError::Closed)
        ));
    }
}

//! Control connection transport
//!
//! Wraps a reliable byte stream and speaks the control framing: terminated
//! command frames out, single response lines in. Generic over the transport
//! so tests can drive it with in-memory streams.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{FtlError, Result};
use crate::protocol::constants::MAX_RESPONSE_LINE;
use crate::protocol::wire::{Command, Response};

/// A control-channel connection to an ingest
#[derive(Debug)]
pub struct ControlConnection<S = TcpStream> {
    stream: BufReader<S>,
    // Bytes of a not-yet-complete response line. Kept on the connection so
    // a timed-out read never loses data: the next read resumes mid-line.
    partial: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ControlConnection<S> {
    pub fn new(stream: S) -> Self {
        ControlConnection {
            stream: BufReader::new(stream),
            partial: Vec::new(),
        }
    }

    /// Send one command frame
    pub async fn send(&mut self, cmd: &Command) -> Result<()> {
        self.stream.write_all(&cmd.encode()).await?;
        self.stream.flush().await?;
        trace!(verb = cmd.verb(), "sent command");
        Ok(())
    }

    /// Read and parse the next response line, waiting as long as it takes
    pub async fn read_response(&mut self) -> Result<Response> {
        let line = self.read_line().await?;
        let resp = Response::parse(&line)?;
        trace!(code = resp.code, "received response");
        Ok(resp)
    }

    /// Read the next response, bounded by `limit`
    ///
    /// `Ok(None)` means the deadline passed with no complete line; the
    /// connection stays usable and the next read picks up where this one
    /// left off.
    pub async fn read_response_within(&mut self, limit: Duration) -> Result<Option<Response>> {
        match tokio::time::timeout(limit, self.read_response()).await {
            Ok(resp) => resp.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Send a command and await its response, bounded by `limit`
    pub async fn request(&mut self, cmd: &Command, limit: Duration) -> Result<Response> {
        self.send(cmd).await?;
        match self.read_response_within(limit).await? {
            Some(resp) => Ok(resp),
            None => Err(FtlError::internal(format_args!(
                "timed out waiting for {} response",
                cmd.verb()
            ))),
        }
    }

    /// Shut down the write half, flushing anything buffered
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    // Accumulates into self.partial until a `\n` arrives, so cancellation
    // between polls never drops bytes.
    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.partial.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line);
                return Ok(text.trim_end_matches(['\r', '\n']).to_string());
            }
            if self.partial.len() > MAX_RESPONSE_LINE {
                return Err(FtlError::internal("response line exceeds maximum length"));
            }

            let buf = self.stream.fill_buf().await?;
            if buf.is_empty() {
                return Err(FtlError::internal("control connection closed by ingest"));
            }
            self.partial.extend_from_slice(buf);
            let consumed = buf.len();
            self.stream.consume(consumed);
        }
    }
}

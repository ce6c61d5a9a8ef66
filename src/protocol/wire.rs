//! Wire framing for the FTL control channel
//!
//! The control channel is a text protocol. Client commands are short verb
//! frames terminated by `\r\n\r\n`; ingest responses are single lines
//! terminated by `\n`, beginning with a numeric status code:
//!
//! ```text
//! Client                                   Ingest
//!   |------- HMAC ------------------------->|
//!   |<------ 200 <hex salt> ----------------|
//!   |------- CONNECT <channel> $<proof> --->|
//!   |<------ 200 ---------------------------|
//!   |------- ProtocolVersion: 0.9 --------->|
//!   |------- VideoCodec: VP8 -------------->|
//!   |------- ... ------------------------->|
//!   |------- . ---------------------------->|
//!   |<------ 200. Use UDP port 8082 --------|
//!   |                                       |
//!   |------- PING <channel> --------------->|   (repeating)
//!   |<------ 201 ---------------------------|
//!   |                                       |
//!   |------- DISCONNECT ------------------->|
//! ```
//!
//! This module is the serialization layer only: framing in, framing out, no
//! I/O. The handshake engine and keepalive supervisor drive it over a
//! [`ControlConnection`](crate::net::ControlConnection).

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FtlError;
use crate::protocol::constants::{COMMAND_TERMINATOR, END_OF_ATTRIBUTES, RESP_OK};

/// A client-to-ingest command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request an authentication salt
    Hmac,

    /// Present credentials: channel id plus the hex HMAC proof
    Connect { channel_id: u64, proof: String },

    /// One negotiation attribute (`Key: Value`)
    Attribute { key: String, value: String },

    /// End of the attribute list
    EndAttributes,

    /// Liveness probe for the given channel
    Ping { channel_id: u64 },

    /// Clean shutdown notification
    Disconnect,
}

impl Command {
    /// Build an attribute command
    pub fn attribute(key: impl Into<String>, value: impl fmt::Display) -> Self {
        Command::Attribute {
            key: key.into(),
            value: value.to_string(),
        }
    }

    /// Verb name for tracing and error text
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Hmac => "HMAC",
            Command::Connect { .. } => "CONNECT",
            Command::Attribute { .. } => "attribute",
            Command::EndAttributes => "end-of-attributes",
            Command::Ping { .. } => "PING",
            Command::Disconnect => "DISCONNECT",
        }
    }

    /// Encode the command into a terminated wire frame
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);

        match self {
            Command::Hmac => buf.put_slice(b"HMAC"),
            Command::Connect { channel_id, proof } => {
                buf.put_slice(format!("CONNECT {} ${}", channel_id, proof).as_bytes());
            }
            Command::Attribute { key, value } => {
                buf.put_slice(format!("{}: {}", key, value).as_bytes());
            }
            Command::EndAttributes => buf.put_slice(END_OF_ATTRIBUTES.as_bytes()),
            Command::Ping { channel_id } => {
                buf.put_slice(format!("PING {}", channel_id).as_bytes());
            }
            Command::Disconnect => buf.put_slice(b"DISCONNECT"),
        }

        buf.put_slice(COMMAND_TERMINATOR.as_bytes());
        buf.freeze()
    }

    /// Parse a single frame (terminator already stripped)
    ///
    /// Parsing is lenient where encoders in the field vary: `PING` without a
    /// channel id is accepted as channel 0.
    pub fn parse(frame: &str) -> Result<Command, WireError> {
        let frame = frame.trim();

        if frame == "HMAC" {
            return Ok(Command::Hmac);
        }
        if frame == END_OF_ATTRIBUTES {
            return Ok(Command::EndAttributes);
        }
        if frame == "DISCONNECT" {
            return Ok(Command::Disconnect);
        }
        if let Some(rest) = frame.strip_prefix("PING") {
            let rest = rest.trim();
            let channel_id = if rest.is_empty() {
                0
            } else {
                rest.parse()
                    .map_err(|_| WireError::MalformedCommand(frame.to_string()))?
            };
            return Ok(Command::Ping { channel_id });
        }
        if let Some(rest) = frame.strip_prefix("CONNECT ") {
            let (channel, proof) = rest
                .split_once(" $")
                .ok_or_else(|| WireError::MalformedCommand(frame.to_string()))?;
            let channel_id = channel
                .trim()
                .parse()
                .map_err(|_| WireError::MalformedCommand(frame.to_string()))?;
            return Ok(Command::Connect {
                channel_id,
                proof: proof.trim().to_string(),
            });
        }
        if let Some((key, value)) = frame.split_once(':') {
            return Ok(Command::Attribute {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            });
        }

        Err(WireError::UnknownCommand(frame.to_string()))
    }
}

/// A single ingest response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Numeric status code
    pub code: u16,

    /// Text following the code, with separators trimmed
    pub detail: String,
}

impl Response {
    /// Build a detail-free response
    pub fn new(code: u16) -> Self {
        Response {
            code,
            detail: String::new(),
        }
    }

    /// Build a response with detail text
    pub fn with_detail(code: u16, detail: impl Into<String>) -> Self {
        Response {
            code,
            detail: detail.into(),
        }
    }

    /// Parse one response line
    ///
    /// The code is the leading run of ASCII digits; ingests vary between
    /// `200 detail` and `200. detail`, so separator punctuation after the
    /// code is skipped.
    pub fn parse(line: &str) -> Result<Response, WireError> {
        let line = line.trim();
        let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(WireError::MissingCode(line.to_string()));
        }
        let code: u16 = digits
            .parse()
            .map_err(|_| WireError::MissingCode(line.to_string()))?;

        let detail = line[digits.len()..]
            .trim_start_matches(['.', ':', ' '])
            .trim()
            .to_string();

        Ok(Response { code, detail })
    }

    /// Encode the response as a terminated line
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16 + self.detail.len());
        if self.detail.is_empty() {
            buf.put_slice(format!("{}\n", self.code).as_bytes());
        } else {
            buf.put_slice(format!("{} {}\n", self.code, self.detail).as_bytes());
        }
        buf.freeze()
    }

    /// Whether this is a `200` acceptance
    pub fn is_ok(&self) -> bool {
        self.code == RESP_OK
    }

    /// Extract the UDP media port from an accept response, if announced
    ///
    /// Accept lines may carry `... Use UDP port <n>`.
    pub fn media_port(&self) -> Option<u16> {
        let idx = self.detail.find("Use UDP port")?;
        let rest = self.detail[idx + "Use UDP port".len()..].trim_start();
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.detail)
        }
    }
}

/// Framing errors on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Response line carried no numeric status code
    MissingCode(String),
    /// Command frame did not match any known verb
    UnknownCommand(String),
    /// Command verb recognized but its arguments were invalid
    MalformedCommand(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::MissingCode(line) => {
                write!(f, "response line has no status code: {:?}", line)
            }
            WireError::UnknownCommand(frame) => write!(f, "unknown command: {:?}", frame),
            WireError::MalformedCommand(frame) => write!(f, "malformed command: {:?}", frame),
        }
    }
}

impl std::error::Error for WireError {}

impl From<WireError> for FtlError {
    fn from(e: WireError) -> Self {
        FtlError::InternalError(e.to_string())
    }
}

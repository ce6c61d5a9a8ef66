//! FTL control protocol constants
//!
//! Fixed values of the ingest control protocol. Tunables (timeouts, the
//! keepalive cadence) live in [`crate::config::FtlConfig`] instead.

/// TCP port the ingest control service listens on
pub const DEFAULT_INGEST_PORT: u16 = 8084;

/// Protocol version announced during negotiation
pub const PROTOCOL_VERSION: &str = "0.9";

/// Terminator for every client command frame
pub const COMMAND_TERMINATOR: &str = "\r\n\r\n";

/// End-of-attributes marker sent after the component declarations
pub const END_OF_ATTRIBUTES: &str = ".";

/// Upper bound on a single ingest response line, in bytes
///
/// Responses are short status lines; anything longer is a misbehaving peer.
pub const MAX_RESPONSE_LINE: usize = 1024;

/// Request/command accepted
pub const RESP_OK: u16 = 200;

/// Liveness response to a `PING`
pub const RESP_PING: u16 = 201;

/// Malformed or out-of-order command
pub const RESP_BAD_REQUEST: u16 = 400;

/// Credentials were not accepted
pub const RESP_UNAUTHORIZED: u16 = 401;

/// Client protocol version is no longer served
pub const RESP_OLD_VERSION: u16 = 402;

/// Declared audio SSRC collides with another session
pub const RESP_AUDIO_SSRC_COLLISION: u16 = 403;

/// Declared video SSRC collides with another session
pub const RESP_VIDEO_SSRC_COLLISION: u16 = 404;

/// Ingest-side failure
pub const RESP_INTERNAL_SERVER_ERROR: u16 = 500;

/// Default RTP payload type declared for video when the component asks for
/// auto assignment
pub const DEFAULT_VIDEO_PAYLOAD_TYPE: u8 = 96;

/// Default RTP payload type declared for audio when the component asks for
/// auto assignment
pub const DEFAULT_AUDIO_PAYLOAD_TYPE: u8 = 97;

/// First payload type of the RTP dynamic range
pub const RTP_DYNAMIC_PAYLOAD_MIN: u8 = 96;

/// Last payload type of the RTP dynamic range (payload types are 7-bit)
pub const RTP_DYNAMIC_PAYLOAD_MAX: u8 = 127;

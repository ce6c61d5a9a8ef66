//! Media component descriptors
//!
//! A stream carries at most one audio and one video component. Each
//! descriptor is a plain value: codec, RTP payload type, SSRC, and for video
//! the pixel dimensions. Descriptors are immutable once attached; the
//! negotiation step reads them and resolves any auto sentinels into the
//! final [`MediaPlan`](crate::session::MediaPlan).

use std::fmt;

use crate::error::{FtlError, Result};
use crate::protocol::constants::RTP_DYNAMIC_PAYLOAD_MAX;

/// Payload type sentinel: pick a sensible default at negotiation time
pub const AUTO_PAYLOAD_TYPE: u8 = 0;

/// SSRC sentinel: generate randomly at negotiation time
pub const AUTO_SSRC: u32 = 0;

/// Audio codecs an ingest understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// Declared placeholder carrying no media
    Null,
    Opus,
}

impl AudioCodec {
    /// Name used in negotiation attributes
    ///
    /// `Null` never reaches the wire; negotiation declares the kind disabled
    /// instead.
    pub fn wire_name(&self) -> &'static str {
        match self {
            AudioCodec::Null => "NONE",
            AudioCodec::Opus => "OPUS",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AudioCodec::Null)
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Video codecs an ingest understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Declared placeholder carrying no media
    Null,
    Vp8,
}

impl VideoCodec {
    /// Name used in negotiation attributes
    pub fn wire_name(&self) -> &'static str {
        match self {
            VideoCodec::Null => "NONE",
            VideoCodec::Vp8 => "VP8",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, VideoCodec::Null)
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Audio component descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioComponent {
    codec: AudioCodec,
    payload_type: u8,
    ssrc: u32,
}

impl AudioComponent {
    /// Build a descriptor, validating the RTP fields
    ///
    /// Payload type `0` ([`AUTO_PAYLOAD_TYPE`]) and SSRC `0` ([`AUTO_SSRC`])
    /// defer assignment to negotiation, where sibling collisions can be
    /// seen.
    pub fn new(codec: AudioCodec, payload_type: u8, ssrc: u32) -> Result<Self> {
        if payload_type > RTP_DYNAMIC_PAYLOAD_MAX {
            return Err(FtlError::ConfigError(
                "audio payload type must fit in 7 bits",
            ));
        }
        Ok(AudioComponent {
            codec,
            payload_type,
            ssrc,
        })
    }

    /// Opus with auto payload type and auto SSRC
    pub fn opus() -> Self {
        AudioComponent {
            codec: AudioCodec::Opus,
            payload_type: AUTO_PAYLOAD_TYPE,
            ssrc: AUTO_SSRC,
        }
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn has_auto_payload_type(&self) -> bool {
        self.payload_type == AUTO_PAYLOAD_TYPE
    }

    pub fn has_auto_ssrc(&self) -> bool {
        self.ssrc == AUTO_SSRC
    }
}

/// Video component descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoComponent {
    codec: VideoCodec,
    payload_type: u8,
    ssrc: u32,
    width: u32,
    height: u32,
}

impl VideoComponent {
    /// Build a descriptor, validating the RTP fields and dimensions
    ///
    /// A real (non-`Null`) codec requires non-zero width and height; the
    /// ingest needs them to provision the decode path.
    pub fn new(
        codec: VideoCodec,
        payload_type: u8,
        ssrc: u32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if payload_type > RTP_DYNAMIC_PAYLOAD_MAX {
            return Err(FtlError::ConfigError(
                "video payload type must fit in 7 bits",
            ));
        }
        if !codec.is_null() && (width == 0 || height == 0) {
            return Err(FtlError::ConfigError(
                "video component requires non-zero dimensions",
            ));
        }
        Ok(VideoComponent {
            codec,
            payload_type,
            ssrc,
            width,
            height,
        })
    }

    /// VP8 at the given resolution, auto payload type and auto SSRC
    pub fn vp8(width: u32, height: u32) -> Result<Self> {
        VideoComponent::new(VideoCodec::Vp8, AUTO_PAYLOAD_TYPE, AUTO_SSRC, width, height)
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_auto_payload_type(&self) -> bool {
        self.payload_type == AUTO_PAYLOAD_TYPE
    }

    pub fn has_auto_ssrc(&self) -> bool {
        self.ssrc == AUTO_SSRC
    }
}

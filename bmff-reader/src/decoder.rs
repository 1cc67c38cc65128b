//! The codec-decoder and colorspace-converter boundaries.

use crate::error::DecodeError;

/// An opaque decoded video frame handed from a [`VideoDecoder`] to a [`ColorspaceConverter`].
/// The reader core never inspects frame contents itself.
pub trait DecodedFrame {}

/// Outcome of a single [`VideoDecoder::decode`] call.
pub enum VideoDecodeOutcome<F: DecodedFrame> {
    /// A frame was emitted.
    Frame(F),
    /// The packet was consumed but no frame emerged yet (B-frame reordering / pipelining).
    NoFrame,
}

/// The codec-decoder boundary for video.
///
/// `pipeline_depth` corresponds to `DECODER_DELAY` in the system this was distilled
/// from: `has_b_frames + (frame_threaded ? thread_count - 1 : 0)`.
pub trait VideoDecoder {
    type Frame: DecodedFrame;

    /// Coded picture dimensions, for the output bitmap header.
    fn frame_size(&self) -> (u32, u32);

    /// In-flight packet count the decoder may buffer before emitting its first frame.
    fn pipeline_depth(&self) -> u32;

    /// Hints the decoder to discard non-reference frames (used while priming past a RAP
    /// toward a target that doesn't need them).
    fn set_discard_nonref(&mut self, discard: bool);

    /// Feeds one packet. `None` means "drain": an empty packet fed during end-of-stream
    /// flush to coax out any buffered frame.
    fn decode(&mut self, packet: Option<&[u8]>) -> Result<VideoDecodeOutcome<Self::Frame>, DecodeError>;

    /// Flush-by-reopen: closes and reopens the underlying codec context. Some codecs'
    /// documented flush primitive is not sufficient to restore deterministic output
    /// after a seek; reopening restores a known state at the cost of one extra
    /// allocation per seek.
    fn reopen(&mut self) -> Result<(), DecodeError>;
}

/// The codec-decoder boundary for audio.
///
/// A single packet may decode to more than one output chunk (rare); `decode` returns
/// every chunk produced from the packet so the Audio Read Engine doesn't need to track
/// the decoder's internal "bytes of packet consumed so far" bookkeeping itself.
pub trait AudioDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError>;

    /// Flush-by-reopen, as with [`VideoDecoder::reopen`].
    fn reopen(&mut self) -> Result<(), DecodeError>;

    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    fn bits_per_sample(&self) -> u16;

    /// Frames per packet the codec delivers, or 0 if that varies packet to packet
    /// (queried from the demuxer's sample deltas instead).
    fn frame_length(&self) -> u32;
}

/// Output pixel layouts a [`ColorspaceConverter`] may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 16-bit-per-channel YUV 4:4:4, the format this system was distilled from
    /// uses internally for its highest-fidelity output path.
    Yc48,
    /// Packed 8-bit YUV 4:2:2.
    Yuy2,
    /// Packed 24-bit BGR, bottom-up.
    Rgb24,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> u16 {
        match self {
            PixelFormat::Yc48 => 48,
            PixelFormat::Yuy2 => 16,
            PixelFormat::Rgb24 => 24,
        }
    }

    /// Four-character-code identifying the format in an output bitmap header; 0 for
    /// formats (like RGB) that have none.
    pub fn fourcc(self) -> u32 {
        fn fourcc(s: [u8; 4]) -> u32 {
            u32::from_le_bytes(s)
        }
        match self {
            PixelFormat::Yc48 => fourcc(*b"YC48"),
            PixelFormat::Yuy2 => fourcc(*b"YUY2"),
            PixelFormat::Rgb24 => 0,
        }
    }
}

/// The pixel-format-conversion boundary. Converts a decoded frame into the host's
/// output pixel buffer and returns the number of bytes written (0 on failure).
pub trait ColorspaceConverter<F: DecodedFrame> {
    fn pixel_format(&self) -> PixelFormat;
    fn convert(&mut self, frame: &F, out: &mut [u8]) -> usize;
}

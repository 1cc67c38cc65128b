//! Error taxonomy for the reader core (see spec §7).

use thiserror::Error;

/// Errors which can abort the open/bind/prepare lifecycle.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OpenError {
    #[error("container could not be opened or has zero tracks")]
    OpenFailed,

    #[error("no {0} track found")]
    TrackMissing(&'static str),

    #[error("timeline construction failed: {0}")]
    Timeline(#[from] TimelineError),

    #[error("failed to allocate {0}")]
    Allocation(&'static str),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors from timeline / timestamp enumeration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TimelineError {
    #[error("sample count mismatch: timeline reports {timeline}, timestamp table has {table}")]
    SampleCountMismatch { timeline: u32, table: usize },

    #[error("failed to fetch sample timestamps")]
    TimestampFetchFailed,

    #[error("failed to determine maximum composition delay")]
    DelayQueryFailed,
}

/// Errors surfaced by a `VideoDecoder` or `AudioDecoder` implementation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The decoder reported failure on a packet it was fed.
    #[error("hard decode error")]
    Hard,

    /// No frame emerged from the decoder within the delay envelope at the target.
    #[error("no output frame emerged at target")]
    NoOutput,

    /// A requested decoding-order sample has no backing data in the container.
    #[error("sample absent at decoding index {0}")]
    SampleAbsent(u32),
}

/// Errors from a single `read_audio` call. Unlike video reads, an audio read that
/// partially succeeds still returns the partial sample count rather than an error; this
/// type is only used for seek-path failures before any samples have been delivered.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

//! The container-demuxer boundary.
//!
//! This crate does not parse ISO-BMFF boxes itself; a host links in a real demuxer and
//! implements [`Demuxer`] as a thin adapter over it. Everything here mirrors a specific
//! L-SMASH API call used by the AviUtl input plugin this system was distilled from:
//! `timestamps` is `lsmash_get_media_timestamps`, `rap_detail` is
//! `lsmash_get_closest_random_accessible_point_detail_from_media_timeline`, `fetch_sample`
//! is `lsmash_get_sample_from_media_timeline`, and so on.

use crate::error::TimelineError;

/// Opaque per-track identifier, as handed out by the demuxer.
pub type TrackId = u32;

/// The two track kinds this reader cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// One sample's decoding and composition timestamps, as enumerated in decoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTiming {
    /// Decoding-order sample number (1-based).
    pub decoding_number: u32,
    /// Composition timestamp, in the track's media timescale.
    pub cts: u64,
}

/// The kind of random access point classification reported by the demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RapType {
    /// A strict sync sample; decodable with no prior context.
    Sync,
    /// Requires decoding additional samples *before* the RAP to produce correct output.
    PreRoll,
    /// Requires decoding additional samples *after* the RAP to produce correct output.
    PostRoll,
    /// Not independently decodable at all.
    None,
}

/// Detailed RAP lookup result, as used by the Random-Access Resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RapDetail {
    /// Decoding-order sample number of the random access point.
    pub rap: u32,
    pub rap_type: RapType,
    /// Number of leading (non-independently-decodable) samples following the RAP.
    pub leading_count: u32,
    /// Distance from this RAP back to the previous one.
    pub distance: u32,
}

/// A sample payload copied out of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchedSample {
    /// Number of bytes written into the caller's buffer.
    pub len: usize,
    /// True iff this is a sync (RAP) sample.
    pub is_sync: bool,
}

/// The container-demuxer boundary.
///
/// Implementations are expected to be cheap to query repeatedly except where documented
/// otherwise (`timestamps` is called once per track, at open time).
pub trait Demuxer {
    /// Returns the first track of the given kind, if any.
    fn track_of_kind(&self, kind: TrackKind) -> Option<TrackId>;

    fn media_timescale(&self, track: TrackId) -> u64;
    fn media_duration(&self, track: TrackId) -> u64;
    fn sample_count(&self, track: TrackId) -> u32;

    /// Enumerates every sample's decoding number and composition timestamp. Called once,
    /// at track-open time, to build the order map and derive the framerate.
    fn timestamps(&self, track: TrackId) -> Result<Vec<SampleTiming>, TimelineError>;

    /// The maximum composition-to-decoding delay for the track (0 if samples are never
    /// reordered).
    fn max_composition_delay(&self, track: TrackId) -> Result<u32, TimelineError>;

    /// Cheap closest-RAP-at-or-before lookup, used for keyframe bitmap construction.
    /// `None` on lookup failure (not fatal; leaves the corresponding bit clear).
    fn closest_rap(&self, track: TrackId, decoding_index: u32) -> Option<u32>;

    /// Detailed RAP lookup, used by the Resolver. `None` on lookup failure (the caller
    /// substitutes `rap = 1`).
    fn rap_detail(&self, track: TrackId, decoding_index: u32) -> Option<RapDetail>;

    /// The largest sample size on the track, used to size reusable input buffers.
    fn max_sample_size(&self, track: TrackId) -> u32;

    /// Copies the sample at `decoding_index` into `buf`. Returns `None` if no such
    /// sample exists.
    fn fetch_sample(&self, track: TrackId, decoding_index: u32, buf: &mut [u8]) -> Option<FetchedSample>;

    /// The first non-negative explicit edit's start time, if the track has one. Negative
    /// edits (and tracks without edits) yield `None`.
    fn edit_list_start_time(&self, track: TrackId) -> Option<i64>;

    /// Duration of the given (1-based) audio frame, for variable frame-length tracks.
    /// `None` if the frame does not exist.
    fn sample_delta(&self, track: TrackId, frame_number: u32) -> Option<u32>;

    /// Pre-roll distance for the given audio frame (0 if none).
    fn pre_roll_distance(&self, track: TrackId, frame_number: u32) -> u32;

    /// Releases demuxer parser scratch state kept around after binding tracks.
    fn discard_scratch(&mut self) {}
}

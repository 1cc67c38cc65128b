//! The Random-Access Resolver (spec §4.2): maps a target composition frame to the
//! decoding-order anchor a correct decode must begin from.

use crate::demuxer::{Demuxer, RapType, TrackId};
use crate::timeline::Timeline;
use tracing::trace;

/// Result of [`resolve_anchor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Decoding-order sample number to start decoding from.
    pub anchor_d: u32,
    /// True if the anchor is a roll-recovery point (pre-roll or post-roll), meaning the
    /// decode must tolerate decoder errors along the way.
    pub roll_recovery: bool,
}

/// Resolves the decode anchor for `target_c` (1-based composition number).
///
/// `lower_bound_d`, if nonzero, overrides the decoding index the lookup starts from
/// (used by the Seek Retry Ladder to back up past a previously-tried anchor).
pub fn resolve_anchor<D: Demuxer + ?Sized>(
    demuxer: &D,
    track: TrackId,
    timeline: &Timeline,
    target_c: u32,
    lower_bound_d: u32,
) -> Resolved {
    let d = if lower_bound_d != 0 { lower_bound_d } else { timeline.decoding_number(target_c) };

    let detail = demuxer.rap_detail(track, d);
    let (mut rap, rap_type, leading_count, distance) = match detail {
        Some(detail) => (detail.rap, detail.rap_type, detail.leading_count, detail.distance),
        None => (1, RapType::None, 0, 0),
    };

    let roll_recovery = matches!(rap_type, RapType::PreRoll | RapType::PostRoll);
    let is_leading = leading_count > 0 && d.saturating_sub(rap) <= leading_count;
    if (roll_recovery || is_leading) && rap > distance {
        rap -= distance;
    }

    trace!(target_c, d, rap, roll_recovery, is_leading, "resolved decode anchor");
    Resolved { anchor_d: rap, roll_recovery }
}

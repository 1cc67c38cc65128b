//! The Timeline Builder (spec §4.1): per-track framerate, order map, and keyframe bitmap.

use crate::demuxer::{Demuxer, SampleTiming, TrackId};
use crate::error::TimelineError;
use tracing::debug;

/// A reduced rational framerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framerate {
    pub num: u64,
    pub den: u64,
}

/// Per-track metadata produced by [`build_timeline`].
#[derive(Debug, Clone)]
pub struct Timeline {
    pub sample_count: u32,
    /// `None` when duplicate composition timestamps aborted framerate refinement; the
    /// host-provided default framerate should be kept in that case.
    pub framerate: Option<Framerate>,
    /// Composition index (0-based: index `c` holds the decoding number for composition
    /// number `c + 1`) to decoding number. `None` when the track has zero composition
    /// delay and the mapping is the identity.
    pub order_map: Option<Vec<u32>>,
    /// Indexed the same way as `order_map`: `keyframe_bitmap[c]` is set iff composition
    /// sample `c + 1` is independently decodable.
    pub keyframe_bitmap: Vec<bool>,
}

impl Timeline {
    /// Decoding-order sample number for the given 1-based composition number.
    pub fn decoding_number(&self, composition_number: u32) -> u32 {
        match &self.order_map {
            Some(map) => map[(composition_number - 1) as usize],
            None => composition_number,
        }
    }
}

pub(crate) fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        return a;
    }
    let mut a = a;
    let mut b = b;
    loop {
        let c = a % b;
        if c == 0 {
            return b;
        }
        a = b;
        b = c;
    }
}

/// Divides both `a` and `b` by their gcd, returning the gcd used.
fn reduce_fraction(a: &mut u64, b: &mut u64) -> u64 {
    let reduce = gcd(*a, *b);
    if let Some(reduced_a) = a.checked_div(reduce) {
        *a = reduced_a;
        *b /= reduce;
    }
    reduce
}

/// Builds the full per-track timeline metadata (spec §4.1).
pub fn build_timeline<D: Demuxer + ?Sized>(demuxer: &D, track: TrackId) -> Result<Timeline, TimelineError> {
    let sample_count = demuxer.sample_count(track);
    if sample_count == 0 {
        return Err(TimelineError::SampleCountMismatch { timeline: 0, table: 0 });
    }
    let media_timescale = demuxer.media_timescale(track);

    if sample_count == 1 {
        let framerate = single_sample_framerate(media_timescale, demuxer.media_duration(track));
        let keyframe_bitmap = build_keyframe_bitmap(demuxer, track, sample_count, None);
        return Ok(Timeline { sample_count, framerate: Some(framerate), order_map: None, keyframe_bitmap });
    }

    let mut sorted = demuxer.timestamps(track)?;
    if sorted.len() != sample_count as usize {
        return Err(TimelineError::SampleCountMismatch { timeline: sample_count, table: sorted.len() });
    }
    sorted.sort_by_key(|t| t.cts);

    let max_delay = demuxer.max_composition_delay(track)?;
    let order_map = if max_delay > 0 {
        Some(sorted.iter().map(|t| t.decoding_number).collect())
    } else {
        None
    };

    let framerate = derive_framerate(sample_count, media_timescale, &sorted);
    let keyframe_bitmap = build_keyframe_bitmap(demuxer, track, sample_count, order_map.as_deref());

    Ok(Timeline { sample_count, framerate, order_map, keyframe_bitmap })
}

fn single_sample_framerate(media_timescale: u64, media_duration: u64) -> Framerate {
    let mut ts = media_timescale;
    let mut dur = if media_duration == 0 { i32::MAX as u64 } else { media_duration };
    reduce_fraction(&mut ts, &mut dur);
    Framerate { num: ts, den: dur }
}

/// Derives the average framerate from the cts-sorted timestamp table. Returns `None`
/// (leave host default) if duplicate consecutive composition timestamps are detected.
fn derive_framerate(sample_count: u32, media_timescale: u64, sorted: &[SampleTiming]) -> Option<Framerate> {
    debug_assert!(sorted.len() >= 2);
    let mut composition_timebase = sorted[1].cts - sorted[0].cts;
    let mut largest_cts = sorted[1].cts;
    let mut second_largest_cts = sorted[0].cts;
    let first_cts = sorted[0].cts;

    for i in 2..sorted.len() {
        if sorted[i].cts == sorted[i - 1].cts {
            debug!(index = i, "duplicate composition timestamp, aborting framerate refinement");
            return None;
        }
        composition_timebase = gcd(composition_timebase, sorted[i].cts - sorted[i - 1].cts);
        second_largest_cts = largest_cts;
        largest_cts = sorted[i].cts;
    }

    let mut timescale = media_timescale;
    let mut timebase = composition_timebase;
    let reduce = reduce_fraction(&mut timescale, &mut timebase);
    let composition_duration = ((largest_cts - first_cts) + (largest_cts - second_largest_cts)) / reduce;
    if composition_duration == 0 {
        return None;
    }
    let num = (sample_count as f64 * (timescale as f64 / composition_duration as f64) * timebase as f64 + 0.5) as u64;
    Some(Framerate { num, den: timebase })
}

fn build_keyframe_bitmap<D: Demuxer + ?Sized>(
    demuxer: &D,
    track: TrackId,
    sample_count: u32,
    order_map: Option<&[u32]>,
) -> Vec<bool> {
    (1..=sample_count)
        .map(|c| {
            let d = match order_map {
                Some(map) => map[(c - 1) as usize],
                None => c,
            };
            demuxer.closest_rap(track, d) == Some(d)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(12, 8), 4);
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(5, 0), 5);
        assert_eq!(gcd(7, 13), 1);
    }

    #[test]
    fn test_reduce_fraction() {
        let mut a = 48u64;
        let mut b = 18u64;
        let reduce = reduce_fraction(&mut a, &mut b);
        assert_eq!(reduce, 6);
        assert_eq!((a, b), (8, 3));
    }

    #[test]
    fn test_single_sample_framerate_reduces() {
        let fr = single_sample_framerate(60000, 30000);
        assert_eq!(fr, Framerate { num: 2, den: 1 });
    }

    #[test]
    fn test_single_sample_framerate_zero_duration() {
        let fr = single_sample_framerate(30, 0);
        assert_eq!(fr.den, i32::MAX as u64);
    }

    #[test]
    fn test_derive_framerate_constant_cadence() {
        // 25 fps at a 600 timescale: 24 ticks per frame, 10 samples.
        let sorted: Vec<SampleTiming> =
            (0..10).map(|i| SampleTiming { decoding_number: i + 1, cts: (i as u64) * 24 }).collect();
        let fr = derive_framerate(10, 600, &sorted).unwrap();
        assert_eq!((fr.num, fr.den), (25, 1));
    }

    #[test]
    fn test_derive_framerate_duplicate_cts_aborts() {
        let sorted = vec![
            SampleTiming { decoding_number: 1, cts: 0 },
            SampleTiming { decoding_number: 2, cts: 24 },
            SampleTiming { decoding_number: 3, cts: 24 },
            SampleTiming { decoding_number: 4, cts: 48 },
        ];
        assert!(derive_framerate(4, 600, &sorted).is_none());
    }
}

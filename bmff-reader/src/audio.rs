//! Audio Read Engine (spec §4.5).

use crate::decoder::AudioDecoder;
use crate::demuxer::{Demuxer, TrackId};
use tracing::{instrument, trace};

/// Per-track audio decode state (spec §3 "Audio Track State").
pub struct AudioTrack<A: AudioDecoder> {
    track: TrackId,
    decoder: A,
    frame_count: u32,
    total_pcm_samples: u64,
    /// Constant frames-per-packet, or 0 meaning variable (queried per packet).
    frame_length: u32,
    priming_samples: u32,
    block_align: usize,
    cursor_pcm: u64,
    cursor_frame: u32,
    remainder: Vec<u8>,
    in_buf: Vec<u8>,
}

impl<A: AudioDecoder> AudioTrack<A> {
    /// Constructs track state at prepare-time, applying the HE-AAC implicit-SBR
    /// upsampling heuristic (spec §4.5 "Priming special case").
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        track: TrackId,
        decoder: A,
        frame_count: u32,
        mut total_pcm_samples: u64,
        frame_length: u32,
        mut priming_samples: u32,
        block_align: usize,
        max_sample_size: u32,
        decoder_padding: usize,
    ) -> Self {
        if total_pcm_samples * 2 <= frame_count as u64 * frame_length as u64 {
            total_pcm_samples *= 2;
            priming_samples *= 2;
        }
        let cursor_pcm = total_pcm_samples + 1; // forces a seek on the first read
        Self {
            track,
            decoder,
            frame_count,
            total_pcm_samples,
            frame_length,
            priming_samples,
            block_align,
            cursor_pcm,
            cursor_frame: 0,
            remainder: Vec::new(),
            in_buf: vec![0u8; max_sample_size as usize + decoder_padding],
        }
    }

    pub fn total_pcm_samples(&self) -> u64 {
        self.total_pcm_samples
    }

    /// Public operation: read_audio (spec §4.5). Returns the number of PCM frames
    /// delivered, which may be fewer than `wanted_pcm` (including zero) on end-of-stream
    /// or unrecoverable decode.
    #[instrument(skip(self, demuxer, out), fields(start = start_pcm, wanted = wanted_pcm))]
    pub fn read_samples<D: Demuxer + ?Sized>(&mut self, demuxer: &D, start_pcm: u64, wanted_pcm: u64, out: &mut [u8]) -> u64 {
        let block = self.block_align;
        let mut wanted: i64 = wanted_pcm as i64;
        let mut delivered: u64 = 0;
        let mut out_off = 0usize;

        if start_pcm == self.cursor_pcm && !self.remainder.is_empty() {
            let copy_bytes = self.remainder.len().min((wanted.max(0) as u64 * block as u64) as usize);
            out[out_off..out_off + copy_bytes].copy_from_slice(&self.remainder[..copy_bytes]);
            out_off += copy_bytes;
            self.remainder.drain(..copy_bytes);
            let copied = (copy_bytes / block) as i64;
            delivered += copied as u64;
            wanted -= copied;
            if wanted <= 0 {
                self.cursor_pcm = start_pcm + delivered;
                return delivered;
            }
        }

        let (mut frame_number, mut data_offset) = if start_pcm == self.cursor_pcm {
            (self.cursor_frame + 1, 0u64)
        } else {
            if let Err(err) = self.decoder.reopen() {
                trace!(?err, "audio flush-by-reopen failed");
            }
            self.remainder.clear();
            let mut frame_number = 1;
            let mut accum: u64 = 0;
            let mut fl: u32 = 0;
            loop {
                fl = match self.frame_length_for(demuxer, frame_number) {
                    Some(v) => v,
                    None => break,
                };
                accum += fl as u64;
                if start_pcm < accum {
                    break;
                }
                frame_number += 1;
                if frame_number > self.frame_count {
                    break;
                }
            }
            let priming = self.priming_for_frame(demuxer, frame_number, fl);
            let data_offset =
                (priming as i64 + start_pcm as i64 + fl as i64 - accum as i64).max(0) as u64 * block as u64;
            (frame_number, data_offset)
        };

        while let Some(fetched) = demuxer.fetch_sample(self.track, frame_number, &mut self.in_buf) {
            let chunks = match self.decoder.decode(&self.in_buf[..fetched.len]) {
                Ok(chunks) => chunks,
                Err(err) => {
                    trace!(?err, frame_number, "audio decode failed");
                    break;
                }
            };
            let mut finished = false;
            for chunk in &chunks {
                let produced = chunk.len() as u64;
                if produced > data_offset {
                    let avail = produced - data_offset;
                    let want_bytes = wanted.max(0) as u64 * block as u64;
                    let copy_bytes = avail.min(want_bytes) as usize;
                    let start = data_offset as usize;
                    out[out_off..out_off + copy_bytes].copy_from_slice(&chunk[start..start + copy_bytes]);
                    out_off += copy_bytes;
                    let copied = (copy_bytes / block) as i64;
                    delivered += copied as u64;
                    wanted -= copied;
                    data_offset = 0;
                    if wanted <= 0 {
                        self.remainder.clear();
                        self.remainder.extend_from_slice(&chunk[copy_bytes..]);
                        finished = true;
                        break;
                    }
                } else {
                    data_offset -= produced;
                }
            }
            if finished {
                self.cursor_pcm = start_pcm + delivered;
                self.cursor_frame = frame_number;
                return delivered;
            }
            frame_number += 1;
        }

        self.cursor_pcm = start_pcm + delivered;
        self.cursor_frame = frame_number;
        delivered
    }

    fn frame_length_for<D: Demuxer + ?Sized>(&self, demuxer: &D, frame_number: u32) -> Option<u32> {
        if self.frame_length != 0 {
            Some(self.frame_length)
        } else {
            demuxer.sample_delta(self.track, frame_number)
        }
    }

    /// spec §4.5 `get_priming_samples`.
    fn priming_for_frame<D: Demuxer + ?Sized>(&self, demuxer: &D, frame_number: u32, frame_length: u32) -> u32 {
        let distance = demuxer.pre_roll_distance(self.track, frame_number);
        if distance == 0 {
            return 0;
        }
        let mut min_priming = frame_length;
        for i in 1..distance {
            match self.frame_length_for(demuxer, frame_number + i) {
                Some(fl) => min_priming += fl,
                None => break,
            }
        }
        self.priming_samples.max(min_priming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demuxer::{FetchedSample, RapDetail, SampleTiming, TrackKind};
    use crate::error::TimelineError;

    /// A variable-frame-length audio track: frame `n` (1-based) has length
    /// `frame_lengths[n - 1]` and pre-roll distance `pre_roll[n - 1]`.
    struct FakeDemuxer {
        frame_lengths: Vec<u32>,
        pre_roll: Vec<u32>,
    }

    impl Demuxer for FakeDemuxer {
        fn track_of_kind(&self, _kind: TrackKind) -> Option<TrackId> {
            None
        }
        fn media_timescale(&self, _track: TrackId) -> u64 {
            0
        }
        fn media_duration(&self, _track: TrackId) -> u64 {
            0
        }
        fn sample_count(&self, _track: TrackId) -> u32 {
            self.frame_lengths.len() as u32
        }
        fn timestamps(&self, _track: TrackId) -> Result<Vec<SampleTiming>, TimelineError> {
            Ok(vec![])
        }
        fn max_composition_delay(&self, _track: TrackId) -> Result<u32, TimelineError> {
            Ok(0)
        }
        fn closest_rap(&self, _track: TrackId, _decoding_index: u32) -> Option<u32> {
            None
        }
        fn rap_detail(&self, _track: TrackId, _decoding_index: u32) -> Option<RapDetail> {
            None
        }
        fn max_sample_size(&self, _track: TrackId) -> u32 {
            0
        }
        fn fetch_sample(&self, _track: TrackId, _decoding_index: u32, _buf: &mut [u8]) -> Option<FetchedSample> {
            None
        }
        fn edit_list_start_time(&self, _track: TrackId) -> Option<i64> {
            None
        }
        fn sample_delta(&self, _track: TrackId, frame_number: u32) -> Option<u32> {
            self.frame_lengths.get((frame_number - 1) as usize).copied()
        }
        fn pre_roll_distance(&self, _track: TrackId, frame_number: u32) -> u32 {
            self.pre_roll.get((frame_number - 1) as usize).copied().unwrap_or(0)
        }
    }

    struct NullDecoder;
    impl AudioDecoder for NullDecoder {
        fn decode(&mut self, _packet: &[u8]) -> Result<Vec<Vec<u8>>, crate::error::DecodeError> {
            Ok(vec![])
        }
        fn reopen(&mut self) -> Result<(), crate::error::DecodeError> {
            Ok(())
        }
        fn channels(&self) -> u16 {
            2
        }
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn bits_per_sample(&self) -> u16 {
            16
        }
        fn frame_length(&self) -> u32 {
            0
        }
    }

    fn track(frame_length: u32, priming_samples: u32) -> AudioTrack<NullDecoder> {
        AudioTrack::new(1, NullDecoder, 4, 4096, frame_length, priming_samples, 4, 8, 0)
    }

    #[test]
    fn test_frame_length_for_constant_ignores_demuxer() {
        let t = track(1024, 0);
        let demuxer = FakeDemuxer { frame_lengths: vec![512], pre_roll: vec![] };
        assert_eq!(t.frame_length_for(&demuxer, 1), Some(1024));
    }

    #[test]
    fn test_frame_length_for_variable_queries_demuxer() {
        let t = track(0, 0);
        let demuxer = FakeDemuxer { frame_lengths: vec![960, 1024], pre_roll: vec![] };
        assert_eq!(t.frame_length_for(&demuxer, 1), Some(960));
        assert_eq!(t.frame_length_for(&demuxer, 2), Some(1024));
        assert_eq!(t.frame_length_for(&demuxer, 3), None);
    }

    #[test]
    fn test_priming_zero_distance_ignores_configured_priming() {
        let t = track(1024, 500);
        let demuxer = FakeDemuxer { frame_lengths: vec![1024, 1024], pre_roll: vec![0, 0] };
        assert_eq!(t.priming_for_frame(&demuxer, 1, 1024), 0);
    }

    #[test]
    fn test_priming_uses_configured_value_when_it_exceeds_minimum() {
        let t = track(1024, 5000);
        let demuxer = FakeDemuxer { frame_lengths: vec![1024, 1024, 1024], pre_roll: vec![2, 0, 0] };
        // min_priming = frame_length + one subsequent frame length = 2048, dwarfed by the
        // configured 5000.
        assert_eq!(t.priming_for_frame(&demuxer, 1, 1024), 5000);
    }

    #[test]
    fn test_priming_uses_minimum_when_it_exceeds_configured_value() {
        let t = track(1024, 0);
        let demuxer = FakeDemuxer { frame_lengths: vec![1024, 1024, 1024], pre_roll: vec![2, 0, 0] };
        assert_eq!(t.priming_for_frame(&demuxer, 1, 1024), 2048);
    }

    #[test]
    fn test_he_aac_upsampling_doubles_totals_when_decoder_underreports() {
        // frame_count * frame_length = 4096 but the demuxer only reports 2048 PCM
        // samples: the implicit-SBR heuristic should double both totals.
        let t = AudioTrack::new(1, NullDecoder, 4, 2048, 1024, 100, 4, 8, 0);
        assert_eq!(t.total_pcm_samples(), 4096);
    }

    #[test]
    fn test_forces_seek_on_first_read() {
        let t = track(1024, 0);
        assert_eq!(t.cursor_pcm, t.total_pcm_samples + 1);
    }
}

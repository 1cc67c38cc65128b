//! Video Decode Engine (spec §4.3) and Seek Retry Ladder (spec §4.4).

use crate::decoder::{ColorspaceConverter, VideoDecodeOutcome, VideoDecoder};
use crate::demuxer::{Demuxer, TrackId};
use crate::error::DecodeError;
use crate::resolver::resolve_anchor;
use crate::timeline::Timeline;
use tracing::{instrument, trace};

/// Arbitrary, per spec: the number of times the Seek Retry Ladder backs up before
/// escalating to a more tolerant seek policy.
const MAX_ERROR_COUNT: u32 = 3;

/// The codec/container error-tolerance knob (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPolicy {
    /// Retries must succeed with decoder error intolerance; final fallback escalates to
    /// `Aggressive`.
    Normal,
    /// After exhausting retries, fail rather than ignore decode errors.
    Unsafe,
    /// Ignore decode errors starting from the very first seek attempt.
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodePhase {
    RequireInitial,
    Initializing,
    Initialized,
}

/// Per-track video decode state (spec §3 "Video Track State").
pub struct VideoTrack<V: VideoDecoder, C: ColorspaceConverter<V::Frame>> {
    track: TrackId,
    timeline: Timeline,
    decoder: V,
    converter: C,
    last_delivered: Option<u32>,
    last_rap: Option<u32>,
    delay_count: u32,
    decode_phase: DecodePhase,
    seek_policy: SeekPolicy,
    input_buffer: Vec<u8>,
    last_frame: Option<V::Frame>,
}

impl<V: VideoDecoder, C: ColorspaceConverter<V::Frame>> VideoTrack<V, C> {
    pub fn new(track: TrackId, timeline: Timeline, decoder: V, converter: C, seek_policy: SeekPolicy, max_sample_size: u32, decoder_padding: usize) -> Self {
        Self {
            track,
            timeline,
            decoder,
            converter,
            last_delivered: None,
            last_rap: None,
            delay_count: 0,
            decode_phase: DecodePhase::RequireInitial,
            seek_policy,
            input_buffer: vec![0u8; max_sample_size as usize + decoder_padding],
            last_frame: None,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.timeline.sample_count
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Total: reads from the precomputed bitmap, `false` for indices at or past the
    /// sample count.
    pub fn is_keyframe(&self, composition_index_0based: u32) -> bool {
        self.timeline
            .keyframe_bitmap
            .get(composition_index_0based as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Public operation: read_video (spec §4.3, wrapped by the Seek Retry Ladder of
    /// §4.4). Returns the number of bytes written (0 on unrecoverable failure).
    #[instrument(skip(self, demuxer, out), fields(c = composition_index_0based + 1))]
    pub fn read_frame<D: Demuxer + ?Sized>(&mut self, demuxer: &D, composition_index_0based: u32, out: &mut [u8]) -> usize {
        let c = composition_index_0based + 1;
        let mut policy = self.seek_policy;
        let mut anchor_d;
        let mut roll_recovery;
        let mut start_d;

        if self.last_delivered == Some(c - 1) {
            start_d = Some(c + self.delay_count);
            anchor_d = self.last_rap.unwrap_or(1);
            roll_recovery = false;
        } else {
            let resolved = resolve_anchor(demuxer, self.track, &self.timeline, c, 0);
            anchor_d = resolved.anchor_d;
            roll_recovery = resolved.roll_recovery;
            start_d = self.seek_video(demuxer, c, anchor_d, roll_recovery || policy != SeekPolicy::Normal);
        }

        let mut error_count = 0u32;
        loop {
            let ok = start_d.is_some() && self.get_picture(demuxer, start_d.unwrap(), c + self.delay_count).is_ok();
            if ok {
                break;
            }
            if policy == SeekPolicy::Aggressive {
                trace!("video read failed under aggressive policy");
                return 0;
            }
            error_count += 1;
            if error_count > MAX_ERROR_COUNT || anchor_d <= 1 {
                if policy == SeekPolicy::Unsafe {
                    trace!("video read exhausted retries under unsafe policy");
                    return 0;
                }
                policy = SeekPolicy::Aggressive;
            } else {
                let resolved = resolve_anchor(demuxer, self.track, &self.timeline, c, anchor_d - 1);
                anchor_d = resolved.anchor_d;
                roll_recovery = resolved.roll_recovery;
            }
            start_d = self.seek_video(demuxer, c, anchor_d, roll_recovery || policy != SeekPolicy::Normal);
        }

        self.last_delivered = Some(c);
        let frame = self.last_frame.take().expect("get_picture succeeded but left no frame");
        self.converter.convert(&frame, out)
    }

    /// spec §4.3 `seek_video`: flush-by-reopen, then prime the decoder from `anchor_d`
    /// up to `target_c`'s pipeline-delayed start.
    fn seek_video<D: Demuxer + ?Sized>(&mut self, demuxer: &D, target_c: u32, anchor_d: u32, ignore_errors: bool) -> Option<u32> {
        if let Err(err) = self.decoder.reopen() {
            trace!(?err, "flush-by-reopen failed");
        }
        self.delay_count = 0;
        self.decode_phase = DecodePhase::RequireInitial;

        let pipeline_depth = self.decoder.pipeline_depth();
        let discard_from_start = anchor_d + pipeline_depth < target_c;
        if discard_from_start {
            self.decoder.set_discard_nonref(true);
        }

        let end = target_c + pipeline_depth;
        let mut i = anchor_d;
        while i < end {
            if i + pipeline_depth == target_c {
                self.decoder.set_discard_nonref(false);
            }
            match self.decode_one(demuxer, i) {
                Ok(_got_frame) => {}
                Err(DecodeError::SampleAbsent(_)) => break,
                Err(_hard) if !ignore_errors => return None,
                Err(_hard) => {}
            }
            i += 1;
        }
        self.decoder.set_discard_nonref(false);
        self.delay_count = pipeline_depth;
        Some(i)
    }

    /// spec §4.3 `get_picture`: the decode drive loop.
    fn get_picture<D: Demuxer + ?Sized>(&mut self, demuxer: &D, start: u32, goal: u32) -> Result<(), DecodeError> {
        let pipeline_depth = self.decoder.pipeline_depth();
        if self.decode_phase == DecodePhase::Initializing {
            if self.delay_count > pipeline_depth {
                self.delay_count -= 1;
            } else {
                self.decode_phase = DecodePhase::Initialized;
            }
        }

        let mut current = start;
        let mut got_picture = false;
        loop {
            match self.decode_one(demuxer, current) {
                Ok(got) => got_picture = got,
                Err(DecodeError::SampleAbsent(_)) => break,
                Err(err) => return Err(err),
            }
            current += 1;
            if !got_picture {
                self.delay_count += 1;
            }
            trace!(goal, decoded = current - 1, delay_count = self.delay_count, "decode step");
            if self.delay_count > pipeline_depth && self.decode_phase == DecodePhase::Initialized {
                break;
            }
            if current > goal {
                break;
            }
        }

        if current > self.timeline.sample_count && !got_picture && pipeline_depth > 0 {
            loop {
                match self.decoder.decode(None)? {
                    VideoDecodeOutcome::Frame(frame) => {
                        self.last_frame = Some(frame);
                        got_picture = true;
                    }
                    VideoDecodeOutcome::NoFrame => {
                        got_picture = false;
                        self.delay_count += 1;
                    }
                }
                current += 1;
                if current > goal {
                    break;
                }
            }
        }

        if self.decode_phase == DecodePhase::RequireInitial {
            self.decode_phase = DecodePhase::Initializing;
        }

        if got_picture {
            Ok(())
        } else {
            Err(DecodeError::NoOutput)
        }
    }

    /// spec §4.3 `decode_one`: fetch one sample and hand it to the decoder.
    fn decode_one<D: Demuxer + ?Sized>(&mut self, demuxer: &D, d: u32) -> Result<bool, DecodeError> {
        let fetched = demuxer.fetch_sample(self.track, d, &mut self.input_buffer).ok_or(DecodeError::SampleAbsent(d))?;
        if fetched.is_sync {
            self.last_rap = Some(d);
        }
        let data = &self.input_buffer[..fetched.len];
        match self.decoder.decode(Some(data))? {
            VideoDecodeOutcome::Frame(frame) => {
                self.last_frame = Some(frame);
                Ok(true)
            }
            VideoDecodeOutcome::NoFrame => Ok(false),
        }
    }
}

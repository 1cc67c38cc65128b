//! Shared fixtures for `bmff-reader`'s test suite: a synthetic `Demuxer`/`VideoDecoder`/
//! `AudioDecoder`/`ColorspaceConverter` stack, built through [`ScenarioBuilder`], so the
//! seek/decode engine can be exercised without a real container or codec library.

use bmff_reader::{
    AudioDecoder, ColorspaceConverter, DecodeError, DecodedFrame, Demuxer, FetchedSample, PixelFormat, RapDetail,
    RapType, SampleTiming, TimelineError, TrackId, TrackKind, VideoDecodeOutcome, VideoDecoder,
};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Once;

const VIDEO_TRACK: TrackId = 1;
const AUDIO_TRACK: TrackId = 2;

static INIT_LOGGING: Once = Once::new();

/// Configures logging at the beginning of a test. Safe to call more than once.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = TermLogger::init(LevelFilter::Trace, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);
    });
}

/// A single synthetic video sample: its decoding-order payload is the decoding number
/// itself, little-endian, so [`FakeVideoDecoder`] can recover it without real bitstream
/// parsing.
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub decoding_number: u32,
    pub cts: u64,
    pub is_sync: bool,
    pub rap: Option<RapDetail>,
}

/// A single synthetic audio frame. The payload encodes the PCM sample count this frame
/// decodes to and a fill byte, so [`FakeAudioDecoder`] can produce deterministic output
/// without a real codec.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: u32,
    pub fill: u8,
    pub pre_roll_distance: u32,
}

fn encode_audio_frame(frame: &AudioFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.extend_from_slice(&frame.samples.to_le_bytes());
    buf.push(frame.fill);
    buf
}

/// The synthetic container. Built by [`ScenarioBuilder`].
pub struct FakeDemuxer {
    video: Option<FakeVideoTrack>,
    audio: Option<FakeAudioTrack>,
}

struct FakeVideoTrack {
    samples: Vec<VideoSample>,
    media_timescale: u64,
    media_duration: u64,
    max_composition_delay: u32,
}

struct FakeAudioTrack {
    frames: Vec<AudioFrame>,
    total_pcm_samples: u64,
    edit_list_start_time: Option<i64>,
}

impl Demuxer for FakeDemuxer {
    fn track_of_kind(&self, kind: TrackKind) -> Option<TrackId> {
        match kind {
            TrackKind::Video => self.video.as_ref().map(|_| VIDEO_TRACK),
            TrackKind::Audio => self.audio.as_ref().map(|_| AUDIO_TRACK),
        }
    }

    fn media_timescale(&self, track: TrackId) -> u64 {
        if track == VIDEO_TRACK {
            self.video.as_ref().map(|v| v.media_timescale).unwrap_or(0)
        } else {
            0
        }
    }

    fn media_duration(&self, track: TrackId) -> u64 {
        if track == VIDEO_TRACK {
            self.video.as_ref().map(|v| v.media_duration).unwrap_or(0)
        } else {
            self.audio.as_ref().map(|a| a.total_pcm_samples).unwrap_or(0)
        }
    }

    fn sample_count(&self, track: TrackId) -> u32 {
        if track == VIDEO_TRACK {
            self.video.as_ref().map(|v| v.samples.len() as u32).unwrap_or(0)
        } else {
            self.audio.as_ref().map(|a| a.frames.len() as u32).unwrap_or(0)
        }
    }

    fn timestamps(&self, track: TrackId) -> Result<Vec<SampleTiming>, TimelineError> {
        let video = self.video.as_ref().ok_or(TimelineError::TimestampFetchFailed)?;
        if track != VIDEO_TRACK {
            return Err(TimelineError::TimestampFetchFailed);
        }
        Ok(video.samples.iter().map(|s| SampleTiming { decoding_number: s.decoding_number, cts: s.cts }).collect())
    }

    fn max_composition_delay(&self, track: TrackId) -> Result<u32, TimelineError> {
        if track == VIDEO_TRACK {
            Ok(self.video.as_ref().map(|v| v.max_composition_delay).unwrap_or(0))
        } else {
            Err(TimelineError::DelayQueryFailed)
        }
    }

    fn closest_rap(&self, track: TrackId, decoding_index: u32) -> Option<u32> {
        let video = self.video.as_ref()?;
        if track != VIDEO_TRACK {
            return None;
        }
        video
            .samples
            .iter()
            .filter(|s| s.is_sync && s.decoding_number <= decoding_index)
            .map(|s| s.decoding_number)
            .max()
    }

    fn rap_detail(&self, track: TrackId, decoding_index: u32) -> Option<RapDetail> {
        let video = self.video.as_ref()?;
        if track != VIDEO_TRACK {
            return None;
        }
        video.samples.iter().find(|s| s.decoding_number == decoding_index).and_then(|s| s.rap)
    }

    fn max_sample_size(&self, track: TrackId) -> u32 {
        if track == VIDEO_TRACK {
            12
        } else {
            5
        }
    }

    fn fetch_sample(&self, track: TrackId, decoding_index: u32, buf: &mut [u8]) -> Option<FetchedSample> {
        if track == VIDEO_TRACK {
            let video = self.video.as_ref()?;
            let sample = video.samples.iter().find(|s| s.decoding_number == decoding_index)?;
            buf[..4].copy_from_slice(&sample.decoding_number.to_le_bytes());
            buf[4..12].copy_from_slice(&sample.cts.to_le_bytes());
            Some(FetchedSample { len: 12, is_sync: sample.is_sync })
        } else {
            let audio = self.audio.as_ref()?;
            let frame = audio.frames.get((decoding_index - 1) as usize)?;
            let bytes = encode_audio_frame(frame);
            buf[..bytes.len()].copy_from_slice(&bytes);
            Some(FetchedSample { len: bytes.len(), is_sync: true })
        }
    }

    fn edit_list_start_time(&self, track: TrackId) -> Option<i64> {
        if track == AUDIO_TRACK {
            self.audio.as_ref().and_then(|a| a.edit_list_start_time)
        } else {
            None
        }
    }

    fn sample_delta(&self, track: TrackId, frame_number: u32) -> Option<u32> {
        if track != AUDIO_TRACK {
            return None;
        }
        let audio = self.audio.as_ref()?;
        audio.frames.get((frame_number - 1) as usize).map(|f| f.samples)
    }

    fn pre_roll_distance(&self, track: TrackId, frame_number: u32) -> u32 {
        if track != AUDIO_TRACK {
            return 0;
        }
        self.audio
            .as_ref()
            .and_then(|a| a.frames.get((frame_number - 1) as usize))
            .map(|f| f.pre_roll_distance)
            .unwrap_or(0)
    }
}

/// A synthetic decoded video frame: just the decoding number it was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeFrame {
    pub decoding_number: u32,
}

impl DecodedFrame for FakeFrame {}

/// A video decoder that reproduces B-frame-reordering pipeline delay without any real
/// bitstream parsing: packets are fed in decoding order (4-byte decoding number + 8-byte
/// composition timestamp), held in a min-heap keyed on composition timestamp, and
/// released in composition order once the heap holds more than `pipeline_depth` frames —
/// the same way a real decoder buffers B-frame-referenced pictures before presenting
/// them. Can be told to hard-fail on specific decoding numbers to exercise the Seek
/// Retry Ladder.
pub struct FakeVideoDecoder {
    pipeline_depth: u32,
    frame_size: (u32, u32),
    fail_on: HashSet<u32>,
    pending: BinaryHeap<Reverse<(u64, u32)>>,
    discard_nonref: bool,
}

impl FakeVideoDecoder {
    pub fn new(pipeline_depth: u32, frame_size: (u32, u32)) -> Self {
        Self {
            pipeline_depth,
            frame_size,
            fail_on: HashSet::new(),
            pending: BinaryHeap::new(),
            discard_nonref: false,
        }
    }

    pub fn fail_on(mut self, decoding_numbers: impl IntoIterator<Item = u32>) -> Self {
        self.fail_on.extend(decoding_numbers);
        self
    }
}

impl VideoDecoder for FakeVideoDecoder {
    type Frame = FakeFrame;

    fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    fn pipeline_depth(&self) -> u32 {
        self.pipeline_depth
    }

    fn set_discard_nonref(&mut self, discard: bool) {
        self.discard_nonref = discard;
    }

    fn decode(&mut self, packet: Option<&[u8]>) -> Result<VideoDecodeOutcome<Self::Frame>, DecodeError> {
        if let Some(data) = packet {
            let decoding_number = u32::from_le_bytes(data[..4].try_into().unwrap());
            if self.fail_on.contains(&decoding_number) {
                return Err(DecodeError::Hard);
            }
            let cts = u64::from_le_bytes(data[4..12].try_into().unwrap());
            self.pending.push(Reverse((cts, decoding_number)));
        }
        if packet.is_none() || self.pending.len() as u32 > self.pipeline_depth {
            match self.pending.pop() {
                Some(Reverse((_cts, decoding_number))) => Ok(VideoDecodeOutcome::Frame(FakeFrame { decoding_number })),
                None => Ok(VideoDecodeOutcome::NoFrame),
            }
        } else {
            Ok(VideoDecodeOutcome::NoFrame)
        }
    }

    fn reopen(&mut self) -> Result<(), DecodeError> {
        self.pending.clear();
        Ok(())
    }
}

/// Converts a [`FakeFrame`] to its 4-byte little-endian decoding number, so tests can
/// assert on exactly which source sample a given composition read resolved to.
pub struct FakeColorspaceConverter {
    pixel_format: PixelFormat,
}

impl FakeColorspaceConverter {
    pub fn new(pixel_format: PixelFormat) -> Self {
        Self { pixel_format }
    }
}

impl ColorspaceConverter<FakeFrame> for FakeColorspaceConverter {
    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn convert(&mut self, frame: &FakeFrame, out: &mut [u8]) -> usize {
        let bytes = frame.decoding_number.to_le_bytes();
        let len = bytes.len().min(out.len());
        out[..len].copy_from_slice(&bytes[..len]);
        len
    }
}

/// An audio decoder that decodes the synthetic 5-byte frame payload (`samples: u32 LE`,
/// `fill: u8`) into `samples * block_align` bytes of the fill byte, so tests can assert
/// exactly which source frame a given PCM range was read from.
pub struct FakeAudioDecoder {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    frame_length: u32,
}

impl FakeAudioDecoder {
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16, frame_length: u32) -> Self {
        Self { channels, sample_rate, bits_per_sample, frame_length }
    }

    fn block_align(&self) -> usize {
        (self.channels as usize * self.bits_per_sample as usize) / 8
    }
}

impl AudioDecoder for FakeAudioDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError> {
        let samples = u32::from_le_bytes(packet[..4].try_into().unwrap());
        let fill = packet[4];
        Ok(vec![vec![fill; samples as usize * self.block_align()]])
    }

    fn reopen(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    fn frame_length(&self) -> u32 {
        self.frame_length
    }
}

/// Builds a [`FakeDemuxer`] (and matching decoder/converter fixtures) one track at a
/// time, for the seed scenarios in the reader's testable-properties list.
#[derive(Default)]
pub struct ScenarioBuilder {
    video: Option<FakeVideoTrack>,
    audio: Option<FakeAudioTrack>,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(
        mut self,
        samples: Vec<VideoSample>,
        media_timescale: u64,
        media_duration: u64,
        max_composition_delay: u32,
    ) -> Self {
        self.video = Some(FakeVideoTrack { samples, media_timescale, media_duration, max_composition_delay });
        self
    }

    pub fn with_audio(mut self, frames: Vec<AudioFrame>, total_pcm_samples: u64, edit_list_start_time: Option<i64>) -> Self {
        self.audio = Some(FakeAudioTrack { frames, total_pcm_samples, edit_list_start_time });
        self
    }

    pub fn build(self) -> FakeDemuxer {
        FakeDemuxer { video: self.video, audio: self.audio }
    }
}

/// IPP cadence, no B-frames: identity order map, every third sample a sync sample.
pub fn ipp_no_bframes(count: u32) -> FakeDemuxer {
    let samples = (1..=count)
        .map(|d| VideoSample {
            decoding_number: d,
            cts: d as u64,
            is_sync: d == 1,
            rap: Some(RapDetail { rap: 1, rap_type: RapType::Sync, leading_count: 0, distance: 0 }),
        })
        .collect();
    ScenarioBuilder::new().with_video(samples, 25, count as u64, 0).build()
}

/// IBBP cadence with a composition delay of 2: decode order is I1 P4 B2 B3 P7 B5 B6 for
/// composition order I1 B2 B3 P4 B5 B6 P7, i.e. `decoding_number_for_composition[c]` below
/// gives each composition position's decoding number.
pub fn ibbp_composition_delay_2() -> FakeDemuxer {
    let decoding_number_for_composition = [1u32, 3, 4, 2, 6, 7, 5];
    let samples = decoding_number_for_composition
        .iter()
        .enumerate()
        .map(|(i, &decoding_number)| VideoSample {
            decoding_number,
            cts: (i as u64) + 1,
            is_sync: decoding_number == 1,
            rap: Some(RapDetail { rap: 1, rap_type: RapType::Sync, leading_count: 0, distance: 0 }),
        })
        .collect();
    ScenarioBuilder::new().with_video(samples, 25, 7, 2).build()
}

/// HE-AAC implicit-SBR track: the demuxer's PCM sample count is exactly half of what the
/// decoder will actually produce, triggering the upsampling heuristic.
pub fn he_aac_upsampling() -> (FakeDemuxer, FakeAudioDecoder) {
    let frame_count = 4;
    let frame_length = 1024;
    let frames = (0..frame_count)
        .map(|i| AudioFrame { samples: frame_length, fill: i as u8, pre_roll_distance: 0 })
        .collect();
    let total_pcm_samples = (frame_count as u64 * frame_length as u64) / 2;
    let demuxer = ScenarioBuilder::new().with_audio(frames, total_pcm_samples, None).build();
    (demuxer, FakeAudioDecoder::new(2, 44100, 16, frame_length))
}

/// An edit list with a positive start time, producing nonzero baseline priming samples.
/// The first frame carries a nonzero `pre_roll_distance` so `priming_for_frame` doesn't
/// take its `distance == 0` early-out and the configured priming is actually applied.
pub fn edit_list_priming(priming: i64) -> (FakeDemuxer, FakeAudioDecoder) {
    let frame_count = 4;
    let frame_length = 1024;
    let frames = (0..frame_count)
        .map(|i| AudioFrame { samples: frame_length, fill: i as u8, pre_roll_distance: u32::from(i == 0) })
        .collect();
    let total_pcm_samples = frame_count as u64 * frame_length as u64;
    let demuxer = ScenarioBuilder::new().with_audio(frames, total_pcm_samples, Some(priming)).build();
    (demuxer, FakeAudioDecoder::new(2, 44100, 16, frame_length))
}

//! The reader handle (spec §6 External Interfaces): ties the Timeline Builder, Resolver,
//! Video Decode Engine and Audio Read Engine to a single open container.

use crate::decoder::{AudioDecoder, ColorspaceConverter, VideoDecoder};
use crate::demuxer::{Demuxer, TrackKind};
use crate::error::OpenError;
use crate::timeline::build_timeline;
use crate::video::SeekPolicy;
use crate::{audio::AudioTrack, video::VideoTrack};
use tracing::{instrument, trace};

/// The input-buffer slack every codec decoder is assumed to require past the bytes
/// actually read from the container, mirroring `FF_INPUT_BUFFER_PADDING_SIZE`.
pub const DECODER_PADDING_BYTES: usize = 32;

/// Host-tunable knobs for a [`Reader`] (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Decoder thread count, fed into a host's `VideoDecoder::pipeline_depth` along with
    /// `has_b_frames`.
    pub threads: u32,
    pub seek_policy: SeekPolicy,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { threads: 1, seek_policy: SeekPolicy::Normal }
    }
}

/// Output bitmap header for a bound video track (a `BITMAPINFOHEADER` in the system this
/// was distilled from).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
    pub fourcc: u32,
}

/// `WAVE_FORMAT_PCM` vs `WAVE_FORMAT_EXTENSIBLE`, selected the same way the system this
/// was distilled from selects it: anything other than 8 or 16 bits per sample needs the
/// extensible form to carry `valid_bits_per_sample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormatTag {
    Pcm,
    Extensible,
}

/// Output wave header for a bound audio track (a `WAVEFORMATEXTENSIBLE` in the system
/// this was distilled from).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub block_align: u16,
    pub avg_bytes_per_sec: u32,
    pub format_tag: AudioFormatTag,
    /// Only meaningful when `format_tag` is `Extensible`.
    pub valid_bits_per_sample: u16,
}

/// A video track found by `bind_first_video` but not yet run through `prepare_video`:
/// the host's decoder/converter are already opened, but the timeline hasn't been built
/// and no buffers are sized yet.
struct PendingVideo<V, C> {
    track: crate::demuxer::TrackId,
    decoder: V,
    converter: C,
    seek_policy: SeekPolicy,
}

/// Same as [`PendingVideo`], for the audio side.
struct PendingAudio<A> {
    track: crate::demuxer::TrackId,
    decoder: A,
}

/// The random-access frame/sample reader handle.
///
/// Generic over the four external collaborators (spec §4.6): `D` demuxes the container,
/// `V`/`A` decode video/audio, and `C` converts decoded video frames to an output pixel
/// format. A host wires up concrete implementations over its own demuxer and codec
/// libraries; this crate implements only the seek/decode orchestration around them.
///
/// Binding a track is a two-step affair, mirroring the original's separate track-lookup
/// and buffer/timeline-setup passes (`get_first_video_track` vs `prepare_video_decoding`):
/// `bind_first_video`/`bind_first_audio` locate the track and stash the host's
/// already-opened decoder, and `prepare_video`/`prepare_audio` build the timeline, size
/// the buffers, and report the output format.
pub struct Reader<D, V, A, C>
where
    D: Demuxer,
    V: VideoDecoder,
    A: AudioDecoder,
    C: ColorspaceConverter<V::Frame>,
{
    demuxer: D,
    pending_video: Option<PendingVideo<V, C>>,
    pending_audio: Option<PendingAudio<A>>,
    video: Option<VideoTrack<V, C>>,
    audio: Option<AudioTrack<A>>,
}

impl<D, V, A, C> Reader<D, V, A, C>
where
    D: Demuxer,
    V: VideoDecoder,
    A: AudioDecoder,
    C: ColorspaceConverter<V::Frame>,
{
    /// Wraps an already-opened demuxer with no tracks bound yet.
    pub fn new(demuxer: D) -> Self {
        Self { demuxer, pending_video: None, pending_audio: None, video: None, audio: None }
    }

    pub fn demuxer(&self) -> &D {
        &self.demuxer
    }

    /// Locates the first video track, if any, and stashes the host's already-opened
    /// `decoder`/`converter` for it. Returns whether a track was found; call
    /// `prepare_video` next to build its timeline and get its output format (spec §6,
    /// the original's `get_first_video_track` half of track setup).
    #[instrument(skip(self, decoder, converter, options))]
    pub fn bind_first_video(&mut self, decoder: V, converter: C, options: &ReaderOptions) -> Result<bool, OpenError> {
        let track = match self.demuxer.track_of_kind(TrackKind::Video) {
            Some(track) => track,
            None => {
                trace!(kind = TrackKind::Video.name(), "no track of kind found");
                return Ok(false);
            }
        };
        self.pending_video = Some(PendingVideo { track, decoder, converter, seek_policy: options.seek_policy });
        Ok(true)
    }

    /// Builds the timeline and sizes the input buffer for the track found by
    /// `bind_first_video`, reporting its output format. Returns `Ok(None)` if no video
    /// track was bound (the original's `prepare_video_decoding` no-ops the same way when
    /// `hp->video_ctx` is null).
    #[instrument(skip(self))]
    pub fn prepare_video(&mut self) -> Result<Option<VideoFormat>, OpenError> {
        let pending = match self.pending_video.take() {
            Some(pending) => pending,
            None => return Ok(None),
        };
        let timeline = build_timeline(&self.demuxer, pending.track)?;
        let max_sample_size = self.demuxer.max_sample_size(pending.track);
        if max_sample_size == 0 {
            return Err(OpenError::Allocation("video input buffer"));
        }

        let (width, height) = pending.decoder.frame_size();
        let pixel_format = pending.converter.pixel_format();
        let format =
            VideoFormat { width, height, bits_per_pixel: pixel_format.bits_per_pixel(), fourcc: pixel_format.fourcc() };

        self.video = Some(VideoTrack::new(
            pending.track,
            timeline,
            pending.decoder,
            pending.converter,
            pending.seek_policy,
            max_sample_size,
            DECODER_PADDING_BYTES,
        ));
        Ok(Some(format))
    }

    /// Locates the first audio track, if any, and stashes the host's already-opened
    /// `decoder` for it. Returns whether a track was found; call `prepare_audio` next to
    /// apply the HE-AAC priming heuristic and get its output format.
    #[instrument(skip(self, decoder, options))]
    pub fn bind_first_audio(&mut self, decoder: A, options: &ReaderOptions) -> Result<bool, OpenError> {
        let _ = options;
        let track = match self.demuxer.track_of_kind(TrackKind::Audio) {
            Some(track) => track,
            None => {
                trace!(kind = TrackKind::Audio.name(), "no track of kind found");
                return Ok(false);
            }
        };
        self.pending_audio = Some(PendingAudio { track, decoder });
        Ok(true)
    }

    /// Applies the HE-AAC priming heuristic and sizes the input buffer for the track
    /// found by `bind_first_audio`, reporting its output format. Returns `Ok(None)` if no
    /// audio track was bound.
    #[instrument(skip(self))]
    pub fn prepare_audio(&mut self) -> Result<Option<AudioFormat>, OpenError> {
        let pending = match self.pending_audio.take() {
            Some(pending) => pending,
            None => return Ok(None),
        };
        let track = pending.track;
        let decoder = pending.decoder;
        let max_sample_size = self.demuxer.max_sample_size(track);
        if max_sample_size == 0 {
            return Err(OpenError::Allocation("audio input buffer"));
        }
        let frame_count = self.demuxer.sample_count(track);
        let total_pcm_samples = self.demuxer.media_duration(track);
        let priming_samples = self.demuxer.edit_list_start_time(track).unwrap_or(0).max(0) as u32;

        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let bits_per_sample = decoder.bits_per_sample();
        let frame_length = decoder.frame_length();
        let block_align = (channels as u32 * bits_per_sample as u32 / 8) as usize;

        let (format_tag, valid_bits_per_sample) = if bits_per_sample == 8 || bits_per_sample == 16 {
            (AudioFormatTag::Pcm, 0)
        } else {
            (AudioFormatTag::Extensible, bits_per_sample)
        };
        let format = AudioFormat {
            channels,
            sample_rate,
            bits_per_sample,
            block_align: block_align as u16,
            avg_bytes_per_sec: sample_rate * block_align as u32,
            format_tag,
            valid_bits_per_sample,
        };

        self.audio = Some(AudioTrack::new(
            track,
            decoder,
            frame_count,
            total_pcm_samples,
            frame_length,
            priming_samples,
            block_align,
            max_sample_size,
            DECODER_PADDING_BYTES,
        ));
        Ok(Some(format))
    }

    /// Releases demuxer parser scratch state once both tracks (or the absence of either)
    /// have been bound.
    pub fn discard_demuxer_boxes(&mut self) {
        self.demuxer.discard_scratch();
    }

    pub fn video_sample_count(&self) -> Option<u32> {
        self.video.as_ref().map(|v| v.sample_count())
    }

    pub fn audio_pcm_sample_count(&self) -> Option<u64> {
        self.audio.as_ref().map(|a| a.total_pcm_samples())
    }

    pub fn is_keyframe(&self, composition_index_0based: u32) -> bool {
        self.video.as_ref().map(|v| v.is_keyframe(composition_index_0based)).unwrap_or(false)
    }

    /// Reads one decoded, colorspace-converted video frame into `out`. Returns the
    /// number of bytes written (0 if no video track is bound, or on unrecoverable
    /// failure).
    pub fn read_video(&mut self, composition_index_0based: u32, out: &mut [u8]) -> usize {
        match &mut self.video {
            Some(video) => video.read_frame(&self.demuxer, composition_index_0based, out),
            None => 0,
        }
    }

    /// Reads up to `wanted_pcm` PCM frames starting at `start_pcm` into `out`. Returns
    /// the number of PCM frames actually delivered (0 if no audio track is bound).
    pub fn read_audio(&mut self, start_pcm: u64, wanted_pcm: u64, out: &mut [u8]) -> u64 {
        match &mut self.audio {
            Some(audio) => audio.read_samples(&self.demuxer, start_pcm, wanted_pcm, out),
            None => 0,
        }
    }

    /// Releases the bound video track's decoder and converter, in that order.
    pub fn video_cleanup(&mut self) {
        self.video = None;
    }

    /// Releases the bound audio track's decoder.
    pub fn audio_cleanup(&mut self) {
        self.audio = None;
    }
}

impl<D, V, A, C> Drop for Reader<D, V, A, C>
where
    D: Demuxer,
    V: VideoDecoder,
    A: AudioDecoder,
    C: ColorspaceConverter<V::Frame>,
{
    /// Tears down in the reverse order of binding: audio, then video, then the demuxer's
    /// own `Drop`.
    fn drop(&mut self) {
        self.audio_cleanup();
        self.video_cleanup();
    }
}

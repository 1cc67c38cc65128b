#![deny(
    absolute_paths_not_starting_with_crate,
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unreachable_patterns,
    unused_import_braces,
    unused_lifetimes,
    unused_must_use,
    unused_qualifications
)]

pub mod audio;
pub mod decoder;
pub mod demuxer;
pub mod error;
pub mod reader;
pub mod resolver;
pub mod timeline;
pub mod video;

pub use audio::AudioTrack;
pub use decoder::{AudioDecoder, ColorspaceConverter, DecodedFrame, PixelFormat, VideoDecodeOutcome, VideoDecoder};
pub use demuxer::{Demuxer, FetchedSample, RapDetail, RapType, SampleTiming, TrackId, TrackKind};
pub use error::{DecodeError, OpenError, ReadError, TimelineError};
pub use reader::{AudioFormat, AudioFormatTag, Reader, ReaderOptions, VideoFormat};
pub use resolver::Resolved;
pub use timeline::{Framerate, Timeline};
pub use video::{SeekPolicy, VideoTrack};

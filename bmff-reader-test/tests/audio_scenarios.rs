use bmff_reader::{AudioDecoder, AudioFormatTag, Reader, ReaderOptions};
use bmff_reader_test::{self as fixtures, FakeAudioDecoder, FakeColorspaceConverter, FakeDemuxer, FakeVideoDecoder};

type AReader = Reader<FakeDemuxer, FakeVideoDecoder, FakeAudioDecoder, FakeColorspaceConverter>;

#[test]
fn he_aac_implicit_sbr_doubles_reported_totals() {
    fixtures::init_logging();
    let (demuxer, decoder) = fixtures::he_aac_upsampling();
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder, &ReaderOptions::default()).unwrap();
    reader.prepare_audio().unwrap().expect("audio track bound");

    // The demuxer only reports 2048 PCM samples (half the 4 frames * 1024 samples the
    // decoder will actually produce); binding should double it.
    assert_eq!(reader.audio_pcm_sample_count(), Some(4096));
}

#[test]
fn he_aac_full_span_read_recovers_every_frames_fill_byte() {
    fixtures::init_logging();
    let (demuxer, decoder) = fixtures::he_aac_upsampling();
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder, &ReaderOptions::default()).unwrap();
    reader.prepare_audio().unwrap();

    let total = reader.audio_pcm_sample_count().unwrap();
    let block_align = 4; // 2 channels * 16 bits / 8
    let mut out = vec![0u8; (total as usize) * block_align];
    let delivered = reader.read_audio(0, total, &mut out);
    assert_eq!(delivered, total);

    for (frame, chunk) in out.chunks(1024 * block_align).enumerate() {
        assert!(chunk.iter().all(|&b| b == frame as u8), "frame {frame} should be filled with its own byte");
    }
}

#[test]
fn continuation_read_picks_up_where_the_previous_one_left_off() {
    fixtures::init_logging();
    let (demuxer, decoder) = fixtures::he_aac_upsampling();
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder, &ReaderOptions::default()).unwrap();
    reader.prepare_audio().unwrap();

    let block_align = 4;
    let mut first = vec![0u8; 100 * block_align];
    let delivered = reader.read_audio(0, 100, &mut first);
    assert_eq!(delivered, 100);

    let mut second = vec![0u8; 200 * block_align];
    let delivered = reader.read_audio(100, 200, &mut second);
    assert_eq!(delivered, 200);
    // Both reads stay inside frame 0 (fill byte 0) since it spans samples 0..1024.
    assert!(second.iter().all(|&b| b == 0));
}

#[test]
fn near_end_read_is_truncated_to_whats_left() {
    fixtures::init_logging();
    let (demuxer, decoder) = fixtures::he_aac_upsampling();
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder, &ReaderOptions::default()).unwrap();
    reader.prepare_audio().unwrap();

    let total = reader.audio_pcm_sample_count().unwrap();
    let block_align = 4;
    let mut out = vec![0u8; 500 * block_align];
    let delivered = reader.read_audio(total - 200, 500, &mut out);
    assert_eq!(delivered, 200);
}

#[test]
fn variable_frame_length_walk_forward_lands_on_the_right_frame() {
    fixtures::init_logging();
    use fixtures::AudioFrame;
    let frames = vec![
        AudioFrame { samples: 960, fill: 10, pre_roll_distance: 0 },
        AudioFrame { samples: 1024, fill: 11, pre_roll_distance: 0 },
        AudioFrame { samples: 512, fill: 12, pre_roll_distance: 0 },
    ];
    let total = 960 + 1024 + 512;
    let demuxer = fixtures::ScenarioBuilder::new().with_audio(frames, total, None).build();
    // frame_length 0 tells AudioTrack to consult the demuxer's per-frame sample_delta.
    let decoder = FakeAudioDecoder::new(2, 44100, 16, 0);
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder, &ReaderOptions::default()).unwrap();
    reader.prepare_audio().unwrap();

    let block_align = 4;
    // Seek into frame 2 (starts at PCM sample 1984) and check its fill byte comes back.
    let mut out = vec![0u8; 100 * block_align];
    let delivered = reader.read_audio(2000, 100, &mut out);
    assert_eq!(delivered, 100);
    assert!(out.iter().all(|&b| b == 12));
}

#[test]
fn edit_list_priming_skip_and_delivery_sharing_a_chunk_keeps_the_remainder_aligned() {
    fixtures::init_logging();
    // Priming (1200 samples) spans all of frame 0 (1024 samples, fill 0) plus 176
    // samples into frame 1 (fill 1): the skip and the first delivered bytes land in
    // the same decoded chunk, which is exactly the case that a remainder computed
    // from the wrong offset gets wrong.
    let (demuxer, decoder) = fixtures::edit_list_priming(1200);
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder, &ReaderOptions::default()).unwrap();
    reader.prepare_audio().unwrap();

    let block_align = 4;
    let mut first = vec![0u8; 100 * block_align];
    let delivered = reader.read_audio(0, 100, &mut first);
    assert_eq!(delivered, 100);
    assert!(first.iter().all(|&b| b == 1), "first 100 post-priming samples come from frame 1 (fill 1)");

    // Continue reading past the remainder left over from frame 1, through all of frame
    // 2 (fill 2), into frame 3 (fill 3). Where the fill value changes pins down exactly
    // how many bytes the remainder carried forward.
    let mut second = vec![0u8; 2000 * block_align];
    let delivered = reader.read_audio(100, 2000, &mut second);
    assert_eq!(delivered, 2000);

    let fill_at = |sample: usize| second[sample * block_align];
    // The remainder is sized from the chunk's own origin, not from the stale
    // pre-priming offset, so it carries forward 924 samples of frame 1 here.
    assert_eq!(fill_at(0), 1, "still inside frame 1's remainder");
    assert_eq!(fill_at(923), 1, "last sample still frame 1's remainder");
    assert_eq!(fill_at(924), 2, "frame 2 starts right after the remainder");
    assert_eq!(fill_at(1947), 2, "last sample of frame 2");
    assert_eq!(fill_at(1948), 3, "frame 3 starts for the final 52 samples");
    assert_eq!(fill_at(1999), 3);
}

#[test]
fn audio_format_uses_extensible_tag_for_non_8_or_16_bit_depth() {
    let (demuxer, decoder) = fixtures::he_aac_upsampling();
    let decoder_24bit = FakeAudioDecoder::new(decoder.channels(), decoder.sample_rate(), 24, 1024);
    let mut reader = AReader::new(demuxer);
    reader.bind_first_audio(decoder_24bit, &ReaderOptions::default()).unwrap();
    let format = reader.prepare_audio().unwrap().unwrap();
    assert_eq!(format.format_tag, AudioFormatTag::Extensible);
    assert_eq!(format.valid_bits_per_sample, 24);
}

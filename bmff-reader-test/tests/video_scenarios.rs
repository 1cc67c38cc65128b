use bmff_reader::{PixelFormat, Reader, ReaderOptions, SeekPolicy};
use bmff_reader_test::{self as fixtures, FakeAudioDecoder, FakeColorspaceConverter, FakeDemuxer, FakeVideoDecoder};

type VReader = Reader<FakeDemuxer, FakeVideoDecoder, FakeAudioDecoder, FakeColorspaceConverter>;

fn read_u32(reader: &mut VReader, c: u32) -> u32 {
    let mut out = [0u8; 4];
    let written = reader.read_video(c, &mut out);
    assert_eq!(written, 4, "expected a full frame at composition index {c}");
    u32::from_le_bytes(out)
}

#[test]
fn ipp_fast_path_delivers_identity_order() {
    fixtures::init_logging();
    let demuxer = fixtures::ipp_no_bframes(6);
    let mut reader = VReader::new(demuxer);
    reader
        .bind_first_video(FakeVideoDecoder::new(0, (320, 240)), FakeColorspaceConverter::new(PixelFormat::Yuy2), &ReaderOptions::default())
        .unwrap();
    reader.prepare_video().unwrap().expect("video track bound");

    for c in 0..6 {
        assert_eq!(read_u32(&mut reader, c), c + 1);
    }
}

#[test]
fn ipp_keyframe_bitmap_marks_only_the_first_sample() {
    let demuxer = fixtures::ipp_no_bframes(4);
    let mut reader = VReader::new(demuxer);
    reader
        .bind_first_video(FakeVideoDecoder::new(0, (320, 240)), FakeColorspaceConverter::new(PixelFormat::Yuy2), &ReaderOptions::default())
        .unwrap();
    reader.prepare_video().unwrap();
    assert!(reader.is_keyframe(0));
    assert!(!reader.is_keyframe(1));
    assert!(!reader.is_keyframe(3));
}

#[test]
fn ibbp_composition_delay_two_reorders_to_presentation_order() {
    fixtures::init_logging();
    let demuxer = fixtures::ibbp_composition_delay_2();
    let mut reader = VReader::new(demuxer);
    reader
        .bind_first_video(FakeVideoDecoder::new(2, (320, 240)), FakeColorspaceConverter::new(PixelFormat::Yuy2), &ReaderOptions::default())
        .unwrap();
    reader.prepare_video().unwrap().expect("video track bound");

    let expected_decoding_numbers = [1u32, 3, 4, 2, 6, 7, 5];
    for (c, &expected) in expected_decoding_numbers.iter().enumerate() {
        assert_eq!(read_u32(&mut reader, c as u32), expected, "composition index {c}");
    }
}

#[test]
fn seek_back_escalates_retry_ladder_past_hard_decode_errors() {
    fixtures::init_logging();
    let demuxer = fixtures::ipp_no_bframes(10);
    let mut reader = VReader::new(demuxer);
    // Every anchor the resolver would try below decoding number 5 hard-fails; only the
    // Aggressive policy (which ignores decode errors) can still produce output.
    let decoder = FakeVideoDecoder::new(0, (320, 240)).fail_on([1, 2, 3, 4]);
    reader
        .bind_first_video(
            decoder,
            FakeColorspaceConverter::new(PixelFormat::Yuy2),
            &ReaderOptions { threads: 1, seek_policy: SeekPolicy::Normal },
        )
        .unwrap();
    reader.prepare_video().unwrap().expect("video track bound");

    // Seeking to composition index 4 (decoding number 5) anchors at decoding number 1,
    // which hard-fails immediately; Normal policy should still recover by escalating.
    let mut out = [0u8; 4];
    let written = reader.read_video(4, &mut out);
    assert_eq!(written, 4);
    assert_eq!(u32::from_le_bytes(out), 5);
}

#[test]
fn unsafe_policy_gives_up_once_retries_are_exhausted() {
    let demuxer = fixtures::ipp_no_bframes(10);
    let mut reader = VReader::new(demuxer);
    let decoder = FakeVideoDecoder::new(0, (320, 240)).fail_on([1, 2, 3, 4, 5]);
    reader
        .bind_first_video(
            decoder,
            FakeColorspaceConverter::new(PixelFormat::Yuy2),
            &ReaderOptions { threads: 1, seek_policy: SeekPolicy::Unsafe },
        )
        .unwrap();
    reader.prepare_video().unwrap().expect("video track bound");

    let mut out = [0u8; 4];
    let written = reader.read_video(4, &mut out);
    assert_eq!(written, 0);
}

#[test]
fn read_video_at_end_of_stream_flushes_the_pipeline() {
    fixtures::init_logging();
    let demuxer = fixtures::ibbp_composition_delay_2();
    let mut reader = VReader::new(demuxer);
    reader
        .bind_first_video(FakeVideoDecoder::new(2, (320, 240)), FakeColorspaceConverter::new(PixelFormat::Yuy2), &ReaderOptions::default())
        .unwrap();
    reader.prepare_video().unwrap();

    let last = reader.video_sample_count().unwrap() - 1;
    assert_eq!(read_u32(&mut reader, last), 5);
}

use super::*;

use std::io::Cursor;

use image::{AnimationDecoder, Rgba, RgbaImage};

use crate::foundation::core::FrameIndex;

fn frame(i: u64, px: [u8; 4]) -> Frame {
    Frame::new(FrameIndex(i), RgbaImage::from_pixel(8, 6, Rgba(px)))
}

#[test]
fn encodes_every_frame_with_delay() {
    let frames = vec![
        frame(0, [255, 0, 0, 255]),
        frame(1, [0, 255, 0, 255]),
        frame(2, [0, 0, 255, 255]),
    ];
    let timing = FrameTiming {
        frame_delay_ms: 120,
        loop_count: 0,
    };
    let bytes = GifEncoder::new().encode(frames, &timing).unwrap();
    assert_eq!(&bytes[..6], b"GIF89a");

    let decoded = image::codecs::gif::GifDecoder::new(Cursor::new(bytes))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(decoded.len(), 3);
    for f in &decoded {
        assert_eq!(f.delay().numer_denom_ms(), (120, 1));
        assert_eq!(f.buffer().dimensions(), (8, 6));
    }
    let px = decoded[1].buffer().get_pixel(0, 0).0;
    assert!(px[1] > 200 && px[0] < 50 && px[2] < 50, "{px:?}");
}

#[test]
fn transparent_pixels_survive() {
    let mut img = RgbaImage::from_pixel(4, 4, Rgba([10, 200, 10, 255]));
    img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
    let frames = vec![Frame::new(FrameIndex(0), img)];
    let bytes = GifEncoder::new()
        .encode(frames, &FrameTiming::default())
        .unwrap();

    let decoded = image::codecs::gif::GifDecoder::new(Cursor::new(bytes))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(decoded[0].buffer().get_pixel(0, 0).0[3], 0);
    assert_eq!(decoded[0].buffer().get_pixel(1, 1).0[3], 255);
}

#[test]
fn empty_or_mismatched_sequences_are_rejected() {
    let mut enc = GifEncoder::with_speed(99);
    assert!(enc.encode(Vec::new(), &FrameTiming::default()).is_err());

    let frames = vec![
        frame(0, [0, 0, 0, 255]),
        Frame::new(FrameIndex(1), RgbaImage::new(2, 2)),
    ];
    let err = enc.encode(frames, &FrameTiming::default()).unwrap_err();
    assert!(err.to_string().contains("frame 1 is 2x2"), "{err}");
}

#[test]
fn delay_rounds_to_centiseconds() {
    assert_eq!(delay_centis(120), 12);
    assert_eq!(delay_centis(1), 1);
    assert_eq!(delay_centis(104), 10);
    assert_eq!(delay_centis(105), 11);
}

#[test]
fn delay_saturates_for_huge_values() {
    assert_eq!(delay_centis(u32::MAX), u16::MAX);
    assert_eq!(delay_centis(u32::MAX - 4), u16::MAX);

    let timing = FrameTiming {
        frame_delay_ms: u32::MAX,
        loop_count: 0,
    };
    let bytes = GifEncoder::new()
        .encode(vec![frame(0, [1, 2, 3, 255])], &timing)
        .unwrap();
    assert_eq!(&bytes[..6], b"GIF89a");
}

#[test]
fn partial_alpha_is_cut_at_half_coverage() {
    let mut img = RgbaImage::from_pixel(4, 4, Rgba([10, 200, 10, 255]));
    img.put_pixel(0, 0, Rgba([200, 10, 10, 100]));
    img.put_pixel(1, 1, Rgba([200, 10, 10, 200]));
    let frames = vec![Frame::new(FrameIndex(0), img)];
    let bytes = GifEncoder::new()
        .encode(frames, &FrameTiming::default())
        .unwrap();

    let decoded = image::codecs::gif::GifDecoder::new(Cursor::new(bytes))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    let buf = decoded[0].buffer();
    assert_eq!(buf.get_pixel(0, 0).0[3], 0);
    assert_eq!(buf.get_pixel(1, 1).0[3], 255);
}

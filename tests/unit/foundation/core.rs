use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(10, 0).is_err());
    let fps = Fps::new(25, 2).unwrap();
    assert_eq!(fps.as_f64(), 12.5);
    assert_eq!(fps.to_string(), "25/2");
    assert_eq!(Fps::default().to_string(), "10");
}

#[test]
fn scale_width_keeps_aspect_and_rounds_to_even() {
    let src = FrameSize {
        width: 1920,
        height: 1080,
    };
    assert_eq!(
        Scale::Width(320).resolve(src),
        FrameSize {
            width: 320,
            height: 180
        }
    );

    // 333 * 240 / 640 = 124.875 -> 124 (nearest even)
    let odd = FrameSize {
        width: 640,
        height: 333,
    };
    assert_eq!(Scale::Width(240).resolve(odd).height, 124);
    assert_eq!(Scale::Original.resolve(odd), odd);
}

#[test]
fn scale_height_saturates_to_the_largest_even_value() {
    let tall = FrameSize {
        width: 1,
        height: u32::MAX,
    };
    assert_eq!(Scale::Width(u32::MAX).resolve(tall).height, u32::MAX - 1);
    assert_eq!(Scale::Width(2).resolve(tall).height, u32::MAX - 1);
}

#[test]
fn scale_zero_width_is_invalid() {
    assert!(Scale::Width(0).validate().is_err());
    assert!(Scale::Original.validate().is_ok());
}

#[test]
fn frame_moves_payload_without_copy() {
    let img = RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 4]));
    let frame = Frame::new(FrameIndex(3), img);
    assert_eq!(frame.index(), FrameIndex(3));
    assert_eq!(
        frame.size(),
        FrameSize {
            width: 4,
            height: 2
        }
    );
    assert_eq!(frame.size().rgba_len(), 32);
    let (idx, img) = frame.into_parts();
    assert_eq!(idx.next(), FrameIndex(4));
    assert_eq!(img.get_pixel(3, 1).0, [1, 2, 3, 4]);
}

use super::*;

use image::Rgba;

fn green_screen_with_red_box() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(10, 8, Rgba([0, 200, 0, 255]));
    for y in 3..5 {
        for x in 4..7 {
            img.put_pixel(x, y, Rgba([220, 20, 20, 255]));
        }
    }
    img
}

#[test]
fn parses_key_colours() {
    assert_eq!("auto".parse::<KeyColor>().unwrap(), KeyColor::Auto);
    assert_eq!("AUTO".parse::<KeyColor>().unwrap(), KeyColor::Auto);
    assert_eq!(
        "00ff10".parse::<KeyColor>().unwrap(),
        KeyColor::Rgb([0, 255, 16])
    );
    assert_eq!(
        "#0A0B0C".parse::<KeyColor>().unwrap(),
        KeyColor::Rgb([10, 11, 12])
    );
    assert!("green".parse::<KeyColor>().is_err());
    assert!("12345".parse::<KeyColor>().is_err());
    assert!("zz0000".parse::<KeyColor>().is_err());
    assert_eq!(KeyColor::Rgb([0, 255, 16]).to_string(), "00ff10");
}

#[test]
fn auto_key_removes_border_colour() {
    let matte = ColorKeyMatte::new(ColorKeyOpts::default()).unwrap();
    let out = matte.transform(green_screen_with_red_box()).unwrap();

    assert_eq!(out.dimensions(), (10, 8));
    assert_eq!(out.get_pixel(0, 0).0[3], 0);
    assert_eq!(out.get_pixel(9, 7).0[3], 0);
    assert_eq!(out.get_pixel(5, 3).0, [220, 20, 20, 255]);
}

#[test]
fn fixed_key_ignores_border() {
    let opts = ColorKeyOpts {
        key: KeyColor::Rgb([220, 20, 20]),
        ..ColorKeyOpts::default()
    };
    let out = ColorKeyMatte::new(opts)
        .unwrap()
        .transform(green_screen_with_red_box())
        .unwrap();
    assert_eq!(out.get_pixel(0, 0).0[3], 255);
    assert_eq!(out.get_pixel(5, 4).0[3], 0);
}

#[test]
fn softness_ramps_alpha() {
    let opts = ColorKeyOpts {
        key: KeyColor::Rgb([0, 0, 0]),
        tolerance: 10.0,
        softness: 20.0,
    };
    let matte = ColorKeyMatte::new(opts).unwrap();
    // distance 20 sits halfway through the ramp
    let img = RgbaImage::from_pixel(1, 1, Rgba([20, 0, 0, 200]));
    let out = matte.transform(img).unwrap();
    assert_eq!(out.get_pixel(0, 0).0[3], 100);
}

#[test]
fn rejects_invalid_options() {
    let bad_tol = ColorKeyOpts {
        tolerance: -1.0,
        ..ColorKeyOpts::default()
    };
    assert!(matches!(
        ColorKeyMatte::new(bad_tol),
        Err(JobError::Config(_))
    ));
    let bad_soft = ColorKeyOpts {
        softness: f32::NAN,
        ..ColorKeyOpts::default()
    };
    assert!(ColorKeyMatte::new(bad_soft).is_err());
}

#[test]
fn empty_image_is_an_error() {
    let matte = ColorKeyMatte::new(ColorKeyOpts::default()).unwrap();
    assert!(matte.transform(RgbaImage::new(0, 0)).is_err());
}

#[test]
fn border_median_handles_thin_images() {
    let img = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255]));
    assert_eq!(border_median(&img), [1, 2, 3]);
    let img = RgbaImage::from_pixel(5, 1, Rgba([9, 8, 7, 255]));
    assert_eq!(border_median(&img), [9, 8, 7]);
}

#[test]
fn identity_passes_through() {
    let img = green_screen_with_red_box();
    let out = IdentityMatte.transform(img.clone()).unwrap();
    assert_eq!(out, img);
}

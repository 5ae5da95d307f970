use super::*;

use crate::foundation::core::FrameIndex;

fn tagged(v: u8) -> RgbaImage {
    RgbaImage::from_pixel(1, 1, image::Rgba([v, 0, 0, 255]))
}

fn feed(ingress: &BoundedChannel<Frame>, n: u8) {
    for i in 0..n {
        ingress.put(Frame::new(FrameIndex(u64::from(i)), tagged(i))).unwrap();
    }
    ingress.finish().unwrap();
}

fn drain(egress: &BoundedChannel<Transformed>, window: &ReorderWindow) -> Vec<Transformed> {
    let mut out = Vec::new();
    while let Recv::Item(item) = egress.take().unwrap() {
        window.release();
        out.push(item);
    }
    out
}

#[test]
fn zero_workers_is_rejected() {
    assert!(matches!(TransformPool::new(Some(0)), Err(JobError::Config(_))));
    assert!(TransformPool::new(None).unwrap().workers() >= 1);
}

#[test]
fn every_frame_is_transformed_once_and_one_end_of_stream_follows() {
    let pool = TransformPool::new(Some(3)).unwrap();
    let ingress = BoundedChannel::new(32);
    let egress = BoundedChannel::new(6);
    let window = ReorderWindow::new(3);
    let cancel = CancellationToken::new();
    feed(&ingress, 20);

    let invert = |mut img: RgbaImage| -> anyhow::Result<RgbaImage> {
        img.get_pixel_mut(0, 0).0[1] = 255;
        Ok(img)
    };

    let (handled, items) = std::thread::scope(|s| {
        let consumer = s.spawn(|| drain(&egress, &window));
        let handled = pool
            .run(&ingress, &egress, &window, &invert, &cancel)
            .unwrap();
        (handled, consumer.join().unwrap())
    });

    assert_eq!(handled, 20);
    let mut indices: Vec<u64> = items
        .iter()
        .map(|r| {
            let frame = r.as_ref().unwrap();
            assert_eq!(frame.image().get_pixel(0, 0).0[0] as u64, frame.index().0);
            assert_eq!(frame.image().get_pixel(0, 0).0[1], 255);
            frame.index().0
        })
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..20).collect::<Vec<_>>());
    // End-of-stream was emitted once and is sticky.
    assert_eq!(egress.take().unwrap().into_item().map(|_| ()), None);
    assert!(egress.high_water() <= 3);
}

#[test]
fn failure_is_forwarded_with_its_index() {
    let pool = TransformPool::new(Some(2)).unwrap();
    let ingress = BoundedChannel::new(16);
    let egress = BoundedChannel::new(4);
    let window = ReorderWindow::new(2);
    let cancel = CancellationToken::new();
    feed(&ingress, 10);

    let fail_on_four = |img: RgbaImage| -> anyhow::Result<RgbaImage> {
        if img.get_pixel(0, 0).0[0] == 4 {
            anyhow::bail!("segmentation failed");
        }
        Ok(img)
    };

    let items = std::thread::scope(|s| {
        let consumer = s.spawn(|| drain(&egress, &window));
        pool.run(&ingress, &egress, &window, &fail_on_four, &cancel)
            .unwrap();
        consumer.join().unwrap()
    });

    let failures: Vec<_> = items.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, FrameIndex(4));
    assert!(failures[0].to_string().contains("segmentation failed"));
}

#[test]
fn panicking_transform_becomes_a_tagged_failure() {
    let pool = TransformPool::new(Some(1)).unwrap();
    let ingress = BoundedChannel::new(4);
    let egress = BoundedChannel::new(2);
    let window = ReorderWindow::new(1);
    let cancel = CancellationToken::new();
    feed(&ingress, 2);

    let boom = |_: RgbaImage| -> anyhow::Result<RgbaImage> { panic!("boom") };
    let items = std::thread::scope(|s| {
        let consumer = s.spawn(|| drain(&egress, &window));
        pool.run(&ingress, &egress, &window, &boom, &cancel).unwrap();
        consumer.join().unwrap()
    });
    let err = items[0].as_ref().unwrap_err();
    assert_eq!(err.index, FrameIndex(0));
    assert!(err.to_string().contains("panicked"));
}

#[test]
fn closing_channels_stops_workers() {
    let pool = TransformPool::new(Some(4)).unwrap();
    let ingress = BoundedChannel::<Frame>::new(4);
    let egress = BoundedChannel::new(8);
    let window = ReorderWindow::new(4);
    let cancel = CancellationToken::new();
    let identity = |img: RgbaImage| -> anyhow::Result<RgbaImage> { Ok(img) };

    let res = std::thread::scope(|s| {
        let run = s.spawn(|| pool.run(&ingress, &egress, &window, &identity, &cancel));
        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.cancel();
        ingress.close();
        egress.close();
        window.close();
        run.join().unwrap()
    });
    let err = res.unwrap_err();
    assert!(err.is_symptom());
    assert_eq!(err.stage(), Stage::Transform);
}

#[test]
fn root_cause_beats_symptoms() {
    let mut slot = None;
    keep_root_cause(&mut slot, JobError::closed(Stage::Source));
    keep_root_cause(&mut slot, JobError::Cancelled);
    keep_root_cause(&mut slot, JobError::closed(Stage::Transform));
    assert!(matches!(slot, Some(JobError::Cancelled)));
}

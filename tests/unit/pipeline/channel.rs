use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn fifo_order_then_end_of_stream() {
    let ch = BoundedChannel::new(4);
    ch.put(1).unwrap();
    ch.put(2).unwrap();
    ch.put(3).unwrap();
    ch.finish().unwrap();

    assert_eq!(ch.take().unwrap(), Recv::Item(1));
    assert_eq!(ch.take().unwrap(), Recv::Item(2));
    assert_eq!(ch.take().unwrap(), Recv::Item(3));
    assert_eq!(ch.take().unwrap(), Recv::EndOfStream);
    // Sticky for every later consumer.
    assert_eq!(ch.take().unwrap(), Recv::EndOfStream);
    assert_eq!(ch.take().unwrap(), Recv::EndOfStream);
}

#[test]
fn put_and_finish_after_end_of_stream_fail() {
    let ch = BoundedChannel::new(2);
    ch.finish().unwrap();
    assert_eq!(ch.put(1), Err(ChannelClosed));
    assert_eq!(ch.finish(), Err(ChannelClosed));
    assert_eq!(ch.take().unwrap(), Recv::EndOfStream);
    assert_eq!(ch.put(1), Err(ChannelClosed));
}

#[test]
fn zero_capacity_is_clamped_to_one() {
    let ch = BoundedChannel::<u8>::new(0);
    assert_eq!(ch.capacity(), 1);
}

#[test]
fn capacity_one_slow_consumer_backpressures_producer() {
    let ch = BoundedChannel::new(1);
    let produced = AtomicUsize::new(0);
    let consumed = AtomicUsize::new(0);

    let received = std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..10u32 {
                ch.put(i).unwrap();
                produced.fetch_add(1, Ordering::SeqCst);
            }
            ch.finish().unwrap();
        });

        let mut out = Vec::new();
        loop {
            std::thread::sleep(Duration::from_millis(5));
            // Only the single buffered item may be ahead of the consumer.
            let p = produced.load(Ordering::SeqCst);
            let c = consumed.load(Ordering::SeqCst);
            assert!(p <= c + 1, "producer ran ahead: produced {p}, consumed {c}");
            assert!(ch.len() <= 1);
            match ch.take().unwrap() {
                Recv::Item(v) => {
                    out.push(v);
                    consumed.fetch_add(1, Ordering::SeqCst);
                }
                Recv::EndOfStream => break,
            }
        }
        out
    });

    assert_eq!(received, (0..10).collect::<Vec<_>>());
    assert_eq!(ch.high_water(), 1);
}

#[test]
fn close_unblocks_waiting_producer_and_consumer() {
    let full = BoundedChannel::new(1);
    full.put(0u8).unwrap();
    let empty = BoundedChannel::<u8>::new(1);

    std::thread::scope(|s| {
        let producer = s.spawn(|| full.put(1));
        let consumer = s.spawn(|| empty.take());
        std::thread::sleep(Duration::from_millis(20));
        full.close();
        empty.close();
        assert_eq!(producer.join().unwrap(), Err(ChannelClosed));
        assert_eq!(consumer.join().unwrap(), Err(ChannelClosed));
    });

    assert!(full.is_closed());
    assert!(full.is_empty());
    assert_eq!(full.take(), Err(ChannelClosed));
}

#[test]
fn many_consumers_receive_each_item_exactly_once() {
    let ch = BoundedChannel::new(3);
    let mut all = std::thread::scope(|s| {
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let mut got = Vec::new();
                    while let Recv::Item(v) = ch.take().unwrap() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();

        for i in 0..200u32 {
            ch.put(i).unwrap();
        }
        ch.finish().unwrap();

        consumers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    all.sort_unstable();
    assert_eq!(all, (0..200).collect::<Vec<_>>());
    assert!(ch.high_water() <= 3);
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use avdegrade::capture::frame::Frame;
use avdegrade::pipeline::video::frame_ring;

fn stamp(frame: &mut Frame, value: u8) {
    let (y, _, _) = frame.planes_mut();
    y[0] = value;
}

#[test]
fn full_ring_blocks_producer_until_consumer_pops() {
    let ring = Arc::new(frame_ring(2, 8, 8).unwrap());
    for i in 0..2 {
        let mut slot = ring.acquire_back().unwrap();
        stamp(&mut slot, i);
        slot.release().unwrap();
    }

    let acquired = Arc::new(AtomicBool::new(false));
    let producer = {
        let ring = Arc::clone(&ring);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let mut slot = ring.acquire_back().unwrap();
            acquired.store(true, Ordering::SeqCst);
            stamp(&mut slot, 2);
            slot.release().unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst), "producer got a slot from a full ring");
    assert_eq!(ring.occupancy().unwrap(), 2);

    ring.front().unwrap().pop().unwrap();
    producer.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(ring.occupancy().unwrap(), 2);

    for expected in [1, 2] {
        let slot = ring.front().unwrap();
        assert_eq!(slot.y()[0], expected);
        slot.pop().unwrap();
    }
}

#[test]
fn empty_ring_blocks_consumer_until_release() {
    let ring = Arc::new(frame_ring(1, 8, 8).unwrap());
    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let slot = ring.front().unwrap();
            let value = slot.y()[0];
            slot.pop().unwrap();
            value
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished(), "consumer returned from an empty ring");

    let mut slot = ring.acquire_back().unwrap();
    stamp(&mut slot, 42);
    slot.release().unwrap();

    assert_eq!(consumer.join().unwrap(), 42);
    assert_eq!(ring.occupancy().unwrap(), 0);
}

#[test]
fn producer_and_consumer_keep_fifo_order_under_contention() {
    const FRAMES: usize = 500;
    let ring = Arc::new(frame_ring(3, 4, 4).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..FRAMES {
                let mut slot = ring.acquire_back().unwrap();
                stamp(&mut slot, (i % 251) as u8);
                slot.release().unwrap();
            }
        })
    };

    for i in 0..FRAMES {
        let slot = ring.front().unwrap();
        assert_eq!(slot.y()[0], (i % 251) as u8, "frame {i}");
        assert!(ring.occupancy().unwrap() <= ring.capacity());
        slot.pop().unwrap();
    }
    producer.join().unwrap();
    assert_eq!(ring.stats(), (FRAMES, FRAMES));
}

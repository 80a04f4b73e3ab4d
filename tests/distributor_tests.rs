// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for frame distribution

use gazecursor::backends::camera::{
    FrameBufferPool, FrameSource, PixelFormat, SlotState, StreamFormat,
};
use gazecursor::backends::virtual_camera::VirtualCamera;
use gazecursor::transport::{
    FrameDistributor, FrameHeader, FrameMessage, FramePayload, HEADER_LEN,
};

fn copied_message(declared: u64, actual: usize) -> FrameMessage {
    let header = FrameHeader {
        width: 20,
        height: 20,
        pixel_format: PixelFormat::Gray8.fourcc(),
        payload_len: declared,
    };
    FrameMessage::from_parts(header.encode(), FramePayload::Copied(vec![7u8; actual].into()))
}

fn pool_source(slots: usize) -> FrameSource {
    let format = StreamFormat::packed(32, 24, PixelFormat::YUYV);
    FrameSource::new(FrameBufferPool::new(Box::new(VirtualCamera::new(format, slots))).unwrap())
}

#[test]
fn test_backpressure_drops_beyond_high_water_mark() {
    let mut distributor = FrameDistributor::new(10);
    let mut stalled = distributor.subscribe("stalled");

    let mut dropped = 0;
    for _ in 0..15 {
        dropped += distributor.publish_message(copied_message(400, 400)).dropped;
    }

    assert_eq!(dropped, 5);
    assert_eq!(stalled.dropped(), 5);
    assert_eq!(stalled.pending(), 10);

    let mut received = 0;
    while stalled.try_recv_frame().is_some() {
        received += 1;
    }
    assert_eq!(received, 10);
}

#[test]
fn test_length_mismatch_rejected_and_stream_continues() {
    let mut distributor = FrameDistributor::new(4);
    let mut subscriber = distributor.subscribe("detection");

    distributor.publish_message(copied_message(1000, 800));
    distributor.publish_message(copied_message(400, 400));

    let frame = subscriber.try_recv_frame().expect("well-formed frame after the bad one");
    assert_eq!(frame.header.payload_len, 400);
    assert_eq!(subscriber.rejected(), 1);
    assert!(subscriber.try_recv_frame().is_none());
}

#[test]
fn test_short_header_rejected() {
    let mut distributor = FrameDistributor::new(4);
    let mut subscriber = distributor.subscribe("detection");

    let header = copied_message(400, 400).header_bytes()[..HEADER_LEN - 4].to_vec();
    distributor.publish_message(FrameMessage::from_parts(
        header,
        FramePayload::Copied(vec![0u8; 400].into()),
    ));

    assert!(subscriber.try_recv_frame().is_none());
    assert_eq!(subscriber.rejected(), 1);
}

#[test]
fn test_image_larger_than_payload_rejected() {
    let mut distributor = FrameDistributor::new(4);
    let mut subscriber = distributor.subscribe("detection");

    let oversized = FrameHeader {
        width: 1_500_000_000,
        height: 1,
        pixel_format: PixelFormat::RGB24.fourcc(),
        payload_len: 8,
    };
    distributor.publish_message(FrameMessage::from_parts(
        oversized.encode(),
        FramePayload::Copied(vec![0u8; 8].into()),
    ));
    // 20x20 gray declared with only 100 bytes
    distributor.publish_message(copied_message(100, 100));
    distributor.publish_message(copied_message(400, 400));

    let frame = subscriber.try_recv_frame().expect("well-formed frame after the bad ones");
    assert_eq!(frame.header.payload_len, 400);
    assert_eq!(subscriber.rejected(), 2);
}

#[test]
fn test_slot_reclaimed_after_last_consumer() {
    let mut source = pool_source(4);
    let mut distributor = FrameDistributor::new(4);
    let mut first = distributor.subscribe("detection");
    let mut second = distributor.subscribe("compression");

    let frame = source.next_frame().unwrap();
    let index = frame.slot_index();
    let outcome = distributor.publish(frame);
    assert_eq!(outcome.delivered, 2);

    let pool = source.pool();
    let a = first.try_recv_frame().unwrap();
    drop(a);
    assert_eq!(pool.slot_state(index), Some(SlotState::InFlight));

    let b = second.try_recv_frame().unwrap();
    assert!(b.payload.with_bytes(|data| data.len()).unwrap() > 0);
    drop(b);
    assert_eq!(pool.slot_state(index), Some(SlotState::QueuedToDevice));
}

#[test]
fn test_payload_is_shared_not_copied() {
    let mut source = pool_source(2);
    let mut distributor = FrameDistributor::new(4);
    let mut first = distributor.subscribe("a");
    let mut second = distributor.subscribe("b");

    distributor.publish(source.next_frame().unwrap());
    let a = first.try_recv_frame().unwrap();
    let b = second.try_recv_frame().unwrap();

    let pa = a.payload.with_bytes(|d| d.as_ptr() as usize).unwrap();
    let pb = b.payload.with_bytes(|d| d.as_ptr() as usize).unwrap();
    assert_eq!(pa, pb);
}

#[test]
fn test_recycled_frame_is_rejected_by_subscriber() {
    let mut source = pool_source(1);
    let mut distributor = FrameDistributor::new(4);
    let mut stalled = distributor.subscribe("stalled");

    distributor.publish(source.next_frame().unwrap());
    // The only slot is queued to a subscriber; the next frame recycles it
    let fresh = source.next_frame().unwrap();
    distributor.publish(fresh);

    let frame = stalled.try_recv_frame().expect("fresh frame survives");
    assert!(frame.payload.with_bytes(|_| ()).is_ok());
    assert_eq!(stalled.rejected(), 1);
}

#[test]
fn test_publish_without_subscribers_returns_slot() {
    let mut source = pool_source(2);
    let distributor = FrameDistributor::new(4);
    let frame = source.next_frame().unwrap();
    let index = frame.slot_index();

    let outcome = distributor.publish(frame);
    assert_eq!((outcome.delivered, outcome.dropped), (0, 0));
    assert_eq!(source.pool().slot_state(index), Some(SlotState::QueuedToDevice));
}

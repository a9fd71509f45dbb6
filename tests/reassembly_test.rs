//! Capture-side reassembly over replayed camera traffic

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use supercam_stream::capture::fragment::{
    build_packet, FrameFragmentHeader, CHANNEL_ID_A, CHANNEL_ID_B,
};
use supercam_stream::capture::{
    CaptureEvent, CaptureSession, Reassembler, ReplayItem, ReplayTransport, SessionEnd,
    TransportError,
};

fn header(fid: u8, channel: u8) -> FrameFragmentHeader {
    FrameFragmentHeader {
        boundary_id: fid,
        channel,
        has_sensor: false,
        button_pressed: false,
        reserved: 0,
        sensor_value: 0,
    }
}

/// Fake JPEG split into `chunks` fragments
fn jpeg_fragments(fid: u8, body_len: usize, chunks: usize) -> (Vec<u8>, Vec<Vec<u8>>) {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend((0..body_len).map(|i| (i % 251) as u8));
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    let chunk_len = jpeg.len().div_ceil(chunks);
    let packets = jpeg
        .chunks(chunk_len)
        .map(|chunk| build_packet(CHANNEL_ID_A, &header(fid, 0), chunk))
        .collect();

    (jpeg, packets)
}

fn session(items: Vec<ReplayItem>, source_id: u16) -> CaptureSession<ReplayTransport> {
    CaptureSession::new(
        ReplayTransport::from_items(items),
        Reassembler::new(source_id),
        Arc::new(AtomicBool::new(false)),
    )
}

#[test]
fn test_multi_fragment_frames_reassemble_in_order() {
    let mut expected = Vec::new();
    let mut items = Vec::new();
    for fid in 1..=4u8 {
        let (jpeg, packets) = jpeg_fragments(fid, 3000 + fid as usize * 100, 3);
        expected.push(jpeg);
        items.extend(packets.into_iter().map(ReplayItem::Packet));
    }

    let frames: Vec<_> = session(items, 0).collect();

    assert_eq!(frames.len(), 4);
    for (seq, (frame, jpeg)) in frames.iter().zip(&expected).enumerate() {
        assert_eq!(frame.sequence, seq as u32);
        assert_eq!(frame.payload.as_ref(), jpeg.as_slice());
        assert_eq!(frame.source_id, 0);
    }
}

#[test]
fn test_noise_between_fragments_is_ignored() {
    let (first, packets_a) = jpeg_fragments(10, 500, 2);
    let (second, packets_b) = jpeg_fragments(11, 700, 2);

    let mut bad_magic = packets_a[0].clone();
    bad_magic[0] = 0x00;
    let mut wrong_channel = packets_a[1].clone();
    wrong_channel[2] = 3;
    let mut overrun = packets_a[1].clone();
    overrun[3] = 0xFF;

    let items = vec![
        ReplayItem::Packet(vec![0xAA, 0xBB]),
        ReplayItem::Packet(packets_a[0].clone()),
        ReplayItem::Packet(bad_magic),
        ReplayItem::Error(TransportError::Timeout),
        ReplayItem::Packet(wrong_channel),
        ReplayItem::Packet(overrun),
        ReplayItem::Packet(packets_a[1].clone()),
        ReplayItem::Error(TransportError::Other("pipe error".into())),
        ReplayItem::Packet(packets_b[0].clone()),
        ReplayItem::Packet(packets_b[1].clone()),
    ];

    let mut session = session(items, 2);
    let frames: Vec<_> = session.by_ref().collect();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload.as_ref(), first.as_slice());
    assert_eq!(frames[1].payload.as_ref(), second.as_slice());
    assert_eq!(session.end_reason(), Some(SessionEnd::DeviceGone));
    assert_eq!(session.reassembler().stats().fragments_rejected, 4);
}

#[test]
fn test_both_transport_channels_accepted() {
    let items = vec![
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &header(1, 1), b"left-")),
        ReplayItem::Packet(build_packet(CHANNEL_ID_B, &header(1, 1), b"right")),
    ];

    let frames: Vec<_> = session(items, 0).collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload.as_ref(), b"left-right");
}

#[test]
fn test_identity_change_mid_frame_is_dropped() {
    let mut sensor = header(5, 0);
    sensor.has_sensor = true;

    let items = vec![
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &header(5, 0), b"keep")),
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &header(5, 1), b"XX")),
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &sensor, b"YY")),
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &header(5, 0), b"-this")),
    ];

    let frames: Vec<_> = session(items, 0).collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload.as_ref(), b"keep-this");
}

#[test]
fn test_button_events_reach_channel() {
    let (tx, rx) = crossbeam_channel::unbounded();

    let mut pressed = header(3, 0);
    pressed.button_pressed = true;

    let items = vec![
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &pressed, b"a")),
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &header(3, 0), b"b")),
        ReplayItem::Packet(build_packet(CHANNEL_ID_A, &pressed, b"c")),
    ];

    let session = CaptureSession::new(
        ReplayTransport::from_items(items),
        Reassembler::new(1).with_events(tx),
        Arc::new(AtomicBool::new(false)),
    );
    let frames: Vec<_> = session.collect();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload.as_ref(), b"abc");

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![CaptureEvent::ButtonPressed { source_id: 1 }; 2]
    );
}

#[test]
fn test_restarted_session_continues_sequence() {
    let (_, first) = jpeg_fragments(1, 100, 1);
    let mut session = session(first.into_iter().map(ReplayItem::Packet).collect(), 0);
    let frames: Vec<_> = session.by_ref().collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].sequence, 0);

    let (_, reassembler) = session.into_parts();
    let (_, second) = jpeg_fragments(2, 100, 1);
    let next = CaptureSession::new(
        ReplayTransport::new(second),
        reassembler,
        Arc::new(AtomicBool::new(false)),
    );

    let frames: Vec<_> = next.collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].sequence, 1);
}

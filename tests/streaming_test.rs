//! End-to-end: synthetic cameras → sender → TCP client

use std::collections::{HashMap, VecDeque};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};
use supercam_stream::capture::fragment::{build_packet, FrameFragmentHeader, CHANNEL_ID_A};
use supercam_stream::capture::{PacketSource, TransportError};
use supercam_stream::config::Config;
use supercam_stream::wire::{FrameReader, ReceivedFrame, CODEC_JPEG};
use supercam_stream::SenderApp;

/// Endless camera: every frame is `marker` repeated, split into three fragments
struct SyntheticCamera {
    marker: u8,
    frame_len: usize,
    next_fid: u8,
    queued: VecDeque<Vec<u8>>,
    packet_delay: Duration,
}

impl SyntheticCamera {
    fn new(marker: u8) -> Self {
        Self {
            marker,
            frame_len: 900,
            next_fid: 0,
            queued: VecDeque::new(),
            packet_delay: Duration::from_millis(1),
        }
    }

    fn queue_frame(&mut self) {
        let header = FrameFragmentHeader {
            boundary_id: self.next_fid,
            channel: 0,
            has_sensor: false,
            button_pressed: false,
            reserved: 0,
            sensor_value: 0,
        };
        self.next_fid = self.next_fid.wrapping_add(1);

        let payload = vec![self.marker; self.frame_len];
        for chunk in payload.chunks(self.frame_len / 3) {
            self.queued.push_back(build_packet(CHANNEL_ID_A, &header, chunk));
        }
    }
}

impl PacketSource for SyntheticCamera {
    fn read_packet(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        thread::sleep(self.packet_delay);
        if self.queued.is_empty() {
            self.queue_frame();
            // idle read between frames
            return Err(TransportError::Timeout);
        }

        let packet = self.queued.pop_front().unwrap_or_default();
        buf.clear();
        buf.extend_from_slice(&packet);
        Ok(buf.len())
    }

    fn describe(&self) -> String {
        format!("synthetic-{}", self.marker)
    }
}

fn local_config(max_fps: u32) -> Config {
    let mut config = Config::default();
    config.sender.bind = "127.0.0.1".to_string();
    config.sender.port = 0;
    config.sender.max_fps = max_fps;
    config.sender.log_every = 10;
    config
}

fn start(cameras: u8, max_fps: u32) -> SenderApp {
    let transports: Vec<Box<dyn PacketSource>> = (0..cameras)
        .map(|i| Box::new(SyntheticCamera::new(0xA0 + i)) as Box<dyn PacketSource>)
        .collect();
    SenderApp::start(&local_config(max_fps), transports).unwrap()
}

fn connect(app: &SenderApp) -> FrameReader<TcpStream> {
    let stream = TcpStream::connect(app.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    FrameReader::new(stream)
}

fn read(reader: &mut FrameReader<TcpStream>) -> ReceivedFrame {
    reader.read_frame().unwrap().expect("stream ended early")
}

#[test]
fn test_client_receives_valid_frames_from_all_cameras() {
    let app = start(2, 0);
    let mut reader = connect(&app);

    let mut last_seq: HashMap<u16, u32> = HashMap::new();
    for _ in 0..40 {
        let frame = read(&mut reader);
        let source = frame.header.source_id;

        assert!(source < 2);
        assert_eq!(frame.header.codec, CODEC_JPEG);
        assert_eq!(frame.payload.len(), 900);
        assert!(frame.payload.iter().all(|&b| b == 0xA0 + source as u8));

        if let Some(prev) = last_seq.insert(source, frame.header.sequence) {
            assert!(frame.header.sequence > prev);
        }
    }
    assert_eq!(last_seq.len(), 2, "both cameras should reach the client");

    app.shutdown_handle().shutdown();
    let stats = app.wait();
    assert!(stats.frames_sent >= 40);
    assert!(stats.frames_captured >= stats.frames_sent);
    assert_eq!(stats.clients_served, 1);
}

#[test]
fn test_rate_limit_spaces_sends() {
    let app = start(1, 20);
    let mut reader = connect(&app);

    read(&mut reader);
    let started = Instant::now();
    for _ in 0..6 {
        read(&mut reader);
    }
    let elapsed = started.elapsed();

    // six more sends at 20 fps need at least 6 * 50 ms, minus scheduler slack
    assert!(
        elapsed >= Duration::from_millis(270),
        "frames arrived too fast: {:?}",
        elapsed
    );

    app.shutdown_handle().shutdown();
    let stats = app.wait();
    assert!(stats.frames_overwritten > 0);
}

#[test]
fn test_next_client_served_after_disconnect() {
    let app = start(1, 0);

    {
        let mut first = connect(&app);
        read(&mut first);
    }

    let mut second = connect(&app);
    let frame = read(&mut second);
    assert_eq!(frame.header.source_id, 0);

    app.shutdown_handle().shutdown();
    let stats = app.wait();
    assert_eq!(stats.clients_served, 2);
}

#[test]
fn test_shutdown_closes_client_stream() {
    let app = start(1, 0);
    let mut reader = connect(&app);
    read(&mut reader);

    let handle = app.shutdown_handle();
    let waiter = thread::spawn(move || app.wait());
    handle.shutdown();
    waiter.join().unwrap();

    // whatever was already in flight, the stream ends cleanly at a frame boundary
    loop {
        match reader.read_frame() {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => panic!("unexpected stream error: {}", e),
        }
    }
}

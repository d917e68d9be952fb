//! End-to-end relay path: UDP capture through the hub to TCP consumers,
//! with the original packet bytes recovered intact on the far side.

use flexrelay_proto::{Announcement, FieldMap, FrameReassembler, Synthesizer, WireFrame};
use flexrelay_server::{CaptureSource, RelayHub};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

fn radio_fields(status: &str) -> FieldMap {
    [
        ("model", "FLEX-6600"),
        ("serial", "3721-0514-6600-8821"),
        ("version", "3.8.19.27504"),
        ("nickname", "Remote"),
        ("callsign", "WX7V"),
        ("ip", "10.40.0.5"),
        ("status", status),
    ]
    .into_iter()
    .collect()
}

async fn wait_for_consumers(hub: &RelayHub, expected: usize) {
    for _ in 0..100 {
        if hub.consumer_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} consumers, have {}", hub.consumer_count());
}

async fn read_frame(stream: &mut TcpStream, reassembler: &mut FrameReassembler) -> WireFrame {
    let mut buf = [0u8; 4096];
    loop {
        if let Some(line) = reassembler.next_line() {
            return WireFrame::decode_line(&line).expect("valid frame");
        }
        let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("read timed out")
            .expect("read failed");
        assert!(n > 0, "server closed the stream");
        reassembler.extend(&buf[..n]);
    }
}

#[tokio::test]
async fn packet_survives_capture_and_fanout_byte_identical() {
    let capture = CaptureSource::bind("127.0.0.1:0").unwrap();
    let capture_addr = capture.local_addr().unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    let hub = RelayHub::new(8, Arc::clone(&shutdown));
    let (stream_addr, _accept_task) = hub.start("127.0.0.1:0").await.unwrap();

    let mut consumer_a = TcpStream::connect(stream_addr).await.unwrap();
    let mut consumer_b = TcpStream::connect(stream_addr).await.unwrap();
    wait_for_consumers(&hub, 2).await;

    // The radio announces itself.
    let mut synth = Synthesizer::new();
    let packet = synth.encode_at(&radio_fields("Available"), 1_700_000_000);
    let radio = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    radio.send_to(&packet, capture_addr).await.unwrap();

    let captured = timeout(Duration::from_secs(5), capture.recv())
        .await
        .unwrap()
        .expect("announcement expected");

    let frame = WireFrame::from_captured(&captured, "e2e");
    let line = frame.encode_line().unwrap();
    let delivered = hub.publish(&line).await;
    assert_eq!(delivered, 2);

    // Both consumers recover the exact bytes the radio sent.
    for stream in [&mut consumer_a, &mut consumer_b] {
        let mut reassembler = FrameReassembler::new();
        let received = read_frame(stream, &mut reassembler).await;
        let recovered = received.packet_bytes().unwrap();
        assert_eq!(recovered, packet);

        // And the announcement decodes to the same field map.
        let announcement = Announcement::decode(recovered).unwrap();
        assert_eq!(
            announcement.fields().canonical(),
            radio_fields("Available").canonical()
        );
        assert_eq!(received.radio_info.model, "FLEX-6600");
        assert_eq!(received.radio_info.callsign, "WX7V");
    }

    shutdown.store(true, Ordering::Relaxed);
}

#[tokio::test]
async fn dropped_consumer_does_not_disturb_the_rest() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let hub = RelayHub::new(8, Arc::clone(&shutdown));
    let (stream_addr, _accept_task) = hub.start("127.0.0.1:0").await.unwrap();

    let doomed = TcpStream::connect(stream_addr).await.unwrap();
    let mut survivor = TcpStream::connect(stream_addr).await.unwrap();
    wait_for_consumers(&hub, 2).await;
    drop(doomed);

    let mut synth = Synthesizer::new();
    let mut reassembler = FrameReassembler::new();

    // Keep publishing until the hub notices the dead socket; the survivor
    // must receive every frame along the way.
    let mut frames_seen = 0;
    for seq in 0..20 {
        let packet = synth.encode_at(&radio_fields("Available"), 1_700_000_000 + seq);
        let announcement = Announcement::decode(packet).unwrap();
        let captured = flexrelay_proto::Captured::new(
            announcement,
            "127.0.0.1:4992".parse().unwrap(),
        );
        let line = WireFrame::from_captured(&captured, "e2e").encode_line().unwrap();
        hub.publish(&line).await;

        let frame = read_frame(&mut survivor, &mut reassembler).await;
        assert!(frame.packet_bytes().is_ok());
        frames_seen += 1;

        if hub.consumer_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(frames_seen > 0);
    assert_eq!(hub.consumer_count(), 1);
    shutdown.store(true, Ordering::Relaxed);
}

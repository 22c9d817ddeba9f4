// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hub served over a real Unix socket, driven with raw packets.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use lipsync_core::{Command, MorphWeight, Viseme, VersionedCommand};
use lipsync_dry_tests::TimelineBuilder;
use lipsync_hub::{bind_exclusive, serve, Hub, ServerError};
use lipsync_proto::wire::{decode_message, encode_message, frame_len};
use lipsync_proto::{ClientRole, HandshakePayload, Message};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};

struct Peer {
    stream: UnixStream,
    acc: Vec<u8>,
}

impl Peer {
    async fn connect(path: &PathBuf) -> Self {
        Self {
            stream: UnixStream::connect(path).await.expect("connect"),
            acc: Vec::new(),
        }
    }

    async fn send(&mut self, msg: &Message) {
        let pkt = encode_message(msg, 0).unwrap();
        self.stream.write_all(&pkt).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next message, or `None` once the hub closed the stream.
    async fn recv(&mut self) -> Option<(Message, u64)> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(total) = frame_len(&self.acc).unwrap() {
                if self.acc.len() >= total {
                    let (msg, ts, used) = decode_message(&self.acc).unwrap();
                    self.acc.drain(..used);
                    return Some((msg, ts));
                }
            }
            let n = timeout(Duration::from_secs(2), self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for hub")
                .unwrap();
            if n == 0 {
                return None;
            }
            self.acc.extend_from_slice(&buf[..n]);
        }
    }
}

async fn start(capacity: usize) -> (tempfile::TempDir, PathBuf, Arc<Hub>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hub.sock");
    let listener = bind_exclusive(&path).await.unwrap();
    let hub = Arc::new(Hub::new());
    tokio::spawn(serve(listener, Arc::clone(&hub), capacity));
    (dir, path, hub)
}

fn handshake(role: ClientRole) -> Message {
    Message::Handshake(HandshakePayload {
        agent_id: None,
        role,
        client_version: 1,
    })
}

#[tokio::test]
async fn consumer_sees_baseline_then_pushes_in_order() {
    let (_dir, path, hub) = start(64).await;
    hub.set_morph_weights_command(vec![MorphWeight::new("mouth_o", 0.3)])
        .unwrap();

    let mut consumer = Peer::connect(&path).await;
    consumer.send(&handshake(ClientRole::Consumer)).await;
    consumer.send(&Message::Attach).await;
    assert!(matches!(consumer.recv().await, Some((Message::HandshakeAck(_), _))));
    let (baseline, mut last_ts) = consumer.recv().await.unwrap();
    assert_eq!(baseline, Message::Baseline(hub.current()));

    let mut producer = Peer::connect(&path).await;
    producer.send(&handshake(ClientRole::Producer)).await;
    let _ = producer.recv().await;
    let timeline = TimelineBuilder::new()
        .morph("mouth_a", &[(Viseme::A, 1.0), (Viseme::Closed, 1.0)])
        .build_command(0.2)
        .unwrap();
    producer.send(&Message::Publish(timeline.clone())).await;
    producer.send(&Message::Publish(Command::None)).await;
    assert!(matches!(producer.recv().await, Some((Message::PublishAck(a), _)) if a.version == 2));
    assert!(matches!(producer.recv().await, Some((Message::PublishAck(a), _)) if a.version == 3));

    for expected in [VersionedCommand::new(2, timeline), VersionedCommand::new(3, Command::None)] {
        let (msg, ts) = consumer.recv().await.unwrap();
        assert_eq!(msg, Message::Push(expected));
        assert!(ts > last_ts);
        last_ts = ts;
    }
}

#[tokio::test]
async fn garbage_drops_only_the_sender() {
    let (_dir, path, hub) = start(64).await;
    let mut good = Peer::connect(&path).await;
    good.send(&Message::Attach).await;
    let _ = good.recv().await;

    let mut bad = Peer::connect(&path).await;
    bad.send_raw(b"definitely not a packet").await;
    assert!(matches!(bad.recv().await, Some((Message::Error(e), _)) if e.name == "E_BAD_PAYLOAD"));
    assert!(bad.recv().await.is_none());

    hub.set_morph_weights_command(vec![MorphWeight::new("a", 1.0)])
        .unwrap();
    assert!(matches!(good.recv().await, Some((Message::Push(_), _))));
}

#[tokio::test]
async fn detached_consumer_stays_connected_but_quiet() {
    let (_dir, path, hub) = start(64).await;
    let mut peer = Peer::connect(&path).await;
    peer.send(&Message::Attach).await;
    let _ = peer.recv().await;
    peer.send(&Message::Detach).await;
    peer.send(&handshake(ClientRole::Consumer)).await;
    assert!(matches!(peer.recv().await, Some((Message::HandshakeAck(_), _))));

    hub.set_morph_weights_command(vec![MorphWeight::new("a", 1.0)])
        .unwrap();
    peer.send(&Message::Attach).await;
    let (msg, _) = peer.recv().await.unwrap();
    assert!(matches!(msg, Message::Baseline(VersionedCommand { version: 1, .. })));
}

#[tokio::test]
async fn second_hub_on_the_same_path_is_refused() {
    let (_dir, path, _hub) = start(64).await;
    let err = bind_exclusive(&path).await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning(p) if p == path));
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hub.sock");
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());
    let _listener = bind_exclusive(&path).await.unwrap();
    assert!(UnixStream::connect(&path).await.is_ok());
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blocking consumer attachment against a live hub.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use lipsync_client::{ClientError, CommandClient, HubClient, TickDriver, TickOutcome};
use lipsync_core::{Command, CommandKind, MorphWeight, VersionedCommand, Viseme};
use lipsync_dry_tests::{FakeHost, TimelineBuilder};
use lipsync_hub::{bind_exclusive, serve, Hub};
use lipsync_proto::ClientRole;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

struct TestHub {
    rt: Runtime,
    hub: Arc<Hub>,
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestHub {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.sock");
        Self::start_at(path, dir)
    }

    /// Fresh hub (version 0) on `path`, which may hold a dead hub's socket.
    fn start_at(path: PathBuf, dir: tempfile::TempDir) -> Self {
        let rt = Runtime::new().unwrap();
        let listener = rt.block_on(bind_exclusive(&path)).unwrap();
        let hub = Arc::new(Hub::new());
        rt.spawn(serve(listener, Arc::clone(&hub), 64));
        Self {
            rt,
            hub,
            path,
            _dir: dir,
        }
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn next(client: &CommandClient) -> VersionedCommand {
    let mut got = None;
    assert!(
        wait_until(|| {
            got = client.dequeue();
            got.is_some()
        }),
        "no command arrived"
    );
    got.unwrap()
}

#[test]
fn baseline_is_the_current_command_and_first_in_queue() {
    let hub = TestHub::start();
    hub.hub
        .set_morph_weights_command(vec![MorphWeight::new("mouth_a", 0.7)])
        .unwrap();
    hub.hub
        .set_morph_weights_command(vec![MorphWeight::new("mouth_o", 0.2)])
        .unwrap();

    let client = CommandClient::attach(&hub.path).unwrap();
    assert_eq!(client.baseline(), &hub.hub.current());
    assert_eq!(client.dequeue(), Some(hub.hub.current()));
    assert_eq!(client.dequeue(), None);
    assert!(client.is_connected());
}

#[test]
fn pushes_arrive_in_version_order() {
    let hub = TestHub::start();
    let client = CommandClient::attach(&hub.path).unwrap();
    assert_eq!(next(&client).version, 0);

    for i in 0..5 {
        hub.hub
            .set_morph_weights_command(vec![MorphWeight::new("mouth_a", i as f32 / 5.0)])
            .unwrap();
    }
    let versions: Vec<u64> = (0..5).map(|_| next(&client).version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[test]
fn missing_hub_is_transport_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = CommandClient::attach(dir.path().join("nobody.sock")).err().unwrap();
    assert!(matches!(err, ClientError::TransportUnavailable(_)));
}

#[test]
fn dispose_detaches_and_is_idempotent() {
    let hub = TestHub::start();
    let mut client = CommandClient::attach(&hub.path).unwrap();
    assert!(wait_until(|| hub.hub.attached_count() == 1));

    client.dispose();
    client.dispose();
    assert!(!client.is_connected());
    assert!(wait_until(|| hub.hub.connection_count() == 0));

    hub.hub
        .set_morph_weights_command(vec![MorphWeight::new("mouth_a", 1.0)])
        .unwrap();
    assert_eq!(client.dequeue(), None);
}

#[test]
fn reattach_discards_buffered_commands_and_starts_from_current() {
    let hub = TestHub::start();
    let mut client = CommandClient::attach(&hub.path).unwrap();
    for i in 0..3 {
        hub.hub
            .set_morph_weights_command(vec![MorphWeight::new("mouth_u", i as f32)])
            .unwrap();
    }
    assert!(wait_until(|| client.queue().len() == 4));

    client.reattach().unwrap();
    assert_eq!(client.baseline().version, 3);
    assert_eq!(client.dequeue().map(|c| c.version), Some(3));
    assert_eq!(client.dequeue(), None);
    assert!(wait_until(|| hub.hub.attached_count() == 1));
}

#[test]
fn hub_shutdown_disconnects_the_client() {
    let hub = TestHub::start();
    let mut client = CommandClient::attach(&hub.path).unwrap();
    let TestHub { rt, _dir, .. } = hub;
    drop(rt);
    assert!(wait_until(|| !client.is_connected()));
    assert!(matches!(
        client.reattach(),
        Err(ClientError::TransportUnavailable(_))
    ));
}

#[test]
fn reattach_to_a_restarted_hub_applies_its_baseline() {
    let hub = TestHub::start();
    for i in 0..5 {
        hub.hub
            .set_morph_weights_command(vec![MorphWeight::new("mouth_a", i as f32)])
            .unwrap();
    }
    let mut client = CommandClient::attach(&hub.path).unwrap();
    let mut host = FakeHost::new();
    let mut driver = TickDriver::default();
    assert_eq!(
        driver.tick(&mut client, &mut host).unwrap(),
        TickOutcome::Applied {
            version: 5,
            kind: CommandKind::MorphWeights
        }
    );

    let TestHub {
        rt, path, _dir: dir, ..
    } = hub;
    drop(rt);
    assert!(wait_until(|| !client.is_connected()));
    let restarted = TestHub::start_at(path, dir);

    client.reattach().unwrap();
    assert_eq!(client.baseline().version, 0);
    assert_eq!(
        driver.tick(&mut client, &mut host).unwrap(),
        TickOutcome::Applied {
            version: 0,
            kind: CommandKind::None
        }
    );

    restarted
        .hub
        .set_morph_weights_command(vec![MorphWeight::new("mouth_a", 0.25)])
        .unwrap();
    let mut outcome = TickOutcome::Idle;
    assert!(wait_until(|| {
        outcome = driver.tick(&mut client, &mut host).unwrap();
        outcome != TickOutcome::Idle
    }));
    assert_eq!(
        outcome,
        TickOutcome::Applied {
            version: 1,
            kind: CommandKind::MorphWeights
        }
    );
    assert_eq!(host.weights.get("mouth_a"), Some(&0.25));
}

#[test]
fn producer_to_host_end_to_end() {
    let hub = TestHub::start();
    let mut client = CommandClient::attach(&hub.path).unwrap();
    let mut host = FakeHost::at(90, 30.0);
    let mut driver = TickDriver::default();
    assert_eq!(
        driver.tick(&mut client, &mut host).unwrap(),
        TickOutcome::Applied {
            version: 0,
            kind: CommandKind::None
        }
    );

    let timeline = TimelineBuilder::new()
        .morph("a", &[(Viseme::A, 1.0), (Viseme::Closed, 1.0)])
        .start_frame(0)
        .build_command(0.2)
        .unwrap();
    let version = hub
        .rt
        .block_on(async {
            let mut producer = HubClient::connect(&hub.path).await?;
            producer.send_handshake(ClientRole::Producer).await?;
            Ok::<u64, ClientError>(producer.publish(timeline).await?)
        })
        .unwrap();
    assert_eq!(version, 1);

    let mut outcome = TickOutcome::Idle;
    assert!(wait_until(|| {
        outcome = driver.tick(&mut client, &mut host).unwrap();
        outcome != TickOutcome::Idle
    }));
    assert_eq!(
        outcome,
        TickOutcome::Applied {
            version: 1,
            kind: CommandKind::KeyFrames
        }
    );
    assert_eq!(host.track.keys("a"), vec![(0, 1.0), (6, 0.0)]);
}

#[test]
fn rejected_publish_reports_invalid_argument() {
    let hub = TestHub::start();
    let bad = Command::KeyFrames(lipsync_core::KeyFramesCommand {
        table: Default::default(),
        unit_seconds: f64::NAN,
        start_frame: None,
        replace_existing: false,
    });
    let err = hub
        .rt
        .block_on(async {
            let mut producer = HubClient::connect(&hub.path).await?;
            Ok::<u64, ClientError>(producer.publish(bad).await?)
        })
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(hub.hub.current().version, 0);
}

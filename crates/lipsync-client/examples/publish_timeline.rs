// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Minimal CLI producer for exercising a running `lipsync-hub`.
//!
//! Connects to the hub socket, handshakes as a producer, then publishes a
//! short "a-i-u-e-o" timeline on one morph per vowel followed by a weight
//! reset, printing the version the hub assigns to each.
//!
//! Usage: `publish_timeline [socket_path] [unit_seconds] [start_frame]`
#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use lipsync_client::HubClient;
use lipsync_core::{
    Command, KeyFramesOptions, MorphTimelineTable, MorphWeight, TimelineEntry, Viseme,
};
use lipsync_proto::{default_socket_path, ClientRole};

fn demo_table() -> MorphTimelineTable {
    let vowels = [Viseme::A, Viseme::I, Viseme::U, Viseme::E, Viseme::O];
    vowels
        .iter()
        .enumerate()
        .map(|(slot, &vowel)| {
            let mut entry = TimelineEntry::new();
            if slot > 0 {
                entry.push(Viseme::Closed, slot as f64);
            }
            entry.push(vowel, 1.0).push(Viseme::Closed, 1.0);
            (format!("mouth_{}", vowel.name()), entry)
        })
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let socket_path = args
        .next()
        .map_or_else(default_socket_path, Into::into);
    let unit_seconds: f64 = args
        .next()
        .as_deref()
        .unwrap_or("0.2")
        .parse()
        .context("parse unit_seconds")?;
    let start_frame: Option<i64> = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("parse start_frame")?;

    let mut client = HubClient::connect(&socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?
        .with_agent_id("lipsync-client-example:publish_timeline");
    client
        .send_handshake(ClientRole::Producer)
        .await
        .context("send handshake")?;

    let options = KeyFramesOptions {
        start_frame,
        replace_existing: true,
    };
    let timeline = Command::key_frames_with(demo_table(), unit_seconds, options)
        .context("build timeline")?;
    let version = client.publish(timeline).await.context("publish timeline")?;
    println!("timeline stored as version {version}");

    let reset = Command::morph_weights(
        ["mouth_a", "mouth_i", "mouth_u", "mouth_e", "mouth_o"]
            .into_iter()
            .map(|m| MorphWeight::new(m, 0.0)),
    );
    let version = client.publish(reset).await.context("publish reset")?;
    println!("weight reset stored as version {version}");
    Ok(())
}

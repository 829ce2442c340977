//! Performance benchmarks for the sync core.
//!
//! This module benchmarks:
//! - Presence registry churn (enter/leave/sync)
//! - Decoding inbound channel events
//! - Hub fan-out to many subscribers
//! - Token checks on the hot path
//!
//! Run with: cargo bench

use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use directory_sync::auth::{Capability, CapabilityGrant, TokenStore};
use directory_sync::channel::{
    ChannelEvent, ChannelName, ConnectionId, DIRECTORY_UPDATE, LocalHub, PresenceNotice,
};
use directory_sync::sync::{Participant, ParticipantProfile, PresenceRegistry};
use serde_json::json;

fn participant(i: usize) -> Participant {
    Participant::new(
        ConnectionId::from(format!("conn-{i}")),
        ParticipantProfile::new(format!("user-{i}"), format!("seed-{i}")),
    )
}

fn store_with_grant(channel: &ChannelName) -> (Arc<TokenStore>, directory_sync::auth::CapabilityToken) {
    let tokens = Arc::new(TokenStore::new());
    let now = Utc::now();
    let token = tokens.insert(CapabilityGrant {
        client_id: "bench".to_string(),
        channel: channel.clone(),
        capabilities: Capability::ALL.to_vec(),
        issued_at: now,
        expires_at: now + chrono::Duration::hours(1),
    });
    (tokens, token)
}

/// Benchmark participants entering then leaving in arrival order
fn bench_presence_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("presence_churn");

    for size in [10, 100, 500].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("enter_leave", size), size, |b, &size| {
            let participants: Vec<_> = (0..size).map(participant).collect();
            b.iter(|| {
                let mut registry = PresenceRegistry::new();
                for p in &participants {
                    registry.apply(PresenceNotice::Enter(p.clone()));
                }
                for p in &participants {
                    registry.apply(PresenceNotice::Leave(p.connection_id.clone()));
                }
                black_box(registry.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("sync_with_duplicates", size), size, |b, &size| {
            let mut snapshot: Vec<_> = (0..size).map(participant).collect();
            snapshot.extend((0..size / 2).map(participant));
            b.iter(|| {
                let mut registry = PresenceRegistry::new();
                registry.set_all(black_box(snapshot.clone()));
                black_box(registry.len())
            });
        });
    }
    group.finish();
}

/// Benchmark decoding directory updates of growing size
fn bench_event_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_decode");

    for lines in [10, 100, 1000].iter() {
        let text: String = (0..*lines).map(|i| format!("  - dir-{i}/\n")).collect();
        let payload = json!({ "text": text });
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("directory_update", lines), &payload, |b, payload| {
            b.iter(|| black_box(ChannelEvent::decode(DIRECTORY_UPDATE, payload)))
        });
    }

    let malformed = json!({ "content": "nope" });
    group.bench_function("malformed", |b| {
        b.iter(|| black_box(ChannelEvent::decode(DIRECTORY_UPDATE, &malformed)))
    });
    group.finish();
}

/// Benchmark publishing one message to many subscribers
fn bench_hub_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_fanout");
    let channel = ChannelName::for_workspace("directory-planner", "bench");

    for subscribers in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("publish", subscribers),
            subscribers,
            |b, &subscribers| {
                let (tokens, token) = store_with_grant(&channel);
                let hub = LocalHub::new(tokens);
                let connections: Vec<_> = (0..subscribers)
                    .map(|_| hub.connect_local(&token).unwrap())
                    .collect();
                let mut streams: Vec<_> = connections
                    .iter()
                    .map(|c| c.subscribe_channel(&channel).unwrap())
                    .collect();
                let payload = json!({ "text": "project-root/\n  - src/\n" });

                b.iter(|| {
                    let delivered = connections[0]
                        .publish_message(&channel, DIRECTORY_UPDATE, payload.clone())
                        .unwrap();
                    for stream in &mut streams {
                        while stream.try_recv().is_ok() {}
                    }
                    black_box(delivered)
                });
            },
        );
    }
    group.finish();
}

/// Benchmark the per-operation token check
fn bench_token_authorize(c: &mut Criterion) {
    let channel = ChannelName::for_workspace("directory-planner", "bench");
    let (tokens, token) = store_with_grant(&channel);

    c.bench_function("token_authorize", |b| {
        b.iter(|| {
            black_box(tokens.authorize(&token, &channel, Capability::Publish, Utc::now()))
        })
    });
}

criterion_group!(
    benches,
    bench_presence_churn,
    bench_event_decode,
    bench_hub_fanout,
    bench_token_authorize
);
criterion_main!(benches);

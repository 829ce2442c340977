//! Integration tests for channel sessions over the in-process hub.
//!
//! These tests verify the collaborative editing flow end to end: optimistic
//! local edits, debounced publishing, echo suppression, presence tracking and
//! teardown.

use std::sync::Arc;
use std::time::Duration;

use directory_sync::auth::{AuthorizationGate, StaticWorkspaceAccess, TokenStore};
use directory_sync::channel::LocalHub;
use directory_sync::sync::EditOrigin;
use directory_sync::{
    ChannelSession, Participant, ParticipantProfile, SessionState, SyncBuffer, SyncConfig,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WINDOW: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(2);

struct Workspace {
    gate: AuthorizationGate,
    hub: LocalHub,
    config: SyncConfig,
}

impl Workspace {
    fn new() -> Self {
        let tokens = Arc::new(TokenStore::new());
        let access = StaticWorkspaceAccess::new()
            .with_member("w1", "alice")
            .with_member("w1", "bob")
            .with_member("w2", "alice");
        let gate = AuthorizationGate::new(
            Arc::new(access),
            Arc::clone(&tokens),
            "directory-planner",
            chrono::Duration::minutes(60),
        );
        Workspace {
            gate,
            hub: LocalHub::new(tokens),
            config: SyncConfig::default().with_debounce_window(WINDOW),
        }
    }

    async fn join(&self, workspace_id: &str, caller: &str) -> ChannelSession {
        ChannelSession::authorize_and_open(
            &self.gate,
            &self.hub,
            workspace_id,
            caller,
            ParticipantProfile::for_caller(caller),
            SyncBuffer::new(""),
            &self.config,
        )
        .await
        .unwrap()
    }
}

fn edit_stream(session: &ChannelSession) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.on_remote_edit(move |text| {
        let _ = tx.send(text.to_string());
    });
    rx
}

/// Polls the session's presence until `done` accepts it.
async fn wait_for<F>(session: &ChannelSession, done: F) -> Vec<Participant>
where
    F: Fn(&[Participant]) -> bool,
{
    timeout(WAIT, async {
        loop {
            let participants = session.presence();
            if done(&participants) {
                return participants;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("presence did not settle")
}

async fn wait_for_presence(session: &ChannelSession, count: usize) -> Vec<Participant> {
    wait_for(session, |participants| participants.len() == count).await
}

#[tokio::test]
async fn test_remote_edit_reaches_other_session() {
    let workspace = Workspace::new();
    let alice = workspace.join("w1", "alice").await;
    let mut alice_edits = edit_stream(&alice);
    let bob = workspace.join("w1", "bob").await;
    let mut bob_edits = edit_stream(&bob);

    alice.publish_edit("root/\n");

    // Optimistic: visible locally before any network traffic.
    assert_eq!(alice.text(), "root/\n");
    assert_eq!(alice.buffer().origin(), EditOrigin::Local);
    assert_eq!(alice.buffer().revision(), 1);

    let received = timeout(WAIT, bob_edits.recv()).await.unwrap().unwrap();
    assert_eq!(received, "root/\n");
    assert_eq!(bob.text(), "root/\n");
    assert_eq!(bob.buffer().origin(), EditOrigin::Remote);

    // The echo of alice's own publish never touches her buffer.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(alice_edits.try_recv().is_err());
    assert_eq!(alice.buffer().revision(), 1);
    assert_eq!(alice.buffer().origin(), EditOrigin::Local);
}

#[tokio::test]
async fn test_burst_of_edits_publishes_once() {
    let workspace = Workspace::new();
    let alice = workspace.join("w1", "alice").await;
    let bob = workspace.join("w1", "bob").await;
    let mut bob_edits = edit_stream(&bob);

    alice.publish_edit("a");
    alice.publish_edit("ab");
    alice.publish_edit("abc");
    assert_eq!(alice.text(), "abc");

    let received = timeout(WAIT, bob_edits.recv()).await.unwrap().unwrap();
    assert_eq!(received, "abc");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob_edits.try_recv().is_err());
    assert_eq!(workspace.hub.stats().messages_published, 1);
}

#[tokio::test]
async fn test_close_cancels_pending_publish() {
    let workspace = Workspace::new();
    let alice = workspace.join("w1", "alice").await;
    let bob = workspace.join("w1", "bob").await;
    let mut bob_edits = edit_stream(&bob);

    alice.publish_edit("draft");
    alice.close().await;
    assert_eq!(alice.state(), SessionState::Closed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob_edits.try_recv().is_err());
    assert_eq!(workspace.hub.stats().messages_published, 0);

    // Closing again is harmless.
    alice.close().await;
    assert_eq!(alice.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_presence_tracks_join_and_leave() {
    let workspace = Workspace::new();
    let alice = workspace.join("w1", "alice").await;
    let bob = workspace.join("w1", "bob").await;

    let seen_by_alice = wait_for_presence(&alice, 2).await;
    let names: Vec<_> = seen_by_alice
        .iter()
        .map(|p| p.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(seen_by_alice[0].connection_id, *alice.connection_id());

    let seen_by_bob = wait_for_presence(&bob, 2).await;
    assert_eq!(seen_by_bob, seen_by_alice);

    bob.close().await;
    let remaining = wait_for_presence(&alice, 1).await;
    assert_eq!(remaining[0].display_name, "alice");
}

#[tokio::test]
async fn test_presence_change_handler_receives_snapshots() {
    let workspace = Workspace::new();
    let alice = workspace.join("w1", "alice").await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    alice.on_presence_change(move |participants| {
        let _ = tx.send(participants.len());
    });

    let bob = workspace.join("w1", "bob").await;
    let mut sizes = Vec::new();
    while sizes.last() != Some(&2) {
        sizes.push(timeout(WAIT, rx.recv()).await.unwrap().unwrap());
    }

    bob.close().await;
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_workspaces_are_isolated() {
    let workspace = Workspace::new();
    let alice_w1 = workspace.join("w1", "alice").await;
    let alice_w2 = workspace.join("w2", "alice").await;
    let bob_w1 = workspace.join("w1", "bob").await;
    let mut bob_edits = edit_stream(&bob_w1);

    assert_ne!(alice_w1.channel(), alice_w2.channel());
    assert_eq!(alice_w2.channel().as_str(), "directory-planner:w2");

    alice_w2.publish_edit("only for w2");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob_edits.try_recv().is_err());
    assert_eq!(bob_w1.text(), "");

    alice_w1.publish_edit("for w1");
    let received = timeout(WAIT, bob_edits.recv()).await.unwrap().unwrap();
    assert_eq!(received, "for w1");
}

#[tokio::test]
async fn test_reopening_gets_a_new_participant() {
    let workspace = Workspace::new();
    let bob = workspace.join("w1", "bob").await;

    let first = workspace.join("w1", "alice").await;
    let first_id = first.connection_id().clone();
    first.close().await;

    let second = workspace.join("w1", "alice").await;
    assert_ne!(second.connection_id(), &first_id);

    let second_id = second.connection_id().clone();
    let participants = wait_for(&bob, |participants| {
        participants.len() == 2 && participants.iter().any(|p| p.connection_id == second_id)
    })
    .await;
    assert!(participants.iter().all(|p| p.connection_id != first_id));
    assert_eq!(participants[0].display_name, "bob");
}

#[tokio::test]
async fn test_open_with_preissued_token() {
    let workspace = Workspace::new();
    let issued = workspace.gate.authorize("w1", Some("bob")).unwrap();

    let session = ChannelSession::open(
        &workspace.hub,
        "w1",
        &issued.token,
        ParticipantProfile::new("Bob", "seed-42"),
        SyncBuffer::default(),
        &workspace.config,
    )
    .await
    .unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.workspace_id(), "w1");
    assert_eq!(session.text(), "project-root/\n  - loading...");

    let participants = wait_for_presence(&session, 1).await;
    assert_eq!(participants[0].display_name, "Bob");
    assert_eq!(participants[0].avatar_seed, "seed-42");
}

#[tokio::test]
async fn test_caller_owned_buffer_is_shared() {
    let workspace = Workspace::new();
    let observer = SyncBuffer::new("");
    let alice = workspace.join("w1", "alice").await;
    let bob = ChannelSession::authorize_and_open(
        &workspace.gate,
        &workspace.hub,
        "w1",
        "bob",
        ParticipantProfile::for_caller("bob"),
        observer.clone(),
        &workspace.config,
    )
    .await
    .unwrap();
    let mut bob_edits = edit_stream(&bob);

    alice.publish_edit("shared/\n");
    timeout(WAIT, bob_edits.recv()).await.unwrap().unwrap();
    assert_eq!(observer.text(), "shared/\n");
}

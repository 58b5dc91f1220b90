#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Message filtering and lifecycle of a single session against a scripted
//! bridge.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{credentials, error_json, message_json, spawned_json, FakeConnector, Step};
use mc_lookout::protocol::{ClientMessage, MessageChannel};
use mc_lookout::{GameSession, SessionConfig, SessionEvent, SessionPhase};

/// Collect events until `Terminated` or the stream ends.
async fn drain(events: &mut tokio::sync::mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn only_real_player_chat_surfaces() {
    let connector = Arc::new(FakeConnector::new(|_| {
        Some(vec![
            Step::Send(spawned_json("Scout")),
            Step::Send(message_json(
                MessageChannel::ActionBar,
                Some("Alex"),
                "Entering the Nether",
            )),
            Step::Send(message_json(
                MessageChannel::Chat,
                Some("Alex"),
                "12/20 Mana",
            )),
            Step::Send(message_json(MessageChannel::Chat, Some("Alex"), "18/20❤")),
            Step::Send(message_json(MessageChannel::System, None, "Alex joined the game")),
            Step::Send(message_json(MessageChannel::Chat, Some("  "), "blank sender")),
            Step::Send(message_json(MessageChannel::Chat, Some("Scout"), "my own echo")),
            Step::Send(message_json(MessageChannel::Chat, Some("Alex"), "hello")),
            Step::Close,
        ])
    }));
    let (_session, mut events) = GameSession::open(connector, credentials(), SessionConfig::default());

    let seen = drain(&mut events).await;
    assert_eq!(
        seen,
        vec![
            SessionEvent::Connected {
                username: "Scout".into()
            },
            SessionEvent::Chat {
                sender: "Alex".into(),
                text: "hello".into()
            },
            SessionEvent::Terminated { reason: None },
        ]
    );
}

#[tokio::test]
async fn server_error_faults_without_ending_the_session() {
    let connector = Arc::new(FakeConnector::new(|_| {
        Some(vec![
            Step::Send(spawned_json("Scout")),
            Step::Send(error_json("pathfinder crashed")),
            Step::Send(message_json(MessageChannel::Chat, Some("Alex"), "still there?")),
            Step::Close,
        ])
    }));
    let (_session, mut events) = GameSession::open(connector, credentials(), SessionConfig::default());

    let seen = drain(&mut events).await;
    assert_eq!(seen.len(), 4);
    assert!(matches!(&seen[1], SessionEvent::Faulted { error } if error.contains("pathfinder crashed")));
    assert!(matches!(&seen[2], SessionEvent::Chat { .. }));
    assert!(seen[3].is_terminal());
}

#[tokio::test]
async fn malformed_bridge_output_is_ignored() {
    let connector = Arc::new(FakeConnector::new(|_| {
        Some(vec![
            Step::Send("not json".into()),
            Step::Send(r#"{"type":"weather","raining":true}"#.into()),
            Step::Send(spawned_json("Scout")),
            Step::Close,
        ])
    }));
    let (_session, mut events) = GameSession::open(connector, credentials(), SessionConfig::default());

    let seen = drain(&mut events).await;
    assert_eq!(
        seen,
        vec![
            SessionEvent::Connected {
                username: "Scout".into()
            },
            SessionEvent::Terminated { reason: None },
        ]
    );
}

#[tokio::test]
async fn receive_error_ends_with_one_terminated() {
    let connector = Arc::new(FakeConnector::new(|_| {
        Some(vec![
            Step::Send(spawned_json("Scout")),
            Step::Fail("connection reset".into()),
        ])
    }));
    let (session, mut events) = GameSession::open(connector, credentials(), SessionConfig::default());

    let seen = drain(&mut events).await;
    let terminals = seen.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Terminated { reason: Some(reason) }) if reason.contains("connection reset")
    ));
    assert_eq!(session.phase(), SessionPhase::Terminated);
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn chat_is_sent_while_active() {
    let connector = Arc::new(FakeConnector::new(|_| {
        Some(vec![
            Step::Send(spawned_json("Scout")),
            Step::Wait(Duration::from_secs(60)),
        ])
    }));
    let (mut session, mut events) = GameSession::open(
        Arc::clone(&connector),
        credentials(),
        SessionConfig::default().with_auto_eat(None),
    );

    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Connected { .. }));
    tokio_test::assert_ok!(session.send_chat("hello from the agent"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let sent: Vec<ClientMessage> = connector
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|m| serde_json::from_str(m).unwrap())
        .collect();
    assert!(matches!(sent[0], ClientMessage::Login { .. }));
    assert!(matches!(&sent[1], ClientMessage::Chat { message } if message == "hello from the agent"));

    session.shutdown().await;
    assert!(drain(&mut events).await.last().unwrap().is_terminal());
}

#[tokio::test]
async fn connected_survives_a_full_event_channel() {
    let connector = Arc::new(FakeConnector::new(|_| {
        Some(vec![
            Step::Send(message_json(MessageChannel::Chat, Some("Alex"), "hi")),
            Step::Send(spawned_json("Scout")),
            Step::Close,
        ])
    }));
    let (_session, mut events) = GameSession::open(
        connector,
        credentials(),
        SessionConfig::default().with_event_channel_capacity(1),
    );

    // Let the chat fill the only slot before anything is read.
    tokio::task::yield_now().await;

    let seen = drain(&mut events).await;
    assert_eq!(
        seen,
        vec![
            SessionEvent::Chat {
                sender: "Alex".into(),
                text: "hi".into()
            },
            SessionEvent::Connected {
                username: "Scout".into()
            },
            SessionEvent::Terminated { reason: None },
        ]
    );
}

//! Participant against an in-process coordinator

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcast::ParticipantStatus;
use mcast::coordinator::{Coordinator, CoordinatorConfig};
use mcast::protocol::{ParticipantId, reply};
use mcast_participant::participant::ALREADY_REGISTERED;
use mcast_participant::{ClientError, ControlClient, Participant, ParticipantConfig, UserCommand};
use tempfile::TempDir;
use tokio::sync::watch;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_coordinator(max_sessions: usize) -> (u16, watch::Sender<bool>) {
    let config = CoordinatorConfig {
        max_sessions,
        ..Default::default()
    };
    let coordinator = Coordinator::bind_to(config, "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let port = coordinator.local_addr().unwrap().port();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(coordinator.run(rx));
    (port, tx)
}

async fn participant(temp: &TempDir, id: u32, coordinator_port: u16) -> (Participant, PathBuf) {
    let log_path = temp.path().join(format!("participant-{}.log", id));
    let config = ParticipantConfig {
        id: ParticipantId(id),
        log_path: log_path.clone(),
        coordinator_host: "127.0.0.1".to_string(),
        coordinator_port,
    };
    let client = ControlClient::connect(&config.coordinator_host, config.coordinator_port, TIMEOUT)
        .await
        .unwrap();
    (Participant::new(config, client), log_path)
}

/// Wait until the message log has exactly `expected` lines
async fn wait_for_log(path: &Path, expected: &[&str]) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        let lines: Vec<&str> = content.lines().collect();
        if lines == expected {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("{} has {:?}, expected {:?}", path.display(), lines, expected);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn run(p: &mut Participant, line: &str) -> String {
    p.execute(UserCommand::parse(line).unwrap()).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_messages_reach_every_log() {
    let temp = TempDir::new().unwrap();
    let (port, shutdown) = start_coordinator(5).await;
    let (mut a, a_log) = participant(&temp, 1, port).await;
    let (mut b, b_log) = participant(&temp, 2, port).await;

    assert_eq!(run(&mut a, "register 0").await, reply::REGISTERED);
    assert_eq!(run(&mut b, "register 0").await, reply::REGISTERED);
    assert_eq!(a.status(), ParticipantStatus::Online);

    assert_eq!(run(&mut a, "msend hello group").await, reply::MSEND_ACCEPTED);
    wait_for_log(&a_log, &["hello group"]).await;
    wait_for_log(&b_log, &["hello group"]).await;

    run(&mut a, "quit").await;
    run(&mut b, "quit").await;
    shutdown.send(true).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_offline_participant_catches_up() {
    let temp = TempDir::new().unwrap();
    let (port, shutdown) = start_coordinator(5).await;
    let (mut a, _) = participant(&temp, 1, port).await;
    let (mut b, b_log) = participant(&temp, 2, port).await;
    run(&mut a, "register 0").await;
    run(&mut b, "register 0").await;

    assert_eq!(run(&mut b, "disconnect").await, reply::DISCONNECTED);
    assert_eq!(b.status(), ParticipantStatus::Offline);
    assert!(b.delivery_port().is_none());

    assert_eq!(run(&mut a, "msend while you were out").await, reply::MSEND_ACCEPTED);
    assert_eq!(run(&mut b, "reconnect 0").await, reply::RECONNECTED);
    assert_eq!(b.status(), ParticipantStatus::Online);
    wait_for_log(&b_log, &["while you were out"]).await;

    run(&mut a, "quit").await;
    run(&mut b, "quit").await;
    shutdown.send(true).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_and_remote_refusals() {
    let temp = TempDir::new().unwrap();
    let (port, shutdown) = start_coordinator(5).await;
    let (mut a, _) = participant(&temp, 1, port).await;
    let (mut twin, _) = participant(&temp, 1, port).await;

    // Only the coordinator knows about non-membership
    assert_eq!(
        run(&mut a, "msend too early").await,
        "Participant is not registered.Please check"
    );

    assert_eq!(run(&mut a, "register 0").await, reply::REGISTERED);
    assert_eq!(run(&mut a, "register 0").await, ALREADY_REGISTERED);
    assert_eq!(
        run(&mut twin, "register 0").await,
        "Participant with same id already exists"
    );
    assert_eq!(twin.status(), ParticipantStatus::NotMember);
    assert!(twin.delivery_port().is_none());

    assert_eq!(run(&mut a, "deregister").await, reply::DEREGISTERED);
    assert_eq!(a.status(), ParticipantStatus::NotMember);
    assert_eq!(run(&mut twin, "register 0").await, reply::REGISTERED);

    run(&mut a, "quit").await;
    run(&mut twin, "quit").await;
    shutdown.send(true).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_rejected_when_pool_full() {
    let (port, shutdown) = start_coordinator(1).await;
    let _first = ControlClient::connect("127.0.0.1", port, TIMEOUT).await.unwrap();

    let err = ControlClient::connect("127.0.0.1", port, TIMEOUT).await.err().unwrap();
    match err {
        ClientError::Rejected(notice) => assert_eq!(notice, reply::CONNECTION_REJECTED),
        other => panic!("unexpected: {:?}", other),
    }
    shutdown.send(true).unwrap();
}

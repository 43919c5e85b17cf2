//! End-to-end tests of the orchestrator with real adapters where possible.
//!
//! - Discovery runs the real [`BeaconScanner`] against a loopback responder.
//! - Bootstrap runs the real [`CredentialBootstrap`] retry loop over an
//!   in-memory transport that plays a robot waiting for its HOME button.
//! - The registry is a real [`JsonFileStore`] in a scratch directory.
//! - Sessions and the hub are the in-memory doubles.
//!
//! ```text
//! start ─► scan (UDP) ─► bootstrap (empty, empty, secret) ─► save
//!       ─► connect ─► wait for cap ─► classify ─► add node ─► poll
//! ```

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomba_core::{DeviceRecord, DeviceVariant, PropertyId, PropertyValue};
use roomba_hub::application::manage_devices::ConnectionState;
use roomba_hub::application::orchestrate::{
    Collaborators, Orchestrator, OrchestratorSettings,
};
use roomba_hub::infrastructure::hub::recording::RecordingHub;
use roomba_hub::infrastructure::hub::NOTICE_PASSWORD;
use roomba_hub::infrastructure::network::bootstrap::{
    BootstrapOptions, CredentialBootstrap, CredentialTransport,
};
use roomba_hub::infrastructure::network::discovery::{BeaconScanner, ScanOptions};
use roomba_hub::infrastructure::session::mock::{MockConnector, MockSession};
use roomba_hub::infrastructure::session::SessionCommand;
use roomba_hub::infrastructure::storage::registry::{DeviceStore, JsonFileStore};
use serde_json::{json, Value};
use uuid::Uuid;

const DEVICE_ID: &str = "3145C60822630830";
const ADDRESS: &str = "rm0822630830";
const SECRET: &str = ":1:1486937829:gAcFexrLxpQwUsIV";

// ── Robot doubles ─────────────────────────────────────────────────────────────

/// Answers every probe it receives with one beacon reply until it times out.
fn spawn_beacon_robot() -> std::net::SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind robot");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set timeout");
    let addr = socket.local_addr().expect("local addr");
    let reply = json!({
        "ver": "3",
        "hostname": format!("Roomba-{DEVICE_ID}"),
        "robotname": "Downstairs",
        "ip": "127.0.0.1",
        "mac": "70:66:55:aa:bb:cc",
        "sw": "v2.4.16-126",
        "sku": "R980020",
        "nc": 0,
        "proto": "mqtt",
        "cap": {"pose": 1, "carpetBoost": 1}
    })
    .to_string();

    std::thread::spawn(move || {
        let mut buf = [0u8; 512];
        while let Ok((_, from)) = socket.recv_from(&mut buf) {
            if socket.send_to(reply.as_bytes(), from).is_err() {
                break;
            }
        }
    });
    addr
}

fn credential_frame(credential: &str) -> Vec<u8> {
    let mut frame = vec![0xf0, (5 + credential.len()) as u8, 0xef, 0xcc, 0x3b, 0x29, 0x00];
    frame.extend_from_slice(credential.as_bytes());
    frame
}

struct MemoryStream {
    input: Cursor<Vec<u8>>,
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Answers with an empty credential `presses_needed` times, then the secret.
struct PairingRobot {
    responses: Mutex<VecDeque<Vec<u8>>>,
    opens: Arc<AtomicUsize>,
}

impl PairingRobot {
    fn new(presses_needed: usize, opens: Arc<AtomicUsize>) -> Self {
        let mut responses: VecDeque<Vec<u8>> =
            std::iter::repeat_with(|| credential_frame("")).take(presses_needed).collect();
        responses.push_back(credential_frame(SECRET));
        Self {
            responses: Mutex::new(responses),
            opens,
        }
    }
}

impl CredentialTransport for PairingRobot {
    type Stream = MemoryStream;

    fn open(&self, _record: &DeviceRecord) -> io::Result<MemoryStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let frame = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| credential_frame(SECRET));
        Ok(MemoryStream {
            input: Cursor::new(frame),
        })
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

fn reported_state() -> Value {
    json!({
        "cap": {"pose": 1, "carpetBoost": 1},
        "cleanMissionStatus": {"phase": "charge", "error": 0},
        "batPct": 100,
        "bin": {"present": true, "full": false},
        "binPause": false,
        "signal": {"rssi": -40.0},
        "bbrun": {"hr": 2, "min": 15},
        "pose": {"point": {"x": 3, "y": 4}, "theta": 180},
        "noAutoPasses": false,
        "twoPass": false,
        "openOnly": true,
        "carpetBoost": true,
        "vacHigh": false
    })
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    hub: Arc<RecordingHub>,
    connector: Arc<MockConnector>,
    store: Arc<JsonFileStore>,
    bootstrap_opens: Arc<AtomicUsize>,
}

fn harness(registry_path: &PathBuf, poll_interval: Duration) -> Harness {
    let running = Arc::new(AtomicBool::new(true));
    let scanner = BeaconScanner::new(
        ScanOptions {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            target: spawn_beacon_robot(),
            attempts: 2,
            attempt_timeout: Duration::from_millis(300),
            attempt_interval: Duration::from_millis(10),
        },
        Arc::clone(&running),
    );
    let bootstrap_opens = Arc::new(AtomicUsize::new(0));
    let credentials = CredentialBootstrap::new(
        PairingRobot::new(2, Arc::clone(&bootstrap_opens)),
        BootstrapOptions {
            retry_backoff: Duration::from_millis(10),
            max_attempts: Some(10),
        },
        Arc::clone(&running),
    );
    let hub = Arc::new(RecordingHub::new());
    let connector = Arc::new(MockConnector::new());
    let store = Arc::new(JsonFileStore::new(registry_path));

    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            scanner: Arc::new(scanner),
            credentials: Arc::new(credentials),
            connector: connector.clone(),
            hub: hub.clone(),
            store: store.clone(),
        },
        OrchestratorSettings {
            poll_interval,
            state_wait_interval: Duration::from_millis(5),
        },
        running,
    ));
    Harness {
        orchestrator,
        hub,
        connector,
        store,
        bootstrap_opens,
    }
}

fn scratch_registry() -> PathBuf {
    std::env::temp_dir()
        .join(format!("roomba_hub_it_{}", Uuid::new_v4()))
        .join("devices.json")
}

fn cleanup(path: &PathBuf) {
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_start_discovers_pairs_connects_and_syncs() {
    // Arrange
    let path = scratch_registry();
    let h = harness(&path, Duration::from_secs(3600));
    let session = Arc::new(MockSession::with_reported(reported_state()));
    h.connector.insert(DEVICE_ID, session.clone());

    // Act
    let tasks = h.orchestrator.start().await.unwrap();
    let mut variants = Vec::new();
    for task in tasks {
        variants.push(task.await.unwrap().unwrap());
    }

    // Assert: paired after two empty answers
    assert_eq!(h.bootstrap_opens.load(Ordering::SeqCst), 3);
    let saved = h.store.load().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].credential.as_deref(), Some(SECRET));

    // Assert: classified and synchronized
    assert_eq!(variants, vec![DeviceVariant::CarpetBoost]);
    let node = h.hub.node(ADDRESS).expect("node created");
    assert_eq!(node.variant, DeviceVariant::CarpetBoost);
    assert_eq!(node.name, "Downstairs");
    assert_eq!(h.hub.value(ADDRESS, PropertyId::Battery), Some(PropertyValue::Int(100)));
    assert_eq!(h.hub.value(ADDRESS, PropertyId::EdgeClean), Some(PropertyValue::Int(0)));
    assert_eq!(h.hub.value(ADDRESS, PropertyId::FanSpeed), Some(PropertyValue::Int(2)));
    assert_eq!(h.hub.value(ADDRESS, PropertyId::RuntimeHours), Some(PropertyValue::Decimal(2.3)));
    assert!(h
        .hub
        .notice_history()
        .iter()
        .any(|(key, _)| key == NOTICE_PASSWORD));
    assert!(h.hub.notices().is_empty());

    cleanup(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_reuses_saved_credential() {
    // Arrange: a first run pairs the robot and saves it
    let path = scratch_registry();
    let first = harness(&path, Duration::from_secs(3600));
    first.orchestrator.load_known().await.unwrap();
    first.orchestrator.discover_devices().await.unwrap();
    first.orchestrator.shutdown().await;

    let second = harness(&path, Duration::from_secs(3600));
    second
        .connector
        .insert(DEVICE_ID, Arc::new(MockSession::with_reported(reported_state())));

    // Act
    let tasks = second.orchestrator.start().await.unwrap();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Assert: no bootstrap on the second run
    assert_eq!(second.bootstrap_opens.load(Ordering::SeqCst), 0);
    assert_eq!(second.connector.connects(), vec![DEVICE_ID.to_string()]);
    let status = second.orchestrator.device_status(DEVICE_ID).await.unwrap();
    assert_eq!(status.state, ConnectionState::Synchronized);

    cleanup(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_commands_and_polling_round_trip_through_session() {
    // Arrange
    let path = scratch_registry();
    let h = harness(&path, Duration::from_millis(20));
    let session = Arc::new(MockSession::with_reported(reported_state()));
    h.connector.insert(DEVICE_ID, session.clone());
    for task in h.orchestrator.start().await.unwrap() {
        task.await.unwrap().unwrap();
    }

    // Act: switch to two passes and performance fan, then start cleaning
    assert!(h.orchestrator.handle_command(DEVICE_ID, "SET_PASSES", Some(2)).await);
    assert!(h.orchestrator.handle_command(DEVICE_ID, "SET_FAN_SPEED", Some(3)).await);
    assert!(h.orchestrator.handle_command(DEVICE_ID, "DON", None).await);
    session.set_reported("cleanMissionStatus", json!({"phase": "run", "error": 0}));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Assert: the robot echoed the preferences and the poller picked them up
    assert_eq!(session.commands(), vec![SessionCommand::Start]);
    assert_eq!(h.hub.value(ADDRESS, PropertyId::Passes), Some(PropertyValue::Int(2)));
    assert_eq!(h.hub.value(ADDRESS, PropertyId::FanSpeed), Some(PropertyValue::Int(3)));
    assert_eq!(h.hub.value(ADDRESS, PropertyId::Running), Some(PropertyValue::Int(100)));
    assert_eq!(h.hub.value(ADDRESS, PropertyId::MissionState), Some(PropertyValue::Int(3)));

    h.orchestrator.shutdown().await;
    cleanup(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lost_connection_is_published_and_commands_fail() {
    // Arrange
    let path = scratch_registry();
    let h = harness(&path, Duration::from_millis(20));
    let session = Arc::new(MockSession::with_reported(reported_state()));
    h.connector.insert(DEVICE_ID, session.clone());
    for task in h.orchestrator.start().await.unwrap() {
        task.await.unwrap().unwrap();
    }

    // Act
    session.set_connected(false);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let accepted = h.orchestrator.handle_command(DEVICE_ID, "DOCK", None).await;

    // Assert
    assert_eq!(h.hub.value(ADDRESS, PropertyId::Connected), Some(PropertyValue::Int(0)));
    assert!(!accepted);
    assert!(session.commands().is_empty());

    h.orchestrator.shutdown().await;
    cleanup(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forget_removes_node_and_saved_record() {
    // Arrange
    let path = scratch_registry();
    let h = harness(&path, Duration::from_secs(3600));
    h.connector
        .insert(DEVICE_ID, Arc::new(MockSession::with_reported(reported_state())));
    for task in h.orchestrator.start().await.unwrap() {
        task.await.unwrap().unwrap();
    }

    // Act
    let removed = h.orchestrator.remove_device(DEVICE_ID).await.unwrap();

    // Assert
    assert!(removed);
    assert!(h.hub.node(ADDRESS).is_none());
    assert!(h.store.load().unwrap().is_empty());

    cleanup(&path);
}

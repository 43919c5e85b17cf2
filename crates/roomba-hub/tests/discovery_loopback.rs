//! Integration tests for the beacon scanner over real loopback UDP sockets.
//!
//! A responder thread plays the robot: it waits for each probe and answers
//! with a scripted batch of datagrams.  The scanner is pointed at the
//! responder's address instead of a broadcast address.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use roomba_core::protocol::PROBE;
use roomba_hub::infrastructure::network::discovery::{BeaconScanner, ScanOptions};
use serde_json::json;

fn robot_reply(hostname: &str, name: &str) -> Vec<u8> {
    json!({
        "ver": "3",
        "hostname": hostname,
        "robotname": name,
        "ip": "192.168.1.40",
        "mac": "70:66:55:aa:bb:cc",
        "sw": "v2.4.16-126",
        "sku": "R980020",
        "nc": 0,
        "proto": "mqtt",
        "cap": {"pose": 1, "carpetBoost": 1}
    })
    .to_string()
    .into_bytes()
}

/// Answers the n-th probe with `batches[n]` and returns the probes it saw.
fn spawn_responder(batches: Vec<Vec<Vec<u8>>>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind responder");
    socket
        .set_read_timeout(Some(Duration::from_secs(3)))
        .expect("set timeout");
    let addr = socket.local_addr().expect("local addr");

    let handle = std::thread::spawn(move || {
        let mut probes = Vec::new();
        let mut buf = [0u8; 512];
        for batch in batches {
            let Ok((len, from)) = socket.recv_from(&mut buf) else {
                break;
            };
            probes.push(String::from_utf8_lossy(&buf[..len]).into_owned());
            for datagram in batch {
                socket.send_to(&datagram, from).expect("send reply");
            }
        }
        probes
    });
    (addr, handle)
}

fn scanner_for(target: SocketAddr, attempts: u32) -> BeaconScanner {
    let options = ScanOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        target,
        attempts,
        attempt_timeout: Duration::from_millis(500),
        attempt_interval: Duration::from_millis(10),
    };
    BeaconScanner::new(options, Arc::new(AtomicBool::new(true)))
}

#[test]
fn test_scan_sends_probe_and_decodes_reply() {
    // Arrange
    let (addr, responder) =
        spawn_responder(vec![vec![robot_reply("Roomba-3145C60822630830", "Downstairs")]]);

    // Act
    let found = scanner_for(addr, 1).scan().unwrap();

    // Assert
    assert_eq!(responder.join().unwrap(), vec![PROBE.to_string()]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device_id, "3145C60822630830");
    assert_eq!(found[0].robot_name, "Downstairs");
    assert_eq!(found[0].ip, "192.168.1.40");
    assert_eq!(found[0].capabilities["carpetBoost"], json!(1));
    assert!(found[0].credential.is_none());
}

#[test]
fn test_echo_and_foreign_replies_are_skipped_within_an_attempt() {
    // Arrange: echo, then a non-robot device, then the robot
    let foreign = json!({"hostname": "printer-01", "ip": "192.168.1.9"}).to_string();
    let (addr, responder) = spawn_responder(vec![vec![
        PROBE.as_bytes().to_vec(),
        foreign.into_bytes(),
        robot_reply("iRobot-0000AAAABBBB1111", "Kitchen"),
    ]]);

    // Act
    let found = scanner_for(addr, 1).scan().unwrap();

    // Assert
    responder.join().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device_id, "0000AAAABBBB1111");
}

#[test]
fn test_repeated_replies_from_one_address_are_deduplicated() {
    // Arrange: the robot answers both attempts, renamed in between
    let (addr, responder) = spawn_responder(vec![
        vec![robot_reply("Roomba-3145C60822630830", "Downstairs")],
        vec![robot_reply("Roomba-3145C60822630830", "Living Room")],
    ]);

    // Act
    let found = scanner_for(addr, 2).scan().unwrap();

    // Assert
    assert_eq!(responder.join().unwrap().len(), 2);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].robot_name, "Living Room");
}

#[test]
fn test_malformed_reply_ends_attempt_but_not_scan() {
    // Arrange
    let (addr, responder) = spawn_responder(vec![
        vec![b"{ not json".to_vec()],
        vec![robot_reply("Roomba-3145C60822630830", "Downstairs")],
    ]);

    // Act
    let found = scanner_for(addr, 2).scan().unwrap();

    // Assert
    responder.join().unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_silent_network_yields_empty_result() {
    // Arrange: the responder reads probes but never answers
    let (addr, responder) = spawn_responder(vec![vec![], vec![]]);

    // Act
    let found = scanner_for(addr, 2).scan().unwrap();

    // Assert
    assert_eq!(responder.join().unwrap().len(), 2);
    assert!(found.is_empty());
}

//! Integration tests: run a real server on loopback and talk to it with the
//! protocol crate's client helpers and with raw packets.

use std::io::Cursor;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use tern_protocol::{
    ErrorCode, Packet, Requester, SessionConfig, TransferError, decode, encode,
};
use tern_server::{FileRegistry, Server, ServerConfig};

struct Running {
    addr: SocketAddr,
    registry: Arc<FileRegistry>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
    _dir: tempfile::TempDir,
    store: std::path::PathBuf,
}

impl Running {
    fn requester(&self) -> Requester {
        Requester::new(self.addr, session())
    }

    fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap().unwrap();
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn session() -> SessionConfig {
    SessionConfig {
        timeout: Duration::from_millis(500),
        max_retries: 4,
    }
}

fn start_with(files: &[(&str, &[u8])]) -> Running {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    std::fs::create_dir_all(&store).unwrap();
    for (name, contents) in files {
        std::fs::write(store.join(name), contents).unwrap();
    }

    let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), store.clone());
    config.session = session();
    config.janitor_interval = Duration::from_millis(50);
    config.poll_interval = Duration::from_millis(20);

    let cancel = CancellationToken::new();
    let server = Server::bind(&config, cancel.clone()).unwrap();
    let addr = server.local_addr();
    let registry = server.registry();
    let handle = thread::spawn(move || server.run());

    Running {
        addr,
        registry,
        cancel,
        handle: Some(handle),
        _dir: dir,
        store,
    }
}

fn raw_request(server: SocketAddr, frame: &[u8]) -> (Packet, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    socket.send_to(frame, server).unwrap();
    let mut buf = [0u8; 1024];
    let (len, src) = socket.recv_from(&mut buf).unwrap();
    (decode(&buf[..len]).unwrap(), src)
}

/// Wait for something the worker does after its session has ended.
fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

fn error_code(packet: &Packet) -> ErrorCode {
    match packet {
        Packet::Error { code, .. } => *code,
        other => panic!("expected ERROR, got {:?}", other),
    }
}

#[test]
fn missing_file_answered_from_public_port() {
    let server = start_with(&[]);
    let (reply, src) = raw_request(server.addr, &encode(&Packet::read_request("ghost.txt")));
    assert_eq!(error_code(&reply), ErrorCode::FileNotFound);
    // workers use their own ports; this came from the dispatcher itself
    assert_eq!(src, server.addr);
    server.stop();
}

#[test]
fn upload_then_download() {
    let server = start_with(&[]);
    let data: Vec<u8> = (0..1500u32).map(|i| (i * 7 % 256) as u8).collect();

    let sent = server.requester().upload("fresh.bin", &mut Cursor::new(data.clone())).unwrap();
    assert_eq!(sent.blocks, 3);

    // stored and published before the last ACK reached the client
    assert!(server.registry.exists("fresh.bin"));
    assert_eq!(std::fs::read(server.store.join("fresh.bin")).unwrap(), data);

    let mut back = Vec::new();
    server.requester().download("fresh.bin", &mut back).unwrap();
    assert_eq!(back, data);
    server.stop();
}

#[test]
fn existing_files_are_served() {
    let server = start_with(&[("seed.txt", b"already here")]);
    let mut out = Vec::new();
    server.requester().download("seed.txt", &mut out).unwrap();
    assert_eq!(out, b"already here");
    server.stop();
}

#[test]
fn write_over_existing_name_refused() {
    let server = start_with(&[("taken.txt", b"x")]);
    let err = server
        .requester()
        .upload("taken.txt", &mut Cursor::new(b"y".to_vec()))
        .unwrap_err();
    assert_eq!(err.peer_code(), Some(ErrorCode::FileAlreadyExists));
    assert_eq!(std::fs::read(server.store.join("taken.txt")).unwrap(), b"x");
    server.stop();
}

#[test]
fn delete_refused_while_reading() {
    let server = start_with(&[("busy.txt", b"contents")]);
    let guard = server.registry.begin_read("busy.txt").unwrap();

    let err = server.requester().delete("busy.txt").unwrap_err();
    match err {
        TransferError::Peer { code, message } => {
            assert_eq!(code, ErrorCode::NotDefined);
            assert!(message.contains("active readers"), "{}", message);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(server.store.join("busy.txt").exists());

    drop(guard);
    server.requester().delete("busy.txt").unwrap();
    assert!(!server.store.join("busy.txt").exists());
    assert!(!server.registry.exists("busy.txt"));
    server.stop();
}

#[test]
fn delete_missing_file() {
    let server = start_with(&[]);
    let err = server.requester().delete("nothing").unwrap_err();
    assert_eq!(err.peer_code(), Some(ErrorCode::FileNotFound));
    server.stop();
}

#[test]
fn list_reports_reader_counts() {
    let server = start_with(&[("a.txt", b"1"), ("b.txt", b"2")]);
    let _reading = server.registry.begin_read("b.txt").unwrap();

    let mut listing = Vec::new();
    server.requester().list(&mut listing).unwrap();
    let text = String::from_utf8(listing).unwrap();
    assert_eq!(
        text,
        "a.txt\t [Active Readers] : 0\nb.txt\t [Active Readers] : 1\n"
    );

    // no listing file left behind
    let leftovers: Vec<_> = std::fs::read_dir(&server.store)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tern-"))
        .collect();
    assert!(leftovers.is_empty());
    server.stop();
}

#[test]
fn bad_requests_get_errors_and_server_keeps_going() {
    let server = start_with(&[("ok.txt", b"fine")]);

    let mut netascii = vec![0, 1];
    netascii.extend_from_slice(b"ok.txt\0netascii\0");
    assert_eq!(error_code(&raw_request(server.addr, &netascii).0), ErrorCode::IllegalOperation);

    let escape = encode(&Packet::read_request("../etc/passwd"));
    assert_eq!(error_code(&raw_request(server.addr, &escape).0), ErrorCode::AccessViolation);

    let garbage = [0x00, 0x2A, 0xFF];
    assert_eq!(error_code(&raw_request(server.addr, &garbage).0), ErrorCode::IllegalOperation);

    let stray_ack = encode(&Packet::Ack { block: 3 });
    assert_eq!(error_code(&raw_request(server.addr, &stray_ack).0), ErrorCode::IllegalOperation);

    let mut out = Vec::new();
    server.requester().download("ok.txt", &mut out).unwrap();
    assert_eq!(out, b"fine");
    server.stop();
}

#[test]
fn abandoned_upload_is_discarded() {
    let server = start_with(&[]);

    // WRQ, take the ACK 0, then go silent
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    socket.send_to(&encode(&Packet::write_request("half.bin")), server.addr).unwrap();
    let mut buf = [0u8; 1024];
    let (len, worker) = socket.recv_from(&mut buf).unwrap();
    assert_eq!(decode(&buf[..len]).unwrap(), Packet::Ack { block: 0 });
    assert_ne!(worker, server.addr);
    socket
        .send_to(&encode(&Packet::Data { block: 1, payload: vec![0; 512] }), worker)
        .unwrap();

    // worker retries and gives up: 4 × 500 ms
    thread::sleep(Duration::from_millis(3000));
    assert!(!server.registry.exists("half.bin"));
    let names: Vec<_> = std::fs::read_dir(&server.store).unwrap().filter_map(|e| e.ok()).collect();
    assert!(names.is_empty());

    // the name is free again
    server
        .requester()
        .upload("half.bin", &mut Cursor::new(b"complete".to_vec()))
        .unwrap();
    server.stop();
}

#[test]
fn upload_that_cannot_be_stored_fails_at_the_client() {
    let server = start_with(&[]);
    // a non-empty directory where the upload must land
    std::fs::create_dir(server.store.join("blocked")).unwrap();
    std::fs::write(server.store.join("blocked").join("inner"), b"x").unwrap();

    let err = server
        .requester()
        .upload("blocked", &mut Cursor::new(vec![3u8; 700]))
        .unwrap_err();
    assert_eq!(err.peer_code(), Some(ErrorCode::DiskFull));
    assert!(!server.registry.exists("blocked"));
    assert!(server.store.join("blocked").is_dir());
    server.stop();
}

#[test]
fn reader_count_follows_real_transfers() {
    let contents: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
    let server = start_with(&[("big.bin", contents.as_slice())]);

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 1024];

    // completed read
    socket.send_to(&encode(&Packet::read_request("big.bin")), server.addr).unwrap();
    let mut received = Vec::new();
    let mut expected = 1u16;
    loop {
        let (len, worker) = socket.recv_from(&mut buf).unwrap();
        let Packet::Data { block, payload } = decode(&buf[..len]).unwrap() else {
            panic!("expected DATA");
        };
        if block != expected {
            socket.send_to(&encode(&Packet::Ack { block }), worker).unwrap();
            continue;
        }
        if block == 1 {
            assert_eq!(server.registry.reader_count("big.bin"), Some(1));
            // a delete must wait for this reader
            let err = server.requester().delete("big.bin").unwrap_err();
            assert_eq!(err.peer_code(), Some(ErrorCode::NotDefined));
        }
        expected += 1;
        received.extend_from_slice(&payload);
        socket.send_to(&encode(&Packet::Ack { block }), worker).unwrap();
        if payload.len() < 512 {
            break;
        }
    }
    assert_eq!(received, contents);
    eventually("reader released", || server.registry.reader_count("big.bin") == Some(0));

    // aborted read
    socket.send_to(&encode(&Packet::read_request("big.bin")), server.addr).unwrap();
    let (len, worker) = socket.recv_from(&mut buf).unwrap();
    assert!(matches!(decode(&buf[..len]).unwrap(), Packet::Data { block: 1, .. }));
    assert_eq!(server.registry.reader_count("big.bin"), Some(1));
    socket
        .send_to(&encode(&Packet::error(ErrorCode::NotDefined, "changed my mind")), worker)
        .unwrap();
    eventually("aborted reader released", || server.registry.reader_count("big.bin") == Some(0));

    server.requester().delete("big.bin").unwrap();
    server.stop();
}

#[test]
fn shutdown_returns() {
    let server = start_with(&[]);
    server.stop();
}

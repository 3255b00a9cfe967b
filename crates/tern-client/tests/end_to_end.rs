//! Integration test: client operations against an in-process server,
//! with compression on the way up and expansion on the way down.

use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tern_client::{Client, ClientConfig, ClientError, LISTING_FILE};
use tern_protocol::{ErrorCode, SessionConfig};
use tern_server::{Server, ServerConfig};

struct Fixture {
    cancel: CancellationToken,
    server: Option<JoinHandle<anyhow::Result<()>>>,
    registry: std::sync::Arc<tern_server::FileRegistry>,
    server_dir: std::path::PathBuf,
    config: ClientConfig,
    _tmp: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let server_dir = tmp.path().join("server");
        let session = SessionConfig {
            timeout: Duration::from_millis(500),
            max_retries: 4,
        };

        let mut server_config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), server_dir.clone());
        server_config.session = session;
        server_config.janitor_interval = Duration::from_millis(50);
        server_config.poll_interval = Duration::from_millis(20);

        let cancel = CancellationToken::new();
        let server = Server::bind(&server_config, cancel.clone()).unwrap();
        let mut config = ClientConfig::new(server.local_addr(), tmp.path().join("client"));
        config.session = session;
        let registry = server.registry();

        Self {
            cancel,
            server: Some(thread::spawn(move || server.run())),
            registry,
            server_dir,
            config,
            _tmp: tmp,
        }
    }

    fn client(&self) -> Client {
        Client::new(&self.config).unwrap()
    }

    /// A finished write is visible on the server straight away.
    fn assert_published(&self, name: &str) {
        assert!(self.registry.exists(name), "{} not published", name);
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(server) = self.server.take() {
            let _ = server.join();
        }
    }
}

fn artifacts_in(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tern-"))
        .count()
}

#[test]
fn write_then_read_round_trips_compressed() {
    let fx = Fixture::new();
    let client = fx.client();

    let text = "stop-and-wait keeps exactly one block in flight.\n".repeat(120);
    std::fs::write(client.store().dir().join("notes.txt"), &text).unwrap();

    let sent = client.write("notes.txt").unwrap();
    assert_eq!(sent.file_bytes, text.len() as u64);
    assert!(sent.transfer.bytes < text.len() as u64);
    fx.assert_published("notes.txt");

    // the server keeps the compressed container
    let stored = std::fs::read(fx.server_dir.join("notes.txt")).unwrap();
    assert_eq!(tern_huffman::decode(&stored).unwrap(), text.as_bytes());

    std::fs::remove_file(client.store().dir().join("notes.txt")).unwrap();
    let got = client.read("notes.txt").unwrap();
    assert_eq!(got.file_bytes, text.len() as u64);
    assert_eq!(
        std::fs::read_to_string(client.store().dir().join("notes.txt")).unwrap(),
        text
    );
    assert_eq!(artifacts_in(client.store().dir()), 0);
}

#[test]
fn list_is_saved_locally() {
    let fx = Fixture::new();
    let client = fx.client();

    std::fs::write(client.store().dir().join("one.bin"), [1u8, 2, 3]).unwrap();
    client.write("one.bin").unwrap();
    fx.assert_published("one.bin");

    let listing = client.list().unwrap();
    assert_eq!(listing, "one.bin\t [Active Readers] : 0\n");
    assert_eq!(
        std::fs::read_to_string(client.store().dir().join(LISTING_FILE)).unwrap(),
        listing
    );
}

#[test]
fn delete_then_read_fails() {
    let fx = Fixture::new();
    let client = fx.client();

    std::fs::write(client.store().dir().join("temp.txt"), b"short lived").unwrap();
    client.write("temp.txt").unwrap();
    fx.assert_published("temp.txt");
    // delete straight after write, no waiting
    client.delete("temp.txt").unwrap();

    match client.read("temp.txt") {
        Err(ClientError::Transfer(e)) => assert_eq!(e.peer_code(), Some(ErrorCode::FileNotFound)),
        other => panic!("unexpected result {:?}", other.map(|o| o.file_bytes)),
    }
    assert_eq!(artifacts_in(client.store().dir()), 0);
}

#[test]
fn write_of_missing_local_file() {
    let fx = Fixture::new();
    let client = fx.client();
    assert!(matches!(
        client.write("not-here.txt"),
        Err(ClientError::MissingLocalFile(_))
    ));
}

#[test]
fn empty_file_round_trips() {
    let fx = Fixture::new();
    let client = fx.client();

    std::fs::write(client.store().dir().join("empty"), b"").unwrap();
    client.write("empty").unwrap();
    fx.assert_published("empty");
    std::fs::remove_file(client.store().dir().join("empty")).unwrap();

    let got = client.read("empty").unwrap();
    assert_eq!(got.file_bytes, 0);
    assert!(client.store().dir().join("empty").is_file());
}

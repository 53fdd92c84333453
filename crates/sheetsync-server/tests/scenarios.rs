//! End-to-end scenarios driven over real loopback TCP connections.

use sheetsync_server::Server;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server() -> (Arc<Server>, std::net::SocketAddr) {
    // None of these tests exercise boot-time loading or shutdown
    // persistence, so the directory only needs to exist long enough for
    // `Server::new` to record the path.
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(Server::new(dir.path()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_clone = server.clone();
    tokio::spawn(async move {
        let _ = sheetsync_server::server::accept_loop(server_clone, listener).await;
    });
    (server, addr)
}

struct Client {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    pub id: u64,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr, username: &str, sheet: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        writer.write_all(format!("{username}\n").as_bytes()).await.unwrap();

        // Drain the sheet-name listing up to the empty-line terminator.
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if line.trim().is_empty() {
                break;
            }
        }

        writer.write_all(format!("{sheet}\n").as_bytes()).await.unwrap();

        // Initial state transfer: cellUpdated*/cellSelected* lines, then
        // a bare id line. A fresh sheet has no cells, so the first line
        // here is the id.
        let mut id_line = String::new();
        loop {
            id_line.clear();
            reader.read_line(&mut id_line).await.unwrap();
            let trimmed = id_line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.parse::<u64>().is_ok() {
                break;
            }
        }
        let id: u64 = id_line.trim().parse().unwrap();

        Self { reader, writer, id }
    }

    async fn send_json(&mut self, json: &str) {
        self.writer.write_all(json.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line
    }

    /// Like `connect`, but also returns the initial-state transfer lines
    /// (the cellUpdated*/cellSelected* lines sent before the bare id
    /// line), so a test can inspect what a fresh client was told about
    /// existing selections.
    async fn connect_capturing(addr: std::net::SocketAddr, username: &str, sheet: &str) -> (Self, Vec<String>) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        writer.write_all(format!("{username}\n").as_bytes()).await.unwrap();

        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            if line.trim().is_empty() {
                break;
            }
        }

        writer.write_all(format!("{sheet}\n").as_bytes()).await.unwrap();

        let mut snapshot = Vec::new();
        let id: u64;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(parsed) = trimmed.parse::<u64>() {
                id = parsed;
                break;
            }
            snapshot.push(line);
        }

        (Self { reader, writer, id }, snapshot)
    }
}

#[tokio::test]
async fn select_then_edit_succeeds() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;

    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    let line = alice.recv_line().await;
    assert!(line.contains("cellSelected"), "got: {line}");

    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"100"}"#)
        .await;
    let line = alice.recv_line().await;
    assert!(line.contains("cellUpdated"), "got: {line}");
    assert!(line.contains("\"contents\":\"100\""));
}

#[tokio::test]
async fn edit_without_selection_is_rejected() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;

    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"100"}"#)
        .await;
    let line = alice.recv_line().await;
    assert!(line.contains("requestError"), "got: {line}");
}

#[tokio::test]
async fn circular_formula_is_rejected() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;

    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    alice.recv_line().await;

    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"=A1+1"}"#)
        .await;
    let line = alice.recv_line().await;
    assert!(line.contains("requestError"), "got: {line}");
}

#[tokio::test]
async fn undo_restores_prior_value() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;

    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    alice.recv_line().await;
    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"first"}"#)
        .await;
    alice.recv_line().await;
    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"second"}"#)
        .await;
    alice.recv_line().await;

    alice.send_json(r#"{"requestType":"undo"}"#).await;
    let line = alice.recv_line().await;
    assert!(line.contains("cellUpdated"));
    assert!(line.contains("\"contents\":\"first\""));
}

#[tokio::test]
async fn second_client_sees_broadcast_edit() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;
    let mut bob = Client::connect(addr, "bob", "Budget").await;

    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    alice.recv_line().await;
    // bob also observes alice's selection broadcast
    let bob_line = bob.recv_line().await;
    assert!(bob_line.contains("cellSelected"));

    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"42"}"#)
        .await;
    alice.recv_line().await;

    let bob_line = bob.recv_line().await;
    assert!(bob_line.contains("cellUpdated"));
    assert!(bob_line.contains("\"contents\":\"42\""));
}

#[tokio::test]
async fn revert_cell_restores_previous_history_entry() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;

    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    alice.recv_line().await;
    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"first"}"#)
        .await;
    alice.recv_line().await;

    alice
        .send_json(r#"{"requestType":"revertCell","cellName":"A1"}"#)
        .await;
    let line = alice.recv_line().await;
    assert!(line.contains("cellUpdated"));
    assert!(line.contains("\"contents\":\"\""));
}

#[tokio::test]
async fn new_client_gets_a_consistent_initial_snapshot() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;
    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    alice.recv_line().await;
    alice
        .send_json(r#"{"requestType":"editCell","cellName":"A1","contents":"42"}"#)
        .await;
    alice.recv_line().await;

    let bob = Client::connect(addr, "bob", "Budget").await;
    assert_ne!(bob.id, alice.id);
}

#[tokio::test]
async fn disconnect_notifies_remaining_sessions_and_clears_selection() {
    let (_server, addr) = spawn_server().await;
    let mut alice = Client::connect(addr, "alice", "Budget").await;
    let mut bob = Client::connect(addr, "bob", "Budget").await;

    alice
        .send_json(r#"{"requestType":"selectCell","cellName":"A1"}"#)
        .await;
    alice.recv_line().await;
    let bob_line = bob.recv_line().await;
    assert!(bob_line.contains("cellSelected"));

    let alice_id = alice.id;
    drop(alice);

    let bob_line = bob.recv_line().await;
    assert!(bob_line.contains("\"messageType\":\"disconnected\""), "got: {bob_line}");
    assert!(bob_line.contains(&format!("\"user\":\"{alice_id}\"")), "got: {bob_line}");

    // A client connecting after the disconnect must not be told about
    // alice's now-stale selection on A1.
    let (_carol, snapshot) = Client::connect_capturing(addr, "carol", "Budget").await;
    assert!(
        !snapshot.iter().any(|line| line.contains("cellSelected")),
        "stale selection leaked into initial snapshot: {snapshot:?}"
    );
}

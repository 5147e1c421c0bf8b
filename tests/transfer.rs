use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;

use tftp::{AuthStatus, Client, Config, Credentials, Error, Served, Server, TransferReport};

fn config() -> Config {
    Config::new(Duration::from_millis(500), 5)
}

type ServerTask = JoinHandle<Vec<tftp::Result<Served>>>;

async fn spawn_server(root: &Path, requests: usize) -> (SocketAddr, ServerTask) {
    let store: Credentials = [("alice", "secret")].into_iter().collect();
    let server = Server::bind("127.0.0.1:0", root, store, config()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut served = Vec::with_capacity(requests);
        for _ in 0..requests {
            served.push(server.serve_one().await);
        }
        served
    });
    (addr, handle)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn download_1000_bytes_in_two_blocks() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("data.bin"), pattern(1000)).unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 1).await;
    let client = Client::bind(addr, client_dir.path(), config()).await.unwrap();

    let report = client.download("data.bin").await.unwrap();
    let expected = TransferReport {
        blocks: 2,
        bytes: 1000,
        acks: 2,
    };
    assert_eq!(report, expected);

    let served = server.await.unwrap().pop().unwrap().unwrap();
    assert_eq!(served, Served::Read(expected));
    assert_eq!(
        std::fs::read(client_dir.path().join("data.bin")).unwrap(),
        pattern(1000)
    );
}

#[tokio::test]
async fn download_exact_multiple_of_block_size() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("even.bin"), pattern(1024)).unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 1).await;
    let client = Client::bind(addr, client_dir.path(), config()).await.unwrap();

    let report = client.download("even.bin").await.unwrap();
    assert_eq!(report.blocks, 3);
    assert_eq!(report.bytes, 1024);
    assert!(server.await.unwrap()[0].is_ok());
    assert_eq!(
        std::fs::read(client_dir.path().join("even.bin")).unwrap(),
        pattern(1024)
    );
}

#[tokio::test]
async fn upload_empty_file() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    std::fs::write(client_dir.path().join("empty.bin"), b"").unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 1).await;
    let client = Client::bind(addr, client_dir.path(), config()).await.unwrap();

    let report = client.upload("empty.bin").await.unwrap();
    assert_eq!(report.blocks, 1);
    assert_eq!(report.bytes, 0);
    assert_eq!(report.acks, 0);

    let served = server.await.unwrap().pop().unwrap().unwrap();
    assert!(matches!(served, Served::Write(r) if r.blocks == 1 && r.bytes == 0));
    assert!(std::fs::read(server_dir.path().join("empty.bin"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn upload_exact_multiple_terminates() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    std::fs::write(client_dir.path().join("up.bin"), pattern(1024)).unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 1).await;
    let client = Client::bind(addr, client_dir.path(), config()).await.unwrap();

    let report = client.upload("up.bin").await.unwrap();
    assert_eq!(report.blocks, 3);

    let served = server.await.unwrap().pop().unwrap().unwrap();
    assert!(matches!(served, Served::Write(r) if r.blocks == 3 && r.bytes == 1024));
    assert_eq!(
        std::fs::read(server_dir.path().join("up.bin")).unwrap(),
        pattern(1024)
    );
}

#[tokio::test]
async fn authenticate_against_store() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 3).await;
    let client = Client::bind(addr, client_dir.path(), config()).await.unwrap();

    assert!(client.authenticate("alice", "secret").await.unwrap());
    assert!(!client.authenticate("alice", "wrong").await.unwrap());
    assert!(!client.authenticate("mallory", "secret").await.unwrap());

    let statuses: Vec<Served> = server
        .await
        .unwrap()
        .into_iter()
        .map(|res| res.unwrap())
        .collect();
    assert_eq!(
        statuses,
        vec![
            Served::Auth(AuthStatus::Success),
            Served::Auth(AuthStatus::Failed),
            Served::Auth(AuthStatus::Failed),
        ]
    );
}

#[tokio::test]
async fn authenticate_then_transfer_on_one_socket() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    std::fs::write(server_dir.path().join("a.txt"), b"hello").unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 2).await;
    let client = Client::bind(addr, client_dir.path(), config()).await.unwrap();

    assert!(client.authenticate("alice", "secret").await.unwrap());
    let report = client.download("a.txt").await.unwrap();
    assert_eq!(report.bytes, 5);
    assert_eq!(server.await.unwrap().len(), 2);
    assert_eq!(
        std::fs::read(client_dir.path().join("a.txt")).unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn missing_file_times_out_client() {
    let server_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();

    let (addr, server) = spawn_server(server_dir.path(), 1).await;
    let client = Client::bind(addr, client_dir.path(), Config::new(Duration::from_millis(20), 3))
        .await
        .unwrap();

    let err = client.download("missing.bin").await.unwrap_err();
    assert!(matches!(err, Error::ReceiveTimeout { attempts: 3 }));
    let served = server.await.unwrap().pop().unwrap();
    assert!(matches!(served, Err(Error::FileNotFound(_))));
}

use mineset_remote::{
    Connector, MinerIdentity, MiningConnection, RemoteConfig, RemoteError, TcpConnector,
};
use num_bigint::BigUint;
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
};
use uuid::Uuid;

/// How the mock endpoint behaves after the handshake
#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    Silent,
    SilentHello,
    HangUpAfterHello,
}

async fn spawn_endpoint(behavior: Behavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };

            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    let request: Value = serde_json::from_str(&line).unwrap();
                    let id = request["id"].clone();
                    let method = request["method"].as_str().unwrap_or_default().to_string();

                    let result = match (method.as_str(), behavior) {
                        ("mining.hello", Behavior::HangUpAfterHello) => {
                            let reply = json!({"id": id, "result": true}).to_string() + "\n";
                            let _ = write.write_all(reply.as_bytes()).await;
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            return;
                        }
                        ("mining.hello", Behavior::SilentHello) => continue,
                        ("mining.hello", _) => json!(true),
                        ("mining.get_specification", _) => json!({
                            "name": "octopus",
                            "description": "test chain",
                            "chainId": "octopus",
                            "hashingForDeadlines": "shabal256",
                            "signatureForBlocks": "ed25519",
                            "signatureForDeadlines": "ed25519",
                            "publicKeyForSigningBlocksBase58": "4ZmQ",
                        }),
                        ("mining.get_balance", Behavior::Silent) => continue,
                        ("mining.get_balance", _) => json!("1000000000000000000000"),
                        _ => Value::Null,
                    };

                    let reply = json!({"id": id, "result": result}).to_string() + "\n";
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    format!("tcp://127.0.0.1:{}", port)
}

fn identity() -> MinerIdentity {
    MinerIdentity {
        miner_id: Uuid::new_v4(),
        public_key_base58: "3yZe7d".to_string(),
        signature_for_deadlines: "ed25519".to_string(),
        plot_path: PathBuf::from("/tmp/test.plot"),
    }
}

#[tokio::test]
async fn test_connect_and_get_balance() {
    let uri = spawn_endpoint(Behavior::Answer).await;
    let connector = TcpConnector::new(RemoteConfig::default());

    let connection = connector
        .connect(&identity(), &uri, Duration::from_secs(5))
        .await
        .unwrap();

    let balance = connection
        .get_balance("ed25519", "3yZe7d", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(balance, Some("1000000000000000000000".parse::<BigUint>().unwrap()));

    connection.close().await;
    assert!(connection.is_closed());
}

#[tokio::test]
async fn test_fetch_specification() {
    let uri = spawn_endpoint(Behavior::Answer).await;
    let connector = TcpConnector::default();

    let specification = connector
        .fetch_specification(&uri, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(specification.name, "octopus");
    assert_eq!(specification.signature_for_deadlines, "ed25519");
}

#[tokio::test]
async fn test_balance_timeout_is_distinct() {
    let uri = spawn_endpoint(Behavior::Silent).await;
    let connector = TcpConnector::default();

    let connection = connector
        .connect(&identity(), &uri, Duration::from_secs(5))
        .await
        .unwrap();

    let result = connection
        .get_balance("ed25519", "3yZe7d", Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(RemoteError::Timeout)));
}

#[tokio::test]
async fn test_unanswered_handshake_times_out_within_budget() {
    let uri = spawn_endpoint(Behavior::SilentHello).await;
    let connector = TcpConnector::default();
    let started = std::time::Instant::now();

    let result = connector.connect(&identity(), &uri, Duration::from_millis(200)).await;

    assert!(matches!(result, Err(RemoteError::Timeout)));
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn test_close_callback_fires_when_remote_hangs_up() {
    let uri = spawn_endpoint(Behavior::HangUpAfterHello).await;
    let connector = TcpConnector::default();

    let connection = connector
        .connect(&identity(), &uri, Duration::from_secs(5))
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    connection.on_close(Box::new(move || {
        let _ = tx.send(());
    }));

    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("close callback not fired")
        .unwrap();
    assert!(connection.is_closed());

    let result = connection
        .get_balance("ed25519", "3yZe7d", Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(RemoteError::Closed)));
}

#[tokio::test]
async fn test_local_close_fires_callback_once() {
    let uri = spawn_endpoint(Behavior::Answer).await;
    let connector = TcpConnector::default();

    let connection = connector
        .connect(&identity(), &uri, Duration::from_secs(5))
        .await
        .unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let (tx, rx) = tokio::sync::oneshot::channel();
    let flag = fired.clone();
    connection.on_close(Box::new(move || {
        assert!(!flag.swap(true, Ordering::SeqCst));
        let _ = tx.send(());
    }));

    connection.close().await;
    connection.close().await;

    tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_deployment_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let connector = TcpConnector::default();
    let result = connector
        .connect(&identity(), &format!("tcp://127.0.0.1:{}", port), Duration::from_secs(5))
        .await;

    match result {
        Err(e) => assert!(e.is_transient(), "unexpected error {:?}", e),
        Ok(_) => panic!("connected to a closed port"),
    }
}

mod support;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use pinger_client::model::ResultEvent;
use pinger_client::{ClientError, JsonLineClient, PingerRpc, RpcError};

use support::START_NANOS;

fn run_info(id: u64) -> Value {
    json!({
        "id": id,
        "description": "core",
        "targets": [{"id": 1, "requested": "gw.lab", "resolved": "10.0.0.1", "comment": "gw"}],
        "interval_millisec": 1000,
        "timeout_millisec": 1000,
        "statistics_counts_num": 10,
        "statistics_interval_sec": 1,
        "start_unix_nanosec": START_NANOS,
        "expire_unix_nanosec": START_NANOS + 1,
    })
}

/// Answers each connection according to the request's method.
async fn serve(listener: TcpListener) {
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let Ok(Some(line)) = lines.next_line().await else {
                return;
            };
            let request: Value = serde_json::from_str(&line).expect("request json");
            let replies = match request["method"].as_str() {
                Some("list_runs") => vec![json!({"ok": [run_info(1), run_info(2)]})],
                Some("get_run_info") if request["run_id"] == 1 => {
                    vec![json!({"ok": run_info(1)})]
                }
                Some("get_run_info") => vec![json!({
                    "error": {"code": "not_found", "message": "no such pinger"}
                })],
                Some("stop_run") => vec![json!({"ok": null})],
                Some("stream_results") => vec![
                    json!({"ok": {
                        "type": "ttl_exceeded",
                        "target_id": 1,
                        "sequence": 9,
                        "receive_unix_nanosec": START_NANOS,
                        "peer": "10.9.9.9",
                    }}),
                    json!({"ok": {
                        "type": "timeout",
                        "target_id": 1,
                        "sequence": 10,
                        "receive_unix_nanosec": START_NANOS,
                    }}),
                ],
                _ => vec![json!({"error": {"code": "internal", "message": "unsupported"}})],
            };
            for reply in replies {
                let mut text = reply.to_string();
                text.push('\n');
                if write.write_all(text.as_bytes()).await.is_err() {
                    return;
                }
            }
        });
    }
}

async fn client() -> JsonLineClient {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    tokio::spawn(serve(listener));
    JsonLineClient::connect(address).await.expect("connect")
}

#[tokio::test]
async fn unary_calls_round_trip() {
    let client = client().await;
    let runs = client.list_runs().await.expect("list");
    assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);

    let info = client.get_run_info(1).await.expect("info");
    assert_eq!(info.targets[0].resolved, "10.0.0.1");

    client.stop_run(1).await.expect("stop");
}

#[tokio::test]
async fn server_errors_keep_their_code() {
    let client = client().await;
    assert_eq!(
        client.get_run_info(5).await,
        Err(RpcError::NotFound("no such pinger".to_string()))
    );
    assert!(matches!(
        client.stream_statistics(1).await.expect("stream opened").next_item().await,
        Err(RpcError::Remote(_))
    ));
}

#[tokio::test]
async fn stream_ends_when_the_server_closes() {
    let client = client().await;
    let mut stream = client.stream_results(1).await.expect("stream opened");
    let first = stream.next_item().await.expect("first item");
    assert!(matches!(first, Some(ResultEvent::TtlExceeded { sequence: 9, .. })));
    let second = stream.next_item().await.expect("second item");
    assert!(matches!(second, Some(ResultEvent::Timeout { sequence: 10, .. })));
    assert_eq!(stream.next_item().await, Ok(None));
}

#[tokio::test]
async fn unreachable_server_is_a_setup_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    drop(listener);
    let err = JsonLineClient::connect(address).await.unwrap_err();
    assert!(matches!(err, ClientError::Setup(_)));
}

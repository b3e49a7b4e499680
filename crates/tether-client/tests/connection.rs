//! Integration tests for the client connection.
//!
//! Each test stands up a real TCP peer on an ephemeral port: either the
//! shared server core with a handler closure, or a hand-driven socket when
//! the test needs to misbehave (drop connections, reply with stray frames,
//! stay silent).

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use tether_client::{ConnectOptions, Connection, ConnectionState, ReconnectStrategy};
use tether_common::transport::{frame, JsonCodec, MessageFramer, TcpServer};
use tether_common::{CallbackMessage, TetherError};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns a dispatcher-like peer with echo/add/slow/fail methods.
async fn spawn_test_server() -> std::net::SocketAddr {
    let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        server
            .run_with_handler(|call| async move {
                match call.method.as_str() {
                    "echo" => Ok(CallbackMessage::success(
                        call.id,
                        call.args.into_iter().next().unwrap_or(Value::Null),
                    )),
                    "add" => {
                        let sum: i64 = call.args.iter().filter_map(Value::as_i64).sum();
                        Ok(CallbackMessage::success(call.id, json!(sum)))
                    }
                    "slow" => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(CallbackMessage::success(call.id, json!("slow")))
                    }
                    "fail" => Err(TetherError::raised("oops")),
                    other => Err(TetherError::MethodNotFound(other.to_string())),
                }
            })
            .await
    });
    addr
}

/// Options tuned for tests: fast static backoff, retry forever.
fn fast_options() -> ConnectOptions {
    ConnectOptions {
        max_reconnect_attempts: -1,
        reconnect_delay_base: Duration::from_millis(10),
        reconnect_strategy: ReconnectStrategy::Static,
        ..ConnectOptions::default()
    }
}

/// Reads one framed call from the socket and returns it.
async fn read_call(stream: &mut TcpStream, framer: &mut MessageFramer) -> tether_common::CallMessage {
    let mut buf = vec![0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "peer closed while waiting for a call");
        let mut payloads = framer.feed(&buf[..n]).unwrap();
        if let Some(payload) = payloads.pop() {
            return JsonCodec::decode_call(&payload).unwrap();
        }
    }
}

async fn write_callback(stream: &mut TcpStream, callback: &CallbackMessage) {
    let payload = JsonCodec::encode_callback(callback).unwrap();
    stream.write_all(&frame(&payload).unwrap()).await.unwrap();
}

/// Returns a port that nothing is listening on.
async fn dead_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

#[tokio::test]
async fn test_call_resolves_with_returned_value() {
    let addr = spawn_test_server().await;
    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    let value = timeout(TEST_TIMEOUT, conn.call("echo", vec![json!("hi")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(value, json!("hi"));
    assert_eq!(conn.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_call_with_multiple_args() {
    let addr = spawn_test_server().await;
    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    let value = timeout(
        TEST_TIMEOUT,
        conn.call("add", vec![json!(1), json!(2), json!(39)]),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(value, json!(42));
}

#[tokio::test]
async fn test_remote_error_is_reconstructed() {
    let addr = spawn_test_server().await;
    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    let err = timeout(TEST_TIMEOUT, conn.call("fail", vec![]))
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(err.to_string(), "oops");
}

#[tokio::test]
async fn test_unregistered_method_rejects_not_found() {
    let addr = spawn_test_server().await;
    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    let err = timeout(TEST_TIMEOUT, conn.call("no_such_thing", vec![]))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, TetherError::MethodNotFound(name) if name == "no_such_thing"));
}

#[tokio::test]
async fn test_out_of_order_callbacks_resolve_the_right_calls() {
    let addr = spawn_test_server().await;
    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    // The slow call is issued first; its callback arrives after the fast
    // one's. Each future must still resolve with its own value.
    let (slow, fast) = timeout(TEST_TIMEOUT, async {
        tokio::join!(
            conn.call("slow", vec![]),
            conn.call("echo", vec![json!("fast")]),
        )
    })
    .await
    .unwrap();

    assert_eq!(slow.unwrap(), json!("slow"));
    assert_eq!(fast.unwrap(), json!("fast"));
}

#[tokio::test]
async fn test_stray_frames_are_discarded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut framer = MessageFramer::new();
        let call = read_call(&mut stream, &mut framer).await;

        // Garbage that is not a callback, then a callback for a message id
        // nobody is waiting on, then the real answer.
        stream
            .write_all(&frame(b"definitely not json").unwrap())
            .await
            .unwrap();
        write_callback(&mut stream, &CallbackMessage::success(call.id + 1000, json!("wrong")))
            .await;
        write_callback(&mut stream, &CallbackMessage::success(call.id, json!("right"))).await;
    });

    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    let value = timeout(TEST_TIMEOUT, conn.call("echo", vec![]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(value, json!("right"));
}

#[tokio::test]
async fn test_pending_call_is_settled_when_socket_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut framer = MessageFramer::new();
        // Read the call, then hang up without answering.
        let _ = read_call(&mut stream, &mut framer).await;
        drop(stream);
    });

    let conn = Connection::connect("127.0.0.1", addr.port(), fast_options())
        .await
        .unwrap();

    let err = timeout(TEST_TIMEOUT, conn.call("echo", vec![json!("hi")]))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, TetherError::Connection(_)));
}

#[tokio::test]
async fn test_reconnects_after_socket_loss() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First connection is dropped immediately; the second one is served.
        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut framer = MessageFramer::new();
        loop {
            let call = read_call(&mut stream, &mut framer).await;
            let value = call.args.into_iter().next().unwrap_or(Value::Null);
            write_callback(&mut stream, &CallbackMessage::success(call.id, value)).await;
        }
    });

    let conn = Connection::connect("127.0.0.1", addr.port(), fast_options())
        .await
        .unwrap();

    // Calls fail fast while reconnecting; retry until the new socket is up.
    let value = timeout(TEST_TIMEOUT, async {
        loop {
            match conn.call("echo", vec![json!("back")]).await {
                Ok(value) => return value,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(value, json!("back"));
    assert_eq!(conn.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_exhausted_reconnects_destroy_the_connection() {
    let addr = dead_addr().await;

    let conn = Connection::connect(
        "127.0.0.1",
        addr.port(),
        ConnectOptions {
            max_reconnect_attempts: 2,
            reconnect_delay_base: Duration::ZERO,
            reconnect_strategy: ReconnectStrategy::Static,
            ..ConnectOptions::default()
        },
    )
    .await
    .unwrap();

    // The terminal notification fires exactly once.
    let fatal = conn.fatal().expect("fatal receiver should be available");
    let err = timeout(TEST_TIMEOUT, fatal).await.unwrap().unwrap();
    match err {
        TetherError::TerminalReconnect { attempts } => assert_eq!(attempts, 2),
        other => panic!("expected TerminalReconnect, got {other:?}"),
    }
    assert!(conn.fatal().is_none(), "fatal notification is one-shot");

    assert_eq!(conn.state(), ConnectionState::Destroyed);

    // A subsequent call rejects immediately.
    let err = conn.call("echo", vec![]).await.unwrap_err();
    assert!(matches!(err, TetherError::Connection(_)));
}

#[tokio::test]
async fn test_destroy_settles_pending_calls() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept and hold the connection open, never answering.
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let conn = std::sync::Arc::new(
        Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
            .await
            .unwrap(),
    );
    conn.ready().await.unwrap();

    let caller = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.call("echo", vec![json!("hi")]).await })
    };
    // Let the call get onto the wire before tearing down.
    tokio::time::sleep(Duration::from_millis(50)).await;

    conn.destroy().await;

    let outcome = timeout(TEST_TIMEOUT, caller).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(TetherError::Connection(_))));
    assert_eq!(conn.state(), ConnectionState::Destroyed);

    // Destroy is terminal and silent: no fatal notification fires.
    let err = conn.call("echo", vec![]).await.unwrap_err();
    assert!(matches!(err, TetherError::Connection(_)));
}

#[tokio::test]
async fn test_ready_resolves_once_connected() {
    let addr = spawn_test_server().await;
    let conn = Connection::connect("127.0.0.1", addr.port(), ConnectOptions::default())
        .await
        .unwrap();

    timeout(TEST_TIMEOUT, conn.ready()).await.unwrap().unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_ready_fails_once_destroyed() {
    let addr = dead_addr().await;
    let conn = Connection::connect(
        "127.0.0.1",
        addr.port(),
        ConnectOptions {
            max_reconnect_attempts: 1,
            reconnect_delay_base: Duration::ZERO,
            reconnect_strategy: ReconnectStrategy::Static,
            ..ConnectOptions::default()
        },
    )
    .await
    .unwrap();

    let result = timeout(TEST_TIMEOUT, conn.ready()).await.unwrap();
    assert!(matches!(result, Err(TetherError::Connection(_))));
}

mod common;

use bankcore::application::dispatcher::Dispatcher;
use bankcore::interfaces::tcp::{self, TcpConfig};
use common::{bank, decimal, open_account_line};
use rust_decimal_macros::dec;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(dispatcher: Arc<Dispatcher>, config: TcpConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, dispatcher, config));
    addr
}

/// Sends one command, half-closes, and returns the status flag and JSON body.
async fn call(addr: SocketAddr, line: &str) -> (bool, Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
    read_reply(stream).await
}

async fn read_reply(mut stream: TcpStream) -> (bool, Value) {
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert!(reply.ends_with('\n'), "reply not newline-terminated: {:?}", reply);

    let (status, body) = reply.trim_end().split_once('~').unwrap();
    (status == "1", serde_json::from_str(body).unwrap())
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let bank = bank().await;
    let addr = start(bank.dispatcher.clone(), TcpConfig::default()).await;

    let (ok, body) = call(addr, "abc~acmt~1001").await;
    assert!(!ok);
    assert_eq!(body["error"]["kind"], "authentication");
    assert_eq!(body["error"]["component"], "auth");
}

#[tokio::test]
async fn test_malformed_lines_are_decoder_errors() {
    let bank = bank().await;
    let addr = start(bank.dispatcher.clone(), TcpConfig::default()).await;

    let (ok, body) = call(addr, "0~appauth").await;
    assert!(!ok);
    assert_eq!(body["error"]["kind"], "format");

    let (ok, body) = call(addr, "0~nope~1").await;
    assert!(!ok);
    assert_eq!(body["error"]["kind"], "invalid_command");
    assert_eq!(body["error"]["component"], "decoder");
}

#[tokio::test]
async fn test_open_login_and_transfer_over_socket() {
    let bank = bank().await;
    let addr = start(bank.dispatcher.clone(), TcpConfig::default()).await;

    let alice_line = open_account_line("9001015009081", "Alice", "Tester", "cheque");
    let (ok, alice) = call(addr, &alice_line).await;
    assert!(ok, "{}", alice);
    let bob_line = open_account_line("9101015009082", "Bob", "Tester", "savings");
    let (ok, bob) = call(addr, &bob_line).await;
    assert!(ok, "{}", bob);
    let alice_number = alice["account_number"].as_str().unwrap();
    let bob_number = bob["account_number"].as_str().unwrap();

    let (ok, _) = call(addr, "0~appauth~3~9001015009081~password1\n").await;
    assert!(ok);
    let (ok, login) = call(addr, "0~appauth~2~9001015009081~password1\n").await;
    assert!(ok);
    let token = login["token"].as_str().unwrap();

    let line = format!(
        "{}~pain~1~{}@~{}@~40.00~-33.9~18.4~rent\n",
        token, alice_number, bob_number
    );
    let (ok, transfer) = call(addr, &line).await;
    assert!(ok, "{}", transfer);
    assert_eq!(transfer["status"], "approved");
    assert_eq!(decimal(&transfer["fee"]), dec!(0.004));

    let (ok, accounts) = call(addr, &format!("{}~acmt~1001", token)).await;
    assert!(ok);
    assert_eq!(decimal(&accounts[0]["balance"]), dec!(59.996));

    let line = format!("{}~pain~1001~{}~0~10", token, alice_number);
    let (ok, history) = call(addr, &line).await;
    assert!(ok);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["description"], "rent");
}

#[tokio::test]
async fn test_command_split_across_segments() {
    let bank = bank().await;
    let addr = start(bank.dispatcher.clone(), TcpConfig::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.set_nodelay(true).unwrap();
    stream.write_all(b"0~appauth~3~9001015").await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"009081~password1\n").await.unwrap();

    // Still open for writing: the newline alone ends the command.
    let (ok, body) = read_reply(stream).await;
    assert!(!ok);
    assert_eq!(body["error"]["kind"], "not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("identification number"));
}

#[tokio::test]
async fn test_idle_connection_is_closed_after_timeout() {
    let bank = bank().await;
    let config = TcpConfig {
        max_connections: 4,
        io_timeout: Duration::from_millis(100),
    };
    let addr = start(bank.dispatcher.clone(), config).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server kept the idle connection open");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_connections_beyond_limit_wait_their_turn() {
    let bank = bank().await;
    let config = TcpConfig {
        max_connections: 1,
        io_timeout: Duration::from_millis(200),
    };
    let addr = start(bank.dispatcher.clone(), config).await;

    // Holds the only permit until the read deadline passes.
    let _idle = TcpStream::connect(addr).await.unwrap();
    let (ok, body) = call(addr, "abc~acmt~1001").await;
    assert!(!ok);
    assert_eq!(body["error"]["kind"], "authentication");
}

//! End-to-end forking over loopback TCP.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tlsfork::crypto::CipherSuite;
use tlsfork::{EngineConfig, RecordSession, SessionState, Snapshot};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn connect() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    for stream in [&client, &server] {
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    }
    (client, server)
}

/// Echo every message back until the peer closes.
fn echo<R: Read + Write>(session: &mut R) {
    let mut buf = [0u8; 4096];
    loop {
        match session.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => session.write_all(&buf[..n]).unwrap(),
        }
    }
}

fn expect_echo<S: Read + Write>(session: &mut S, message: &[u8]) {
    session.write_all(message).unwrap();
    let mut echoed = vec![0u8; message.len()];
    session.read_exact(&mut echoed).unwrap();
    assert_eq!(echoed, message);
}

#[test]
fn client_fork_over_tcp() {
    init_tracing();

    for suite in CipherSuite::ALL {
        let config = EngineConfig::with_cipher_suite(suite).server_name("localhost");
        let (client_stream, server_stream) = connect();

        let server_config = config.clone();
        let server = thread::spawn(move || {
            let mut server = RecordSession::server(server_stream, &server_config, None).unwrap();
            server.handshake().unwrap();
            echo(&mut server);
        });

        let mut original = RecordSession::client(&client_stream, &config, None).unwrap();
        original.handshake().unwrap();
        expect_echo(&mut original, b"Hello");

        let snapshot = original.snapshot().unwrap();
        let mut resumed = RecordSession::client(&client_stream, &config, Some(&snapshot)).unwrap();
        assert_eq!(resumed.state(), SessionState::Established);
        assert_eq!(resumed.cipher_suite(), Some(suite.to_u16()));
        expect_echo(&mut resumed, b"Hello");

        resumed.close().unwrap();
        server.join().unwrap();
    }
}

#[test]
fn server_fork_over_tcp() {
    init_tracing();

    let config = EngineConfig::default();
    let (client_stream, server_stream) = connect();

    let client_config = config.clone();
    let client = thread::spawn(move || {
        let mut client = RecordSession::client(client_stream, &client_config, None).unwrap();
        client.handshake().unwrap();
        echo(&mut client);
    });

    let mut original = RecordSession::server(&server_stream, &config, None).unwrap();
    original.handshake().unwrap();
    expect_echo(&mut original, b"from the original server");

    let snapshot = original.snapshot().unwrap();
    let mut resumed = RecordSession::server(&server_stream, &config, Some(&snapshot)).unwrap();
    expect_echo(&mut resumed, b"from the resumed server");

    resumed.close().unwrap();
    client.join().unwrap();
}

#[test]
fn snapshot_survives_serialization() {
    init_tracing();

    let config = EngineConfig::default();
    let (client_stream, server_stream) = connect();

    let server_config = config.clone();
    let server = thread::spawn(move || {
        let mut server = RecordSession::server(server_stream, &server_config, None).unwrap();
        server.handshake().unwrap();
        echo(&mut server);
    });

    let mut original = RecordSession::client(&client_stream, &config, None).unwrap();
    original.handshake().unwrap();
    expect_echo(&mut original, b"before");

    let encoded = original.snapshot().unwrap().to_toml().unwrap();
    drop(original);

    let snapshot = Snapshot::from_toml(&encoded).unwrap();
    let mut resumed = RecordSession::client(&client_stream, &config, Some(&snapshot)).unwrap();
    for i in 0..10 {
        expect_echo(&mut resumed, format!("after {}", i).as_bytes());
    }

    resumed.close().unwrap();
    server.join().unwrap();
}

//! Session benchmarks.
//!
//! Compares a fresh handshake over an in-memory pipe with rebuilding the
//! same session from its snapshot, and measures record throughput.

use std::io::{Read, Write};
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use tlsfork::crypto::{AeadKey, CipherSuite, RecordCipher};
use tlsfork::transport::{pipe, PipeEnd};
use tlsfork::{EngineConfig, RecordSession, Snapshot};

fn connected_pair(config: &EngineConfig) -> (RecordSession<PipeEnd>, RecordSession<PipeEnd>, PipeEnd) {
    let (a, b) = pipe();
    let server_config = config.clone();
    let server = thread::spawn(move || {
        let mut server = RecordSession::server(b, &server_config, None).unwrap();
        server.handshake().unwrap();
        server
    });
    let mut client = RecordSession::client(a.clone(), config, None).unwrap();
    client.handshake().unwrap();
    (client, server.join().unwrap(), a)
}

fn bench_fresh_handshake(c: &mut Criterion) {
    let config = EngineConfig::default();
    c.bench_function("fresh_handshake", |b| {
        b.iter(|| black_box(connected_pair(&config)))
    });
}

fn bench_snapshot_replay(c: &mut Criterion) {
    let config = EngineConfig::default();
    let (client, _server, end) = connected_pair(&config);
    let snapshot: Snapshot = client.snapshot().unwrap();

    // A correct replay never touches the live transport
    c.bench_function("snapshot_replay", |b| {
        b.iter(|| {
            black_box(RecordSession::client(end.clone(), &config, Some(&snapshot)).unwrap())
        })
    });
}

fn bench_application_data(c: &mut Criterion) {
    let config = EngineConfig::default();
    let (mut client, mut server, _end) = connected_pair(&config);
    let payload = vec![0x42u8; 16 * 1024];
    let mut received = vec![0u8; payload.len()];

    let mut group = c.benchmark_group("application_data");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("16k_round", |b| {
        b.iter(|| {
            client.write_all(&payload).unwrap();
            server.read_exact(&mut received).unwrap();
        })
    });
    group.finish();
}

fn bench_record_seal(c: &mut Criterion) {
    let plaintext = vec![0u8; 16 * 1024];
    let mut group = c.benchmark_group("record_seal");
    group.throughput(Throughput::Bytes(plaintext.len() as u64));

    for suite in CipherSuite::ALL {
        let key = AeadKey::from_bytes(vec![0x42u8; suite.key_len()]);
        let cipher = RecordCipher::new(suite, &key, [7u8; 12]).unwrap();
        group.bench_function(suite.name(), |b| {
            b.iter(|| black_box(cipher.seal(1, &plaintext, b"header").unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fresh_handshake,
    bench_snapshot_replay,
    bench_application_data,
    bench_record_seal,
);

criterion_main!(benches);

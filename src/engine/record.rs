//! Built-in record-layer engine.
//!
//! A compact TLS-1.3-shaped protocol:
//!
//! ```text
//! Client                                   Server
//! ClientHello (random, suites, key share) -->
//!                       <-- ServerHello (random, suite, key share)
//!                       <-- {Finished}          server seq 0
//! {Finished}  -->                               client seq 0
//! [Application Data] <------------------> [Application Data]
//! ```
//!
//! Each side draws exactly 64 bytes from its randomness source per
//! handshake (hello random plus X25519 secret) and may draw one extra
//! probe byte during key derivation.

use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, trace};

use crate::crypto::kdf::{finished_mac, transcript_hash, verify_finished};
use crate::crypto::random::maybe_read_byte;
use crate::crypto::{
    ciphertext_len, CipherSuite, EphemeralSecret, PublicKey, RecordCipher, SharedSecret, TrafficKeys,
    HASH_SIZE,
};
use crate::engine::handshake::{
    encode_finished, parse_finished, ClientHello, ContentType, ServerHello, LEGACY_VERSION,
    RANDOM_SIZE,
};
use crate::engine::{
    EngineCapabilities, EngineConfig, Role, SequenceState, TlsEngine, SEQUENCE_LAYOUT_VERSION,
};
use crate::error::{Error, Result};
use crate::SEQUENCE_WIDTH;

/// Record header: type(1) + version(2) + length(2)
pub const RECORD_HEADER_LEN: usize = 5;

/// Largest plaintext carried in one record
pub const MAX_PLAINTEXT_LEN: usize = 16 * 1024;

/// Largest record body accepted from the wire
const MAX_RECORD_LEN: usize = ciphertext_len(MAX_PLAINTEXT_LEN) + 256;

/// Alert level and description of close_notify
const CLOSE_NOTIFY: [u8; 2] = [1, 0];

/// The built-in engine.
pub struct RecordEngine<S, R> {
    role: Role,
    stream: S,
    entropy: R,
    config: EngineConfig,
    suite: Option<CipherSuite>,
    alpn: Option<String>,
    read_cipher: Option<RecordCipher>,
    write_cipher: Option<RecordCipher>,
    read_seq: u64,
    write_seq: u64,
    plaintext: BytesMut,
    handshake_complete: bool,
    handshake_failed: bool,
    peer_closed: bool,
}

impl<S, R> RecordEngine<S, R>
where
    S: Read + Write,
    R: RngCore + CryptoRng,
{
    /// Negotiated application protocol.
    pub fn alpn_protocol(&self) -> Option<&str> {
        self.alpn.as_deref()
    }

    /// The engine's role.
    pub fn role(&self) -> Role {
        self.role
    }

    fn client_handshake(&mut self) -> Result<()> {
        let mut random = [0u8; RANDOM_SIZE];
        self.entropy.fill_bytes(&mut random);
        let secret = EphemeralSecret::generate(&mut self.entropy);

        let client_hello = ClientHello {
            random,
            cipher_suites: self.config.cipher_suites.iter().map(|s| s.to_u16()).collect(),
            server_name: Some(self.config.server_name.clone()).filter(|n| !n.is_empty()),
            alpn: self.config.alpn.clone(),
            key_share: Some(PublicKey::from(&secret)),
        }
        .encode();
        self.write_plain_record(ContentType::Handshake, &client_hello)?;

        let server_hello = self.read_plain_handshake()?;
        let parsed = ServerHello::parse(&server_hello)?;
        let suite = CipherSuite::from_u16(parsed.cipher_suite)
            .filter(|s| self.config.cipher_suites.contains(s))
            .ok_or_else(|| {
                Error::handshake(format!(
                    "server selected unoffered cipher suite {:#06x}",
                    parsed.cipher_suite
                ))
            })?;
        let server_key = parsed
            .key_share
            .ok_or_else(|| Error::handshake("ServerHello carries no X25519 key share"))?;

        let shared = secret.diffie_hellman(&server_key);
        let transcript = transcript_hash(&[client_hello.as_slice(), server_hello.as_slice()]);
        let keys = self.derive_keys(suite, &shared, &transcript)?;
        self.read_cipher = Some(keys.server_cipher(suite)?);
        self.write_cipher = Some(keys.client_cipher(suite)?);
        self.suite = Some(suite);
        self.alpn = parsed.alpn;

        let server_finished = self.read_sealed_handshake()?;
        if !verify_finished(keys.server_finished_key(), &transcript, parse_finished(&server_finished)?) {
            return Err(Error::handshake("server Finished verification failed"));
        }

        let transcript = transcript_hash(&[
            client_hello.as_slice(),
            server_hello.as_slice(),
            server_finished.as_slice(),
        ]);
        let verify_data = finished_mac(keys.client_finished_key(), &transcript);
        self.write_sealed_record(ContentType::Handshake, &encode_finished(&verify_data))?;

        Ok(())
    }

    fn server_handshake(&mut self) -> Result<()> {
        let client_hello = self.read_plain_handshake()?;
        let parsed = ClientHello::parse(&client_hello)?;

        let suite = self
            .config
            .cipher_suites
            .iter()
            .copied()
            .find(|s| parsed.cipher_suites.contains(&s.to_u16()))
            .ok_or_else(|| Error::handshake("no shared cipher suite"))?;
        let client_key = parsed
            .key_share
            .ok_or_else(|| Error::handshake("ClientHello carries no X25519 key share"))?;
        let alpn = self
            .config
            .alpn
            .iter()
            .find(|p| parsed.alpn.contains(p))
            .cloned();

        let mut random = [0u8; RANDOM_SIZE];
        self.entropy.fill_bytes(&mut random);
        let secret = EphemeralSecret::generate(&mut self.entropy);

        let server_hello = ServerHello {
            random,
            cipher_suite: suite.to_u16(),
            alpn: alpn.clone(),
            key_share: Some(PublicKey::from(&secret)),
        }
        .encode();
        self.write_plain_record(ContentType::Handshake, &server_hello)?;

        let shared = secret.diffie_hellman(&client_key);
        let transcript = transcript_hash(&[client_hello.as_slice(), server_hello.as_slice()]);
        let keys = self.derive_keys(suite, &shared, &transcript)?;
        self.read_cipher = Some(keys.client_cipher(suite)?);
        self.write_cipher = Some(keys.server_cipher(suite)?);
        self.suite = Some(suite);
        self.alpn = alpn;

        let server_finished = encode_finished(&finished_mac(keys.server_finished_key(), &transcript));
        self.write_sealed_record(ContentType::Handshake, &server_finished)?;

        let client_finished = self.read_sealed_handshake()?;
        let transcript = transcript_hash(&[
            client_hello.as_slice(),
            server_hello.as_slice(),
            server_finished.as_slice(),
        ]);
        if !verify_finished(keys.client_finished_key(), &transcript, parse_finished(&client_finished)?) {
            return Err(Error::handshake("client Finished verification failed"));
        }

        Ok(())
    }

    fn derive_keys(
        &mut self,
        suite: CipherSuite,
        shared: &SharedSecret,
        transcript: &[u8; HASH_SIZE],
    ) -> Result<TrafficKeys> {
        if maybe_read_byte(&mut self.entropy) {
            trace!("probe byte drawn during key derivation");
        }
        TrafficKeys::derive(suite, shared, transcript)
    }

    fn write_plain_record(&mut self, content_type: ContentType, body: &[u8]) -> Result<()> {
        let header = record_header(content_type, body.len())?;
        self.stream.write_all(&header)?;
        self.stream.write_all(body)?;
        self.stream.flush()?;
        Ok(())
    }

    fn write_sealed_record(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<()> {
        let cipher = self
            .write_cipher
            .as_ref()
            .ok_or(Error::NotReady("no write keys"))?;
        let header = record_header(content_type, ciphertext_len(plaintext.len()))?;
        let sealed = cipher.seal(self.write_seq, plaintext, &header)?;
        self.write_seq = self
            .write_seq
            .checked_add(1)
            .ok_or_else(|| Error::crypto("write sequence number exhausted"))?;

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + sealed.len());
        record.extend_from_slice(&header);
        record.extend_from_slice(&sealed);
        self.stream.write_all(&record)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read one record. `None` on a clean end of stream.
    fn read_record(&mut self) -> Result<Option<(ContentType, [u8; RECORD_HEADER_LEN], Vec<u8>)>> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        let mut filled = 0;
        while filled < RECORD_HEADER_LEN {
            let n = self.stream.read(&mut header[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            filled += n;
        }

        let content_type = ContentType::from_u8(header[0])
            .ok_or_else(|| Error::invalid(format!("unknown record type {}", header[0])))?;
        if u16::from_be_bytes([header[1], header[2]]) != LEGACY_VERSION {
            return Err(Error::invalid("unexpected record version"));
        }
        let len = u16::from_be_bytes([header[3], header[4]]) as usize;
        if len > MAX_RECORD_LEN {
            return Err(Error::invalid(format!("record of {} bytes too large", len)));
        }

        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body)?;
        Ok(Some((content_type, header, body)))
    }

    fn read_plain_handshake(&mut self) -> Result<Vec<u8>> {
        match self.read_record()? {
            Some((ContentType::Handshake, _, body)) => Ok(body),
            Some((content_type, _, _)) => Err(Error::handshake(format!(
                "expected handshake record, got {:?}",
                content_type
            ))),
            None => Err(Error::Network(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            ))),
        }
    }

    fn read_sealed_handshake(&mut self) -> Result<Vec<u8>> {
        match self.read_sealed()? {
            Some((ContentType::Handshake, body)) => Ok(body),
            Some((content_type, _)) => Err(Error::handshake(format!(
                "expected encrypted handshake record, got {:?}",
                content_type
            ))),
            None => Err(Error::Network(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            ))),
        }
    }

    fn read_sealed(&mut self) -> Result<Option<(ContentType, Vec<u8>)>> {
        let Some((content_type, header, body)) = self.read_record()? else {
            return Ok(None);
        };
        let cipher = self
            .read_cipher
            .as_ref()
            .ok_or(Error::NotReady("no read keys"))?;
        let plaintext = cipher.open(self.read_seq, &body, &header)?;
        self.read_seq = self
            .read_seq
            .checked_add(1)
            .ok_or_else(|| Error::crypto("read sequence number exhausted"))?;
        Ok(Some((content_type, plaintext)))
    }

    fn ensure_handshake(&mut self) -> Result<()> {
        if self.handshake_complete {
            Ok(())
        } else {
            self.handshake()
        }
    }
}

fn record_header(content_type: ContentType, len: usize) -> Result<[u8; RECORD_HEADER_LEN]> {
    let len = u16::try_from(len).map_err(|_| Error::Buffer {
        expected: u16::MAX as usize,
        actual: len,
    })?;
    let [v0, v1] = LEGACY_VERSION.to_be_bytes();
    let [l0, l1] = len.to_be_bytes();
    Ok([content_type as u8, v0, v1, l0, l1])
}

impl<S, R> TlsEngine<S, R> for RecordEngine<S, R>
where
    S: Read + Write,
    R: RngCore + CryptoRng,
{
    type Config = EngineConfig;

    fn capabilities() -> EngineCapabilities {
        EngineCapabilities {
            sequence_layout_version: SEQUENCE_LAYOUT_VERSION,
            counter_width: SEQUENCE_WIDTH,
            exports_sequence: true,
            imports_sequence: true,
        }
    }

    fn new(role: Role, stream: S, entropy: R, config: &EngineConfig) -> Self {
        Self {
            role,
            stream,
            entropy,
            config: config.clone(),
            suite: None,
            alpn: None,
            read_cipher: None,
            write_cipher: None,
            read_seq: 0,
            write_seq: 0,
            plaintext: BytesMut::new(),
            handshake_complete: false,
            handshake_failed: false,
            peer_closed: false,
        }
    }

    fn handshake(&mut self) -> Result<()> {
        if self.handshake_complete {
            return Ok(());
        }
        if self.handshake_failed {
            return Err(Error::handshake("an earlier handshake attempt failed"));
        }
        self.config.validate()?;

        let result = match self.role {
            Role::Client => self.client_handshake(),
            Role::Server => self.server_handshake(),
        };
        match result {
            Ok(()) => {
                self.handshake_complete = true;
                debug!(
                    role = ?self.role,
                    suite = self.suite.map(|s| s.name()),
                    alpn = self.alpn.as_deref(),
                    "handshake complete"
                );
                Ok(())
            }
            Err(e) => {
                self.handshake_failed = true;
                self.read_cipher = None;
                self.write_cipher = None;
                Err(e)
            }
        }
    }

    fn is_handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_handshake()?;
        if buf.is_empty() {
            return Ok(0);
        }

        while self.plaintext.is_empty() {
            if self.peer_closed {
                return Ok(0);
            }
            match self.read_sealed()? {
                None => return Ok(0),
                Some((ContentType::ApplicationData, data)) => {
                    trace!(len = data.len(), seq = self.read_seq - 1, "application data record");
                    self.plaintext.extend_from_slice(&data);
                }
                Some((ContentType::Alert, alert)) => {
                    if alert[..] == CLOSE_NOTIFY[..] {
                        debug!("peer sent close_notify");
                        self.peer_closed = true;
                    } else {
                        return Err(Error::invalid(format!("peer sent alert {:?}", alert)));
                    }
                }
                Some((ContentType::Handshake, _)) => {
                    return Err(Error::invalid("unexpected post-handshake message"));
                }
            }
        }

        let n = buf.len().min(self.plaintext.len());
        buf[..n].copy_from_slice(&self.plaintext[..n]);
        self.plaintext.advance(n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_handshake()?;
        for chunk in buf.chunks(MAX_PLAINTEXT_LEN) {
            self.write_sealed_record(ContentType::ApplicationData, chunk)?;
        }
        Ok(buf.len())
    }

    fn close_notify(&mut self) -> Result<()> {
        if !self.handshake_complete {
            return Ok(());
        }
        self.write_sealed_record(ContentType::Alert, &CLOSE_NOTIFY)
    }

    fn cipher_suite(&self) -> Option<u16> {
        self.suite.map(CipherSuite::to_u16)
    }

    fn sequence(&self) -> Result<SequenceState> {
        if !self.handshake_complete {
            return Err(Error::NotReady("handshake not complete"));
        }
        Ok(SequenceState::from_counters(self.read_seq, self.write_seq))
    }

    fn set_sequence(&mut self, state: SequenceState) -> Result<()> {
        if !self.handshake_complete {
            return Err(Error::NotReady("handshake not complete"));
        }
        self.read_seq = state.inbound_counter();
        self.write_seq = state.outbound_counter();
        Ok(())
    }

    fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    fn entropy_mut(&mut self) -> &mut R {
        &mut self.entropy
    }

    fn into_parts(self) -> (S, R) {
        (self.stream, self.entropy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{pipe, PipeEnd};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;

    type Engine = RecordEngine<PipeEnd, StdRng>;

    fn connected(
        client_config: EngineConfig,
        server_config: EngineConfig,
    ) -> (Result<Engine>, Result<Engine>) {
        let (a, b) = pipe();
        let server = thread::spawn(move || {
            let mut engine = Engine::new(Role::Server, b, StdRng::seed_from_u64(2), &server_config);
            engine.handshake().map(|()| engine)
        });
        let mut client = Engine::new(Role::Client, a, StdRng::seed_from_u64(1), &client_config);
        let client = client.handshake().map(|()| client);
        (client, server.join().unwrap())
    }

    #[test]
    fn test_handshake_and_data_all_suites() {
        for suite in CipherSuite::ALL {
            let config = EngineConfig::with_cipher_suite(suite);
            let (client, server) = connected(config.clone(), config);
            let (mut client, mut server) = (client.unwrap(), server.unwrap());

            assert_eq!(client.cipher_suite(), Some(suite.to_u16()));
            assert_eq!(server.cipher_suite(), Some(suite.to_u16()));

            client.write(b"hello").unwrap();
            let mut buf = [0u8; 16];
            let n = server.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"hello");
        }
    }

    #[test]
    fn test_counters_after_handshake() {
        let (client, server) = connected(EngineConfig::default(), EngineConfig::default());
        let (mut client, server) = (client.unwrap(), server.unwrap());

        assert_eq!(client.sequence().unwrap(), SequenceState::from_counters(1, 1));
        assert_eq!(server.sequence().unwrap(), SequenceState::from_counters(1, 1));

        client.write(b"x").unwrap();
        client.write(b"y").unwrap();
        assert_eq!(client.sequence().unwrap().outbound_counter(), 3);
    }

    #[test]
    fn test_server_preference_wins() {
        let client = EngineConfig {
            cipher_suites: vec![CipherSuite::Aes128Gcm, CipherSuite::Aes256Gcm],
            ..EngineConfig::default()
        };
        let server = EngineConfig {
            cipher_suites: vec![CipherSuite::Aes256Gcm, CipherSuite::Aes128Gcm],
            ..EngineConfig::default()
        }
        .alpn(["h2"]);
        let (client, _server) = connected(client.alpn(["http/1.1", "h2"]), server);
        let client = client.unwrap();
        assert_eq!(client.cipher_suite(), Some(0x1302));
        assert_eq!(client.alpn_protocol(), Some("h2"));
    }

    #[test]
    fn test_no_shared_suite() {
        let (a, b) = pipe();
        let mut server = Engine::new(
            Role::Server,
            b,
            StdRng::seed_from_u64(2),
            &EngineConfig::with_cipher_suite(CipherSuite::Aes256Gcm),
        );
        let mut client = Engine::new(
            Role::Client,
            a.clone(),
            StdRng::seed_from_u64(1),
            &EngineConfig::with_cipher_suite(CipherSuite::Aes128Gcm),
        );
        // The ClientHello is written before the client blocks on the reply
        let client_thread = thread::spawn(move || client.handshake());

        assert!(matches!(server.handshake(), Err(Error::Handshake(_))));
        assert!(!server.is_handshake_complete());
        assert!(server.sequence().is_err());

        let mut server_end = server.into_parts().0;
        crate::transport::Transport::close(&mut server_end).unwrap();
        assert!(client_thread.join().unwrap().is_err());
    }

    #[test]
    fn test_large_write_is_chunked() {
        let (client, server) = connected(EngineConfig::default(), EngineConfig::default());
        let (mut client, mut server) = (client.unwrap(), server.unwrap());

        let data = vec![0x5au8; MAX_PLAINTEXT_LEN * 2 + 10];
        let expected = data.clone();
        let writer = thread::spawn(move || {
            client.write(&data).unwrap();
            client
        });

        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while received.len() < expected.len() {
            let n = server.read(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, expected);
        assert_eq!(writer.join().unwrap().sequence().unwrap().outbound_counter(), 4);
    }

    #[test]
    fn test_close_notify_reads_as_eof() {
        let (client, server) = connected(EngineConfig::default(), EngineConfig::default());
        let (mut client, mut server) = (client.unwrap(), server.unwrap());

        client.write(b"bye").unwrap();
        client.close_notify().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).unwrap(), 3);
        assert_eq!(server.read(&mut buf).unwrap(), 0);
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_tampered_record_rejected() {
        let (client, server) = connected(EngineConfig::default(), EngineConfig::default());
        let (mut client, mut server) = (client.unwrap(), server.unwrap());

        // Skip one outbound counter so the peer derives the wrong nonce
        client
            .set_sequence(SequenceState::from_counters(1, 2))
            .unwrap();
        client.write(b"data").unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(server.read(&mut buf), Err(Error::Crypto(_))));
    }
}

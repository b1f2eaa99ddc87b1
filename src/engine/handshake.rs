//! Handshake message construction and parsing.
//!
//! Messages follow the TLS 1.3 wire layout (handshake header, legacy
//! version, 32-byte random, extensions) so that the recorded byte stream
//! looks like an ordinary handshake. Only X25519 key shares are supported.

use bytes::{BufMut, BytesMut};

use crate::crypto::{PublicKey, HASH_SIZE, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

/// Legacy record/handshake version (TLS 1.2)
pub(crate) const LEGACY_VERSION: u16 = 0x0303;

/// TLS 1.3 in the supported_versions extension
const TLS13_VERSION: u16 = 0x0304;

/// X25519 named group
const GROUP_X25519: u16 = 0x001d;

/// Size of the hello random fields
pub const RANDOM_SIZE: usize = 32;

/// TLS record types
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    /// Alert record
    Alert = 21,
    /// Handshake record
    Handshake = 22,
    /// Application data record
    ApplicationData = 23,
}

impl ContentType {
    /// Parse a record type byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// TLS handshake types
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeType {
    /// First client flight
    ClientHello = 1,
    /// Server's answer
    ServerHello = 2,
    /// Handshake MAC
    Finished = 20,
}

#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq)]
enum ExtensionType {
    ServerName = 0,
    SupportedGroups = 10,
    ApplicationLayerProtocolNegotiation = 16,
    SupportedVersions = 43,
    KeyShare = 51,
}

/// A ClientHello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientHello {
    /// Client random
    pub random: [u8; RANDOM_SIZE],
    /// Offered cipher suites, in preference order
    pub cipher_suites: Vec<u16>,
    /// Server name indication
    pub server_name: Option<String>,
    /// Offered application protocols
    pub alpn: Vec<String>,
    /// Client's X25519 key share
    pub key_share: Option<PublicKey>,
}

impl ClientHello {
    /// Encode as a handshake message (header included).
    pub fn encode(&self) -> Vec<u8> {
        let mut body = BytesMut::with_capacity(256);

        body.put_u16(LEGACY_VERSION);
        body.put_slice(&self.random);

        // Legacy session ID (empty for TLS 1.3)
        body.put_u8(0);

        body.put_u16((self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            body.put_u16(*suite);
        }

        // Compression methods (null only)
        body.put_u8(1);
        body.put_u8(0);

        let mut extensions = BytesMut::with_capacity(160);
        if let Some(name) = &self.server_name {
            write_sni_extension(&mut extensions, name);
        }
        write_supported_groups(&mut extensions);
        if !self.alpn.is_empty() {
            write_alpn_extension(&mut extensions, &self.alpn);
        }
        extensions.put_u16(ExtensionType::SupportedVersions as u16);
        extensions.put_u16(3);
        extensions.put_u8(2);
        extensions.put_u16(TLS13_VERSION);
        if let Some(key) = &self.key_share {
            let entry_len = 2 + 2 + PUBLIC_KEY_SIZE;
            extensions.put_u16(ExtensionType::KeyShare as u16);
            extensions.put_u16((2 + entry_len) as u16);
            extensions.put_u16(entry_len as u16);
            write_key_share_entry(&mut extensions, key);
        }

        body.put_u16(extensions.len() as u16);
        body.put_slice(&extensions);

        wrap_message(HandshakeType::ClientHello, &body)
    }

    /// Parse a ClientHello handshake message.
    pub fn parse(message: &[u8]) -> Result<Self> {
        let mut body = unwrap_message(message, HandshakeType::ClientHello)?;

        check_legacy_version(&mut body)?;
        let random = take_random(&mut body)?;
        take_u8_prefixed(&mut body, "session id")?;

        let suites = take_u16_prefixed(&mut body, "cipher suites")?;
        if suites.len() % 2 != 0 {
            return Err(Error::invalid("odd cipher suite list length"));
        }
        let cipher_suites = suites
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        take_u8_prefixed(&mut body, "compression methods")?;

        let mut hello = ClientHello {
            random,
            cipher_suites,
            server_name: None,
            alpn: Vec::new(),
            key_share: None,
        };

        for (ext_type, mut data) in parse_extensions(&mut body)? {
            if ext_type == ExtensionType::ServerName as u16 {
                let mut list = take_u16_prefixed(&mut data, "server name list")?;
                if take_u8(&mut list, "server name type")? == 0 {
                    let name = take_u16_prefixed(&mut list, "server name")?;
                    hello.server_name = Some(
                        String::from_utf8(name.to_vec())
                            .map_err(|_| Error::invalid("server name is not UTF-8"))?,
                    );
                }
            } else if ext_type == ExtensionType::ApplicationLayerProtocolNegotiation as u16 {
                hello.alpn = parse_alpn_list(&mut data)?;
            } else if ext_type == ExtensionType::KeyShare as u16 {
                let mut entries = take_u16_prefixed(&mut data, "key share list")?;
                while !entries.is_empty() {
                    if let Some(key) = parse_key_share_entry(&mut entries)? {
                        hello.key_share = Some(key);
                    }
                }
            }
        }

        Ok(hello)
    }
}

/// A ServerHello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerHello {
    /// Server random
    pub random: [u8; RANDOM_SIZE],
    /// Selected cipher suite
    pub cipher_suite: u16,
    /// Selected application protocol
    pub alpn: Option<String>,
    /// Server's X25519 key share
    pub key_share: Option<PublicKey>,
}

impl ServerHello {
    /// Encode as a handshake message (header included).
    pub fn encode(&self) -> Vec<u8> {
        let mut body = BytesMut::with_capacity(128);

        body.put_u16(LEGACY_VERSION);
        body.put_slice(&self.random);
        body.put_u8(0);
        body.put_u16(self.cipher_suite);
        body.put_u8(0);

        let mut extensions = BytesMut::with_capacity(64);
        extensions.put_u16(ExtensionType::SupportedVersions as u16);
        extensions.put_u16(2);
        extensions.put_u16(TLS13_VERSION);
        if let Some(key) = &self.key_share {
            extensions.put_u16(ExtensionType::KeyShare as u16);
            extensions.put_u16((2 + 2 + PUBLIC_KEY_SIZE) as u16);
            write_key_share_entry(&mut extensions, key);
        }
        if let Some(protocol) = &self.alpn {
            write_alpn_extension(&mut extensions, std::slice::from_ref(protocol));
        }

        body.put_u16(extensions.len() as u16);
        body.put_slice(&extensions);

        wrap_message(HandshakeType::ServerHello, &body)
    }

    /// Parse a ServerHello handshake message.
    pub fn parse(message: &[u8]) -> Result<Self> {
        let mut body = unwrap_message(message, HandshakeType::ServerHello)?;

        check_legacy_version(&mut body)?;
        let random = take_random(&mut body)?;
        take_u8_prefixed(&mut body, "session id")?;
        let suite = take(&mut body, 2, "cipher suite")?;
        let cipher_suite = u16::from_be_bytes([suite[0], suite[1]]);
        let _compression = take_u8(&mut body, "compression method")?;

        let mut hello = ServerHello {
            random,
            cipher_suite,
            alpn: None,
            key_share: None,
        };

        for (ext_type, mut data) in parse_extensions(&mut body)? {
            if ext_type == ExtensionType::KeyShare as u16 {
                hello.key_share = parse_key_share_entry(&mut data)?;
            } else if ext_type == ExtensionType::ApplicationLayerProtocolNegotiation as u16 {
                hello.alpn = parse_alpn_list(&mut data)?.into_iter().next();
            }
        }

        Ok(hello)
    }
}

/// Encode a Finished message.
pub(crate) fn encode_finished(verify_data: &[u8; HASH_SIZE]) -> Vec<u8> {
    wrap_message(HandshakeType::Finished, verify_data)
}

/// Extract verify data from a Finished message.
pub(crate) fn parse_finished(message: &[u8]) -> Result<&[u8]> {
    unwrap_message(message, HandshakeType::Finished)
}

fn wrap_message(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u8(msg_type as u8);
    buf.put_uint(body.len() as u64, 3);
    buf.put_slice(body);
    buf.to_vec()
}

fn unwrap_message(message: &[u8], expected: HandshakeType) -> Result<&[u8]> {
    let mut rest = message;
    let header = take(&mut rest, 4, "handshake header")?;
    if header[0] != expected as u8 {
        return Err(Error::handshake(format!(
            "expected {:?}, got handshake type {}",
            expected, header[0]
        )));
    }
    let len = ((header[1] as usize) << 16) | ((header[2] as usize) << 8) | (header[3] as usize);
    if rest.len() != len {
        return Err(Error::invalid(format!(
            "{:?} length {} does not match body of {} bytes",
            expected,
            len,
            rest.len()
        )));
    }
    Ok(rest)
}

fn write_sni_extension(buf: &mut BytesMut, name: &str) {
    let name = name.as_bytes();
    let list_len = 3 + name.len(); // type(1) + len(2) + name

    buf.put_u16(ExtensionType::ServerName as u16);
    buf.put_u16((2 + list_len) as u16);
    buf.put_u16(list_len as u16);
    buf.put_u8(0); // Host name type
    buf.put_u16(name.len() as u16);
    buf.put_slice(name);
}

fn write_supported_groups(buf: &mut BytesMut) {
    buf.put_u16(ExtensionType::SupportedGroups as u16);
    buf.put_u16(4);
    buf.put_u16(2);
    buf.put_u16(GROUP_X25519);
}

fn write_alpn_extension(buf: &mut BytesMut, protocols: &[String]) {
    let mut list = BytesMut::new();
    for proto in protocols {
        list.put_u8(proto.len() as u8);
        list.put_slice(proto.as_bytes());
    }

    buf.put_u16(ExtensionType::ApplicationLayerProtocolNegotiation as u16);
    buf.put_u16((2 + list.len()) as u16);
    buf.put_u16(list.len() as u16);
    buf.put_slice(&list);
}

fn write_key_share_entry(buf: &mut BytesMut, key: &PublicKey) {
    buf.put_u16(GROUP_X25519);
    buf.put_u16(PUBLIC_KEY_SIZE as u16);
    buf.put_slice(key.as_bytes());
}

fn parse_key_share_entry(data: &mut &[u8]) -> Result<Option<PublicKey>> {
    let group = take(data, 2, "key share group")?;
    let key = take_u16_prefixed(data, "key share")?;
    if u16::from_be_bytes([group[0], group[1]]) != GROUP_X25519 {
        return Ok(None);
    }
    let key: [u8; PUBLIC_KEY_SIZE] = key
        .try_into()
        .map_err(|_| Error::invalid(format!("X25519 key share of {} bytes", key.len())))?;
    Ok(Some(PublicKey::from_bytes(key)))
}

fn parse_alpn_list(data: &mut &[u8]) -> Result<Vec<String>> {
    let mut list = take_u16_prefixed(data, "ALPN list")?;
    let mut protocols = Vec::new();
    while !list.is_empty() {
        let proto = take_u8_prefixed(&mut list, "ALPN protocol")?;
        protocols.push(String::from_utf8_lossy(proto).into_owned());
    }
    Ok(protocols)
}

fn parse_extensions<'a>(body: &mut &'a [u8]) -> Result<Vec<(u16, &'a [u8])>> {
    let mut extensions = Vec::new();
    if body.is_empty() {
        return Ok(extensions);
    }
    let mut data = take_u16_prefixed(body, "extensions")?;
    while !data.is_empty() {
        let ext_type = take(&mut data, 2, "extension type")?;
        let ext_data = take_u16_prefixed(&mut data, "extension")?;
        extensions.push((u16::from_be_bytes([ext_type[0], ext_type[1]]), ext_data));
    }
    Ok(extensions)
}

fn check_legacy_version(body: &mut &[u8]) -> Result<()> {
    let version = take(body, 2, "legacy version")?;
    if u16::from_be_bytes([version[0], version[1]]) != LEGACY_VERSION {
        return Err(Error::invalid("unexpected legacy version"));
    }
    Ok(())
}

fn take_random(body: &mut &[u8]) -> Result<[u8; RANDOM_SIZE]> {
    let mut random = [0u8; RANDOM_SIZE];
    random.copy_from_slice(take(body, RANDOM_SIZE, "random")?);
    Ok(random)
}

fn take<'a>(data: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if data.len() < n {
        return Err(Error::invalid(format!("{} truncated", what)));
    }
    let (head, rest) = data.split_at(n);
    *data = rest;
    Ok(head)
}

fn take_u8(data: &mut &[u8], what: &str) -> Result<u8> {
    Ok(take(data, 1, what)?[0])
}

fn take_u8_prefixed<'a>(data: &mut &'a [u8], what: &str) -> Result<&'a [u8]> {
    let len = take_u8(data, what)? as usize;
    take(data, len, what)
}

fn take_u16_prefixed<'a>(data: &mut &'a [u8], what: &str) -> Result<&'a [u8]> {
    let len = take(data, 2, what)?;
    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
    take(data, len, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EphemeralSecret;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key(seed: u64) -> PublicKey {
        PublicKey::from(&EphemeralSecret::generate(&mut StdRng::seed_from_u64(seed)))
    }

    #[test]
    fn test_client_hello_layout() {
        let hello = ClientHello {
            random: [0xaa; RANDOM_SIZE],
            cipher_suites: vec![0x1303, 0x1301],
            server_name: Some("www.example.com".into()),
            alpn: vec!["h2".into(), "http/1.1".into()],
            key_share: Some(key(1)),
        };
        let encoded = hello.encode();

        assert_eq!(encoded[0], HandshakeType::ClientHello as u8);
        assert_eq!(&encoded[4..6], &[0x03, 0x03]);
        assert_eq!(&encoded[6..38], &[0xaa; 32]);

        assert_eq!(ClientHello::parse(&encoded).unwrap(), hello);
    }

    #[test]
    fn test_client_hello_without_optional_extensions() {
        let hello = ClientHello {
            random: [1; RANDOM_SIZE],
            cipher_suites: vec![0x1302],
            server_name: None,
            alpn: Vec::new(),
            key_share: None,
        };
        let parsed = ClientHello::parse(&hello.encode()).unwrap();
        assert_eq!(parsed.server_name, None);
        assert!(parsed.key_share.is_none());
    }

    #[test]
    fn test_server_hello_format() {
        let hello = ServerHello {
            random: [0x55; RANDOM_SIZE],
            cipher_suite: 0x1303,
            alpn: Some("h2".into()),
            key_share: Some(key(2)),
        };
        let encoded = hello.encode();
        assert_eq!(encoded[0], HandshakeType::ServerHello as u8);

        let parsed = ServerHello::parse(&encoded).unwrap();
        assert_eq!(parsed.cipher_suite, 0x1303);
        assert_eq!(parsed.key_share, hello.key_share);
        assert_eq!(parsed.alpn.as_deref(), Some("h2"));
    }

    #[test]
    fn test_wrong_message_type() {
        let finished = encode_finished(&[0u8; HASH_SIZE]);
        assert!(matches!(ServerHello::parse(&finished), Err(Error::Handshake(_))));
        assert_eq!(parse_finished(&finished).unwrap(), &[0u8; HASH_SIZE]);
    }

    #[test]
    fn test_truncated_messages_rejected() {
        let encoded = ServerHello {
            random: [0; RANDOM_SIZE],
            cipher_suite: 0x1301,
            alpn: None,
            key_share: Some(key(3)),
        }
        .encode();

        for cut in [0, 3, 10, encoded.len() - 1] {
            assert!(ServerHello::parse(&encoded[..cut]).is_err(), "cut at {}", cut);
        }
    }
}

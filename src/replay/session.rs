//! Forkable sessions.
//!
//! A [`Session`] wraps a [`TlsEngine`] with recording proxies on its
//! transport and randomness source. Once the handshake completes the
//! captured bytes are frozen, and [`Session::snapshot`] pairs them with
//! the engine's current sequence counters. Handing that snapshot to
//! [`Session::new`] on the same connection replays the handshake against
//! the captured bytes (writes suppressed), then restores the counters, so
//! the new session picks up exactly where the old one left off.

use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::thread;

use bytes::Bytes;
use rand_core::{CryptoRng, OsRng, RngCore};
use tracing::{debug, info, warn};

use crate::config::ReplayConfig;
use crate::engine::{EngineConfig, RecordEngine, Role, SequenceState, TlsEngine};
use crate::error::{Error, Result};
use crate::replay::{ReplayRng, ReplayStream, Snapshot};
use crate::transport::Transport;

/// Lifecycle of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not yet run
    Fresh,
    /// Handshake complete (recorded or replayed)
    Established,
    /// Handshake failed; the session is unusable
    Failed,
    /// Closed by the caller
    Closed,
}

/// Session over the built-in engine.
pub type RecordSession<T, R = OsRng> =
    Session<T, RecordEngine<ReplayStream<T>, ReplayRng<R>>, R>;

/// A secure-channel session that can be forked from its own snapshot.
///
/// `T` is the transport, `E` the engine and `R` the randomness source.
pub struct Session<T, E, R = OsRng> {
    role: Role,
    engine: E,
    state: SessionState,
    transport_bytes: Bytes,
    random_bytes: Bytes,
    _marker: PhantomData<fn() -> (T, R)>,
}

/// A failed replay attempt, with the parts needed for the next one.
struct ReplayFailure<T, R> {
    error: Error,
    transport: T,
    entropy: R,
}

impl<T: Transport> RecordSession<T> {
    /// Create a client session with the built-in engine.
    ///
    /// Without a snapshot the session starts fresh and records its
    /// handshake once [`handshake`](Session::handshake) is called. With a
    /// snapshot the recorded handshake is replayed before this returns.
    pub fn client(transport: T, config: &EngineConfig, snapshot: Option<&Snapshot>) -> Result<Self> {
        Self::new(
            Role::Client,
            transport,
            config,
            OsRng,
            &ReplayConfig::default(),
            snapshot,
        )
    }

    /// Create a server session with the built-in engine.
    pub fn server(transport: T, config: &EngineConfig, snapshot: Option<&Snapshot>) -> Result<Self> {
        Self::new(
            Role::Server,
            transport,
            config,
            OsRng,
            &ReplayConfig::default(),
            snapshot,
        )
    }
}

impl<T, E, R> Session<T, E, R>
where
    T: Transport,
    R: RngCore + CryptoRng,
    E: TlsEngine<ReplayStream<T>, ReplayRng<R>>,
{
    /// Create a session.
    ///
    /// # Errors
    ///
    /// - [`Error::Incompatible`] if the engine cannot export (or, when
    ///   resuming, import) sequence state; the transport is left untouched.
    /// - The last attempt's error if every replay attempt fails.
    pub fn new(
        role: Role,
        transport: T,
        config: &E::Config,
        entropy: R,
        replay: &ReplayConfig,
        snapshot: Option<&Snapshot>,
    ) -> Result<Self> {
        E::capabilities().check(snapshot.is_some())?;

        match snapshot {
            None => {
                let engine = E::new(
                    role,
                    ReplayStream::recording(transport),
                    ReplayRng::recording(entropy),
                    config,
                );
                debug!(?role, "fresh session created");
                Ok(Self::with_engine(role, engine, SessionState::Fresh))
            }
            Some(snapshot) => {
                replay.validate()?;
                Self::resume(role, transport, config, entropy, replay, snapshot)
            }
        }
    }

    fn with_engine(role: Role, engine: E, state: SessionState) -> Self {
        Self {
            role,
            engine,
            state,
            transport_bytes: Bytes::new(),
            random_bytes: Bytes::new(),
            _marker: PhantomData,
        }
    }

    fn resume(
        role: Role,
        mut transport: T,
        config: &E::Config,
        mut entropy: R,
        replay: &ReplayConfig,
        snapshot: &Snapshot,
    ) -> Result<Self> {
        let mut attempt = 1;
        loop {
            match Self::replay_once(role, transport, config, entropy, snapshot) {
                Ok(session) => {
                    if attempt > 1 {
                        info!(?role, attempt, "handshake replay succeeded after retry");
                    } else {
                        debug!(?role, "handshake replayed");
                    }
                    return Ok(session);
                }
                Err(failure) => {
                    if !failure.error.is_replay_desync() {
                        warn!(?role, attempt, error = %failure.error, "handshake replay aborted");
                        return Err(failure.error);
                    }
                    if attempt >= replay.max_attempts {
                        warn!(?role, attempt, error = %failure.error, "handshake replay attempts exhausted");
                        return Err(failure.error);
                    }
                    warn!(
                        ?role,
                        attempt,
                        max_attempts = replay.max_attempts,
                        error = %failure.error,
                        "handshake replay failed, retrying"
                    );
                    if !replay.retry_backoff.is_zero() {
                        thread::sleep(replay.retry_backoff);
                    }
                    transport = failure.transport;
                    entropy = failure.entropy;
                    attempt += 1;
                }
            }
        }
    }

    /// One replay attempt over fresh proxies and a fresh engine.
    fn replay_once(
        role: Role,
        transport: T,
        config: &E::Config,
        entropy: R,
        snapshot: &Snapshot,
    ) -> std::result::Result<Self, ReplayFailure<T, R>> {
        let mut engine = E::new(
            role,
            ReplayStream::replaying(transport, snapshot.transport_bytes().clone()),
            ReplayRng::replaying(entropy, snapshot.random_bytes().clone()),
            config,
        );

        let result = Self::complete_replay(&mut engine, snapshot);

        match result {
            Ok(()) => {
                let mut session = Self::with_engine(role, engine, SessionState::Established);
                session.transport_bytes = snapshot.transport_bytes().clone();
                session.random_bytes = snapshot.random_bytes().clone();
                Ok(session)
            }
            Err(error) => {
                let (stream, rng) = engine.into_parts();
                Err(ReplayFailure {
                    error,
                    transport: stream.into_inner(),
                    entropy: rng.into_inner(),
                })
            }
        }
    }

    /// Replay the handshake on `engine`, then hand it the snapshot's
    /// counters.
    fn complete_replay(engine: &mut E, snapshot: &Snapshot) -> Result<()> {
        engine.handshake()?;

        let negotiated = engine.cipher_suite();
        if negotiated != Some(snapshot.cipher_suite()) {
            return Err(Error::CipherSuiteMismatch {
                expected: snapshot.cipher_suite(),
                actual: negotiated.unwrap_or(0),
            });
        }

        let suppressed = engine.stream_mut().suppressed();
        let unconsumed = engine.stream_mut().disarm();
        engine.entropy_mut().disarm();
        if !unconsumed.is_empty() {
            warn!(
                unconsumed = unconsumed.len(),
                "replayed handshake left recorded transport bytes unread"
            );
        }
        debug!(suppressed, "writes suppressed during replay");

        let sequence = snapshot.sequence();
        engine.set_sequence(sequence)?;
        debug!(
            inbound = sequence.inbound_counter(),
            outbound = sequence.outbound_counter(),
            "sequence counters restored"
        );
        Ok(())
    }

    /// Run the handshake, recording it.
    ///
    /// A no-op once established. If the handshake fails the captured bytes
    /// are discarded and the session becomes [`SessionState::Failed`].
    pub fn handshake(&mut self) -> Result<()> {
        match self.state {
            SessionState::Established => return Ok(()),
            SessionState::Failed => return Err(Error::Failed),
            SessionState::Closed => return Err(Error::Closed),
            SessionState::Fresh => {}
        }

        if let Err(e) = self.engine.handshake() {
            self.engine.stream_mut().disarm();
            self.engine.entropy_mut().disarm();
            self.transport_bytes = Bytes::new();
            self.random_bytes = Bytes::new();
            self.state = SessionState::Failed;
            warn!(role = ?self.role, error = %e, "handshake failed");
            return Err(e);
        }

        self.transport_bytes = self.engine.stream_mut().disarm();
        self.random_bytes = self.engine.entropy_mut().disarm();
        self.state = SessionState::Established;
        debug!(
            role = ?self.role,
            transport_bytes = self.transport_bytes.len(),
            random_bytes = self.random_bytes.len(),
            "handshake recorded"
        );
        Ok(())
    }

    /// Capture a snapshot of the established session.
    ///
    /// Counters are read at the time of the call, so a snapshot taken after
    /// exchanging data continues from that point.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.ensure_established()?;
        let sequence = self.engine.sequence()?;
        let cipher_suite = self
            .engine
            .cipher_suite()
            .ok_or(Error::NotReady("no cipher suite negotiated"))?;
        Ok(Snapshot::new(
            self.transport_bytes.clone(),
            self.random_bytes.clone(),
            sequence,
            cipher_suite,
        ))
    }

    /// Read application data.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_established()?;
        self.engine.read(buf)
    }

    /// Write application data.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_established()?;
        self.engine.write(buf)
    }

    /// Close the session and release the transport.
    ///
    /// An established session first sends close_notify (best effort). The
    /// transport is released exactly once; closing again is a no-op.
    ///
    /// Sessions forked from one another share a connection: closing any of
    /// them releases it for all.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        if self.state == SessionState::Established {
            if let Err(e) = self.engine.close_notify() {
                debug!(error = %e, "close_notify not sent");
            }
        }
        self.state = SessionState::Closed;
        self.engine.stream_mut().get_mut().close()?;
        debug!(role = ?self.role, "session closed");
        Ok(())
    }

    /// Current sequence counters.
    pub fn sequence(&self) -> Result<SequenceState> {
        self.ensure_established()?;
        self.engine.sequence()
    }

    /// Negotiated cipher suite.
    pub fn cipher_suite(&self) -> Option<u16> {
        self.engine.cipher_suite()
    }

    /// The session's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the handshake has completed.
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn ensure_established(&self) -> Result<()> {
        match self.state {
            SessionState::Established => Ok(()),
            SessionState::Fresh => Err(Error::NotReady("handshake not complete")),
            SessionState::Failed => Err(Error::Failed),
            SessionState::Closed => Err(Error::Closed),
        }
    }
}

impl<T, E, R> Read for Session<T, E, R>
where
    T: Transport,
    R: RngCore + CryptoRng,
    E: TlsEngine<ReplayStream<T>, ReplayRng<R>>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Session::read(self, buf).map_err(Into::into)
    }
}

impl<T, E, R> Write for Session<T, E, R>
where
    T: Transport,
    R: RngCore + CryptoRng,
    E: TlsEngine<ReplayStream<T>, ReplayRng<R>>,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Session::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

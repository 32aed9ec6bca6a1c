use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use protocol::{frame, CommandCode, PenState, Point, Request, Response, PROTOCOL_VERSION};

use crate::collaborators::{Bootstrapper, UnimplementedBootstrapper};
use crate::config::SessionConfig;
use crate::error::SessionError;

/// Anything the session can read/write bytes over. `SerialStream` implements
/// this; so does `tokio::io::DuplexStream`, which the test suite uses as a
/// serial-port double.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// One open session with the firmware listener (spec §3 "Lifecycle"). Only
/// one session per port; a `Session` is created on `open` and torn down on
/// `close`/drop.
pub struct Session<T: Transport> {
    io: T,
    config: SessionConfig,
    bootstrapper: Arc<dyn Bootstrapper>,
}

impl Session<SerialStream> {
    /// Opens the port, synchronizes, and performs the handshake (spec
    /// §4.1). The handshake uses [`UnimplementedBootstrapper`] when the
    /// listener reports a stale version; see [`Session::open_with`] to
    /// supply a real one.
    pub async fn open(config: SessionConfig) -> Result<Self, SessionError> {
        Self::open_with(config, Arc::new(UnimplementedBootstrapper)).await
    }

    /// Like [`Session::open`] but with an explicit [`Bootstrapper`].
    pub async fn open_with(
        config: SessionConfig,
        bootstrapper: Arc<dyn Bootstrapper>,
    ) -> Result<Self, SessionError> {
        info!(
            port = %config.port_name,
            baud = config.baud_rate,
            model = %config.model,
            "opening egg-printer session"
        );

        let port = tokio_serial::new(&config.port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .open_native_async()
            .map_err(|e| SessionError::Io(e.into()))?;

        let mut session = Session {
            io: port,
            config,
            bootstrapper,
        };
        session.connect().await?;
        Ok(session)
    }
}

impl<T: Transport> Session<T> {
    /// Wraps an already-open transport without performing sync/handshake.
    /// Used by tests to drive an in-memory duplex pair as a serial-port
    /// double (spec §9: "a host-side simulator should abstract 'wait for N
    /// bytes with timeout' behind a single adapter").
    pub fn from_transport(io: T, config: SessionConfig, bootstrapper: Arc<dyn Bootstrapper>) -> Self {
        Session {
            io,
            config,
            bootstrapper,
        }
    }

    /// Runs synchronization then handshake, as `open` does after acquiring
    /// the port.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.synchronize().await?;
        self.handshake().await?;
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn port_name(&self) -> &str {
        &self.config.port_name
    }

    /// Releases the port. The session is consumed; there is nothing further
    /// to flush since every `send` already waited out its response.
    pub fn close(self) {
        info!(port = %self.config.port_name, "closing egg-printer session");
    }

    /// Synchronization protocol (spec §4.1): write the sync preamble, expect
    /// `SYNC_ACK` back within the read timeout.
    pub async fn synchronize(&mut self) -> Result<(), SessionError> {
        self.write_bytes(&frame::SYNC).await?;

        let mut ack = [0u8; 4];
        for slot in ack.iter_mut() {
            *slot = self.read_byte("sync acknowledgement").await?;
        }
        if ack != frame::SYNC_ACK {
            warn!(?ack, "bad sync acknowledgement");
            return Err(SessionError::Protocol(
                "bad sync acknowledgement".to_string(),
            ));
        }
        debug!("sync acquired");
        Ok(())
    }

    /// Handshake protocol (spec §4.1): send `Handshake`, compare reported
    /// version against [`PROTOCOL_VERSION`]. A stale listener triggers
    /// exactly one bootstrap + retry cycle (spec "Retry policy").
    pub async fn handshake(&mut self) -> Result<(), SessionError> {
        let (major, minor) = self.handshake_once().await?;
        let listener_version = version_ordinal(major, minor);
        let host_version = version_ordinal(PROTOCOL_VERSION.0, PROTOCOL_VERSION.1);

        if listener_version >= host_version {
            info!(major, minor, "handshake complete");
            return Ok(());
        }

        warn!(
            major,
            minor, "listener version is stale, invoking bootstrapper"
        );
        self.bootstrapper
            .upload_hex(&self.config.model, &self.config.port_name, &[])
            .await?;
        tokio::time::sleep(self.config.bootstrap_grace_period).await;

        self.synchronize().await?;
        let (major, minor) = self.handshake_once().await?;
        if version_ordinal(major, minor) >= host_version {
            info!(major, minor, "handshake complete after bootstrap retry");
            Ok(())
        } else {
            Err(SessionError::Protocol(
                "listener firmware still stale after the single bootstrap retry".to_string(),
            ))
        }
    }

    async fn handshake_once(&mut self) -> Result<(u8, u8), SessionError> {
        match self.send(Request::Handshake).await? {
            Response::Handshake { major, minor } => Ok((major, minor)),
            other => Err(SessionError::Protocol(format!(
                "expected handshake response, got {other:?}"
            ))),
        }
    }

    pub async fn begin(&mut self) -> Result<(), SessionError> {
        match self.send(Request::Begin).await? {
            Response::Begin => Ok(()),
            other => Err(unexpected_response("Begin", other)),
        }
    }

    pub async fn end(&mut self) -> Result<(), SessionError> {
        match self.send(Request::End).await? {
            Response::End => Ok(()),
            other => Err(unexpected_response("End", other)),
        }
    }

    pub async fn pen(&mut self, state: PenState) -> Result<PenState, SessionError> {
        match self.send(Request::Pen(state)).await? {
            Response::Pen(state) => Ok(state),
            other => Err(unexpected_response("Pen", other)),
        }
    }

    pub async fn move_to(&mut self, points: &[Point]) -> Result<u8, SessionError> {
        match self.send(Request::Move(points)).await? {
            Response::Move { count } => Ok(count),
            other => Err(unexpected_response("Move", other)),
        }
    }

    pub async fn dot(&mut self, point: Point) -> Result<(), SessionError> {
        match self.send(Request::Dot(point)).await? {
            Response::Dot => Ok(()),
            other => Err(unexpected_response("Dot", other)),
        }
    }

    pub async fn line(&mut self, from: Point, to: Point) -> Result<(), SessionError> {
        match self.send(Request::Line { from, to }).await? {
            Response::Line => Ok(()),
            other => Err(unexpected_response("Line", other)),
        }
    }

    /// Sends any typed request and awaits its matched typed response (spec
    /// §4.1/§4.2). At most one request is outstanding: callers hold `&mut
    /// self` for the duration, which serializes access to the port.
    pub async fn send(&mut self, request: Request<'_>) -> Result<Response, SessionError> {
        let started = Instant::now();
        let code = request.code();
        let payload_len = request.payload_len();
        if payload_len > u8::MAX as usize {
            return Err(SessionError::Protocol(
                "request payload exceeds 255 bytes".to_string(),
            ));
        }

        let mut header = [0u8; 7];
        frame::encode_sync_and_header(code.req_byte(), payload_len as u8, &mut header);
        self.write_bytes(&header).await?;

        let expected_echo = frame::expected_header_echo(code.req_byte(), payload_len as u8);
        let mut echo = [0u8; 3];
        for slot in echo.iter_mut() {
            *slot = self.read_byte_watching_error("header echo").await?;
        }
        if echo != expected_echo {
            return Err(SessionError::Protocol(format!(
                "header echo mismatch: expected {expected_echo:?}, got {echo:?}"
            )));
        }

        let mut payload = [0u8; u8::MAX as usize];
        let n = request.write_payload(&mut payload[..payload_len])?;

        let mut body = [0u8; 2 + u8::MAX as usize + 2];
        let body_len = frame::encode_body(code.req_byte(), &payload[..n], &mut body)?;
        self.write_bytes(&body[..body_len]).await?;
        self.write_bytes(&[frame::ALL_WRITTEN]).await?;

        let response = self.read_response(code).await?;
        debug!(
            command = ?code,
            elapsed_ms = started.elapsed().as_millis(),
            "command exchange complete"
        );
        Ok(response)
    }

    /// Decodes a response frame (spec §4.2 decode step), watching for the
    /// `EF EF EF` error marker in place of `SOR_RSP`.
    async fn read_response(&mut self, expected: CommandCode) -> Result<Response, SessionError> {
        let marker = self.read_byte_watching_error("response marker").await?;
        if marker != frame::SOR_RSP {
            return Err(SessionError::Protocol(format!(
                "expected start-of-response marker, got {marker:#04x}"
            )));
        }

        let len = self.read_byte("response length").await? as usize;
        if len == 0 {
            return Err(SessionError::Protocol(
                "response frame carries no ACK byte".to_string(),
            ));
        }

        let mut body = vec![0u8; len];
        self.read_exact(&mut body, "response body").await?;
        let ack = body[0];
        let payload = &body[1..];

        if ack != expected.ack_byte() {
            return Err(SessionError::Protocol(format!(
                "ACK code mismatch: expected {:#04x}, got {ack:#04x}",
                expected.ack_byte()
            )));
        }

        Response::decode(expected, ack, payload).map_err(SessionError::from)
    }

    async fn write_bytes(&mut self, buf: &[u8]) -> Result<(), SessionError> {
        timeout(self.config.write_timeout, self.io.write_all(buf))
            .await
            .map_err(|_| SessionError::Timeout { phase: "write" })??;
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8], phase: &'static str) -> Result<(), SessionError> {
        timeout(self.config.read_timeout, self.io.read_exact(buf))
            .await
            .map_err(|_| SessionError::Timeout { phase })??;
        Ok(())
    }

    async fn read_byte(&mut self, phase: &'static str) -> Result<u8, SessionError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b, phase).await?;
        Ok(b[0])
    }

    /// Reads a byte, watching for the firmware's 3-byte `EF EF EF` error
    /// marker appearing in place of the expected byte (spec §3 "error
    /// response"): if the byte is `ERR`, the next two bytes are consumed and
    /// checked; three in a row surfaces [`SessionError::Endpoint`].
    async fn read_byte_watching_error(&mut self, phase: &'static str) -> Result<u8, SessionError> {
        let b = self.read_byte(phase).await?;
        if b != frame::ERR {
            return Ok(b);
        }
        let b2 = self.read_byte(phase).await?;
        let b3 = self.read_byte(phase).await?;
        if b2 == frame::ERR && b3 == frame::ERR {
            return Err(SessionError::Endpoint);
        }
        Err(SessionError::Protocol(format!(
            "unexpected byte sequence while waiting for {phase}: {:#04x} {:#04x} {:#04x}",
            b, b2, b3
        )))
    }
}

fn version_ordinal(major: u8, minor: u8) -> u16 {
    major as u16 * 10 + minor as u16
}

fn unexpected_response(expected: &'static str, got: Response) -> SessionError {
    SessionError::Protocol(format!("expected {expected} response, got {got:?}"))
}

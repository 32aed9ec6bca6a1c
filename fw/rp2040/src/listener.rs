//! The firmware listener loop (spec §4.3): one iteration per command
//! exchange, cycling SYNC → SYNC_ACK → HEADER → HEADER_ECHO → PAYLOAD →
//! TRAILER → VERIFY → DISPATCH. Generic over [`FrameIo`] so the same phase
//! logic runs against the real USB-CDC transport ([`crate::usb_io`]) or an
//! in-memory double in tests.

use embedded_hal_async::delay::DelayNs;
use protocol::{frame, move_points, CommandCode, ParsedRequest, PenState, Response, PROTOCOL_VERSION};

use crate::motion::MotionState;
use crate::pins::{self, Servo, StepperPins};

/// Timeout for the HEADER phase (spec §4.3 table: `SYNC_TIMEOUT`).
const HEADER_TIMEOUT_MS: u64 = 500;
/// Timeout for PAYLOAD and TRAILER (spec §4.3 table:
/// `READ_REQUESTPAYLOAD_TIMEOUT`).
const PAYLOAD_TIMEOUT_MS: u64 = 2000;

/// Whether a timed read completed or the deadline passed first.
pub enum ReadOutcome {
    Ready,
    TimedOut,
}

/// How a listener iteration concluded, for callers that want to reflect it
/// (e.g. the status LED) without re-deriving it from side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// A command was read, verified, and dispatched; the response was sent.
    Completed,
    /// A framing, timeout, echo, or checksum problem caused `EF EF EF` to be
    /// written; the loop is back at SYNC.
    ErrorReported,
}

/// Byte-level transport the listener drives. Implementors own whatever
/// buffering is needed to satisfy `read_exact_timeout` out of a
/// packet-oriented medium (spec §9: "abstract 'wait for N bytes with
/// timeout' behind a single adapter").
pub trait FrameIo {
    type Error;

    /// Reads one byte with no deadline (spec SYNC phase: "blocking (no
    /// timeout)").
    async fn read_byte_blocking(&mut self) -> Result<u8, Self::Error>;

    /// Reads exactly `buf.len()` bytes, or reports a timeout if `timeout_ms`
    /// elapses first.
    async fn read_exact_timeout(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<ReadOutcome, Self::Error>;

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error>;
}

/// Maximum body the PAYLOAD phase ever reads: `C L payload... F0 F1` with a
/// full 255-byte payload (spec §4.2: the length byte is a single byte).
const MAX_BODY_LEN: usize = 2 + u8::MAX as usize + 2;

/// Runs one full listener iteration against `io`, driving `motion`/`pins`/
/// `servo`/`delay` for any command that reaches DISPATCH. Returns `Err` only
/// for a transport-level failure (e.g. the USB endpoint going away);
/// protocol-level problems (bad sync, timeout, checksum mismatch, unknown
/// command) are handled in place — an `EF EF EF` marker is written and the
/// function returns `Ok(IterationOutcome::ErrorReported)`, per spec §4.3's
/// "return to SYNC".
pub async fn run_iteration<IO, P, S, D>(
    io: &mut IO,
    motion: &mut MotionState,
    pins: &mut P,
    servo: &mut S,
    delay: &mut D,
) -> Result<IterationOutcome, IO::Error>
where
    IO: FrameIo,
    P: StepperPins,
    S: Servo,
    D: DelayNs,
{
    wait_for_sync(io).await?;
    io.write_all(&frame::SYNC_ACK).await?;

    let mut header = [0u8; 3];
    match io.read_exact_timeout(&mut header, HEADER_TIMEOUT_MS).await? {
        ReadOutcome::TimedOut => return emit_error(io).await,
        ReadOutcome::Ready => {}
    }
    let (sor, code_byte, len) = (header[0], header[1], header[2]);
    if sor != frame::SOR_REQ {
        return emit_error(io).await;
    }

    let echo = frame::expected_header_echo(code_byte, len);
    io.write_all(&echo).await?;

    let body_len = 2 + len as usize + 2;
    let mut body = [0u8; MAX_BODY_LEN];
    match io
        .read_exact_timeout(&mut body[..body_len], PAYLOAD_TIMEOUT_MS)
        .await?
    {
        ReadOutcome::TimedOut => return emit_error(io).await,
        ReadOutcome::Ready => {}
    }

    let mut all_written = [0u8; 1];
    match io
        .read_exact_timeout(&mut all_written, PAYLOAD_TIMEOUT_MS)
        .await?
    {
        ReadOutcome::TimedOut => return emit_error(io).await,
        ReadOutcome::Ready => {}
    }
    if all_written[0] != frame::ALL_WRITTEN {
        return emit_error(io).await;
    }

    let region_len = 2 + len as usize;
    if !frame::verify_payload_echo(code_byte, len, &body[..region_len]) {
        return emit_error(io).await;
    }
    let trailer = [body[region_len], body[region_len + 1]];
    if !frame::verify_checksum(&body[..region_len], trailer) {
        return emit_error(io).await;
    }

    let Some(code) = CommandCode::from_req_byte(code_byte) else {
        return emit_error(io).await;
    };
    let payload = &body[2..region_len];

    dispatch(io, code, payload, motion, pins, servo, delay).await
}

/// Reads bytes one at a time into a rolling 4-byte window until it equals
/// [`frame::SYNC`]. A stray/mismatched byte is not an error (spec §4.3: SYNC
/// "silently restarts"); only a transport-level failure aborts this.
async fn wait_for_sync<IO: FrameIo>(io: &mut IO) -> Result<(), IO::Error> {
    let mut window = [0u8; 4];
    loop {
        let b = io.read_byte_blocking().await?;
        window[0] = window[1];
        window[1] = window[2];
        window[2] = window[3];
        window[3] = b;
        if window == frame::SYNC {
            return Ok(());
        }
    }
}

async fn emit_error<IO: FrameIo>(io: &mut IO) -> Result<IterationOutcome, IO::Error> {
    io.write_all(&frame::ERROR_MARKER).await?;
    Ok(IterationOutcome::ErrorReported)
}

async fn dispatch<IO, P, S, D>(
    io: &mut IO,
    code: CommandCode,
    payload: &[u8],
    motion: &mut MotionState,
    pins: &mut P,
    servo: &mut S,
    delay: &mut D,
) -> Result<IterationOutcome, IO::Error>
where
    IO: FrameIo,
    P: StepperPins,
    S: Servo,
    D: DelayNs,
{
    // Payload length is re-validated here (distinct from the checksum/echo
    // VERIFY phase): a malformed length for an otherwise-known command is
    // not itself a wire-framing error, but dispatch must never index past a
    // short payload.
    let Ok(request) = ParsedRequest::decode(code, payload) else {
        return emit_error(io).await;
    };

    match request {
        ParsedRequest::Handshake => {
            respond(
                io,
                Response::Handshake {
                    major: PROTOCOL_VERSION.0,
                    minor: PROTOCOL_VERSION.1,
                },
            )
            .await
        }
        ParsedRequest::Begin => {
            pins::enable_steppers(pins);
            respond(io, Response::Begin).await
        }
        ParsedRequest::End => {
            motion.set_pen(servo, delay, false).await;
            motion.move_to(pins, delay, 0, 0).await;
            pins::disable_steppers(pins);
            respond(io, Response::End).await
        }
        ParsedRequest::Pen(state) => {
            motion.set_pen(servo, delay, state == PenState::Down).await;
            respond(
                io,
                Response::Pen(if motion.pen_down() {
                    PenState::Down
                } else {
                    PenState::Up
                }),
            )
            .await
        }
        ParsedRequest::Move(raw) => {
            let mut count: u8 = 0;
            for point in move_points(raw) {
                motion
                    .move_to(pins, delay, point.x as i32, point.y as i32)
                    .await;
                count = count.wrapping_add(1);
            }
            respond(io, Response::Move { count }).await
        }
        ParsedRequest::Dot(point) => {
            motion.set_pen(servo, delay, false).await;
            motion.move_to(pins, delay, point.x as i32, point.y as i32).await;
            motion.set_pen(servo, delay, true).await;
            respond(io, Response::Dot).await
        }
        ParsedRequest::Line { from, to } => {
            motion.set_pen(servo, delay, false).await;
            motion.move_to(pins, delay, from.x as i32, from.y as i32).await;
            motion.set_pen(servo, delay, true).await;
            motion.move_to(pins, delay, to.x as i32, to.y as i32).await;
            respond(io, Response::Line).await
        }
    }
    .map(|()| IterationOutcome::Completed)
}

async fn respond<IO: FrameIo>(io: &mut IO, response: Response) -> Result<(), IO::Error> {
    let mut payload = [0u8; 2];
    let n = response
        .write_payload(&mut payload)
        .unwrap_or_else(|_| unreachable!("response payloads are at most 2 bytes"));
    let mut frame = [0u8; 2 + 1 + 2];
    let len = frame::encode_response_frame(response.ack_code(), &payload[..n], &mut frame)
        .unwrap_or_else(|_| unreachable!("response frames are at most 5 bytes"));
    io.write_all(&frame[..len]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::fake::{FakePins, FakeServo};
    use std::collections::VecDeque;
    use std::vec::Vec as StdVec;

    struct FakeDelay;
    impl DelayNs for FakeDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    /// An in-memory double feeding pre-scripted input bytes and capturing
    /// everything written, standing in for the USB CDC transport.
    struct MemIo {
        input: VecDeque<u8>,
        output: StdVec<u8>,
        starve_after: Option<usize>,
    }

    impl MemIo {
        fn new(input: &[u8]) -> Self {
            MemIo {
                input: input.iter().copied().collect(),
                output: StdVec::new(),
                starve_after: None,
            }
        }
    }

    impl FrameIo for MemIo {
        type Error = ();

        async fn read_byte_blocking(&mut self) -> Result<u8, Self::Error> {
            self.input.pop_front().ok_or(())
        }

        async fn read_exact_timeout(
            &mut self,
            buf: &mut [u8],
            _timeout_ms: u64,
        ) -> Result<ReadOutcome, Self::Error> {
            if let Some(n) = self.starve_after {
                if self.input.len() < n {
                    return Ok(ReadOutcome::TimedOut);
                }
            }
            if self.input.len() < buf.len() {
                return Ok(ReadOutcome::TimedOut);
            }
            for slot in buf.iter_mut() {
                *slot = self.input.pop_front().unwrap();
            }
            Ok(ReadOutcome::Ready)
        }

        async fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
            self.output.extend_from_slice(buf);
            Ok(())
        }
    }

    fn build_request(code: u8, payload: &[u8]) -> StdVec<u8> {
        let mut out = vec![0u8; frame::request_frame_len(payload.len())];
        frame::encode_request_frame(code, payload, &mut out).unwrap();
        out
    }

    #[test]
    fn handshake_round_trip() {
        embassy_futures::block_on(async {
            let req = build_request(CommandCode::Handshake.req_byte(), &[]);
            let mut io = MemIo::new(&req);
            let mut motion = MotionState::new();
            let mut pins = FakePins::new();
            let mut servo = FakeServo::default();
            let mut delay = FakeDelay;

            let outcome = run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay)
                .await
                .unwrap();

            assert_eq!(outcome, IterationOutcome::Completed);
            assert_eq!(&io.output[0..4], &frame::SYNC_ACK);
            assert_eq!(
                &io.output[4..],
                &[
                    frame::SOR_RSP,
                    0x03,
                    CommandCode::Handshake.ack_byte(),
                    PROTOCOL_VERSION.0,
                    PROTOCOL_VERSION.1
                ]
            );
        });
    }

    #[test]
    fn pen_command_drives_servo_and_acks_state() {
        embassy_futures::block_on(async {
            let req = build_request(CommandCode::Pen.req_byte(), &[1]);
            let mut io = MemIo::new(&req);
            let mut motion = MotionState::new();
            let mut pins = FakePins::new();
            let mut servo = FakeServo::default();
            let mut delay = FakeDelay;

            let outcome = run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay)
                .await
                .unwrap();

            assert_eq!(outcome, IterationOutcome::Completed);
            assert!(motion.pen_down());
            assert_eq!(servo.angles, vec![140]);
            let tail = &io.output[4..];
            assert_eq!(tail, &[frame::SOR_RSP, 0x02, CommandCode::Pen.ack_byte(), 0x01]);
        });
    }

    #[test]
    fn bad_checksum_emits_error_marker() {
        embassy_futures::block_on(async {
            let mut req = build_request(CommandCode::Pen.req_byte(), &[1]);
            // Flip the last checksum byte (just before the ALL_WRITTEN marker).
            let last_checksum = req.len() - 2;
            req[last_checksum] ^= 0xFF;
            let mut io = MemIo::new(&req);
            let mut motion = MotionState::new();
            let mut pins = FakePins::new();
            let mut servo = FakeServo::default();
            let mut delay = FakeDelay;

            let outcome = run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay)
                .await
                .unwrap();

            assert_eq!(outcome, IterationOutcome::ErrorReported);
            assert_eq!(&io.output[4..], &frame::ERROR_MARKER);
        });
    }

    #[test]
    fn unknown_command_byte_emits_error_marker() {
        embassy_futures::block_on(async {
            let req = build_request(0x7F, &[]);
            let mut io = MemIo::new(&req);
            let mut motion = MotionState::new();
            let mut pins = FakePins::new();
            let mut servo = FakeServo::default();
            let mut delay = FakeDelay;

            let outcome = run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay)
                .await
                .unwrap();

            assert_eq!(outcome, IterationOutcome::ErrorReported);
            assert_eq!(&io.output[4..], &frame::ERROR_MARKER);
        });
    }

    #[test]
    fn move_with_two_points_walks_and_reports_count() {
        embassy_futures::block_on(async {
            let payload = [0xFFu8, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
            let req = build_request(CommandCode::Move.req_byte(), &payload);
            let mut io = MemIo::new(&req);
            let mut motion = MotionState::new();
            let mut pins = FakePins::new();
            let mut servo = FakeServo::default();
            let mut delay = FakeDelay;

            run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay)
                .await
                .unwrap();

            let tail = &io.output[4..];
            assert_eq!(
                tail,
                &[frame::SOR_RSP, 0x02, CommandCode::Move.ack_byte(), 0x02]
            );
        });
    }

    #[test]
    fn sync_loss_never_emits_an_error_marker() {
        embassy_futures::block_on(async {
            // Only two of the four sync bytes arrive: the read starves.
            let mut io = MemIo::new(&frame::SYNC[0..2]);
            let mut motion = MotionState::new();
            let mut pins = FakePins::new();
            let mut servo = FakeServo::default();
            let mut delay = FakeDelay;

            let result =
                run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay).await;
            assert!(result.is_err()); // the transport double runs dry, not a protocol error
            assert!(io.output.is_empty());
        });
    }
}

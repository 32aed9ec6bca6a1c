//! Typed command/response vocabulary: the closed set of commands from the
//! wire spec's command table, and their payload encodings.

use crate::frame::FrameError;

/// A signed plotter coordinate, big-endian on the wire as two i16 halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const fn new(x: i16, y: i16) -> Self {
        Point { x, y }
    }

    /// Encodes as 4 big-endian bytes: `x_hi x_lo y_hi y_lo`.
    pub fn to_be_bytes(self) -> [u8; 4] {
        let x = self.x.to_be_bytes();
        let y = self.y.to_be_bytes();
        [x[0], x[1], y[0], y[1]]
    }

    pub fn from_be_bytes(b: [u8; 4]) -> Self {
        Point {
            x: i16::from_be_bytes([b[0], b[1]]),
            y: i16::from_be_bytes([b[2], b[3]]),
        }
    }
}

/// Pen position. Any nonzero byte on the wire decodes as `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenState {
    Up = 0,
    Down = 1,
}

impl PenState {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Any nonzero byte is `Down` — this is firmware behavior, not a strict
    /// 0/1 enum decode.
    pub fn from_byte(b: u8) -> Self {
        if b != 0 {
            PenState::Down
        } else {
            PenState::Up
        }
    }
}

/// The closed set of request command bytes. Each has an ACK code exactly
/// one greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    Handshake = 0x01,
    Begin = 0x03,
    End = 0x05,
    Pen = 0x07,
    Move = 0x09,
    Dot = 0x0b,
    Line = 0x0d,
}

impl CommandCode {
    pub const fn req_byte(self) -> u8 {
        self as u8
    }

    pub const fn ack_byte(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_req_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(CommandCode::Handshake),
            0x03 => Some(CommandCode::Begin),
            0x05 => Some(CommandCode::End),
            0x07 => Some(CommandCode::Pen),
            0x09 => Some(CommandCode::Move),
            0x0b => Some(CommandCode::Dot),
            0x0d => Some(CommandCode::Line),
            _ => None,
        }
    }
}

/// A typed outgoing request. `Move` borrows its points rather than owning
/// them so encoding never needs an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Handshake,
    Begin,
    End,
    Pen(PenState),
    Move(&'a [Point]),
    Dot(Point),
    Line { from: Point, to: Point },
}

impl<'a> Request<'a> {
    pub fn code(&self) -> CommandCode {
        match self {
            Request::Handshake => CommandCode::Handshake,
            Request::Begin => CommandCode::Begin,
            Request::End => CommandCode::End,
            Request::Pen(_) => CommandCode::Pen,
            Request::Move(_) => CommandCode::Move,
            Request::Dot(_) => CommandCode::Dot,
            Request::Line { .. } => CommandCode::Line,
        }
    }

    /// Size of the payload this request encodes to.
    pub fn payload_len(&self) -> usize {
        match self {
            Request::Handshake | Request::Begin | Request::End => 0,
            Request::Pen(_) => 1,
            Request::Move(points) => points.len() * 4,
            Request::Dot(_) => 4,
            Request::Line { .. } => 8,
        }
    }

    /// Writes this request's payload bytes into `out`, returning the
    /// number of bytes written. `out` must be at least [`Self::payload_len`].
    pub fn write_payload(&self, out: &mut [u8]) -> Result<usize, FrameError> {
        let len = self.payload_len();
        if out.len() < len {
            return Err(FrameError::BufferTooSmall);
        }
        match self {
            Request::Handshake | Request::Begin | Request::End => {}
            Request::Pen(state) => out[0] = state.to_byte(),
            Request::Move(points) => {
                for (i, p) in points.iter().enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&p.to_be_bytes());
                }
            }
            Request::Dot(point) => out[0..4].copy_from_slice(&point.to_be_bytes()),
            Request::Line { from, to } => {
                out[0..4].copy_from_slice(&from.to_be_bytes());
                out[4..8].copy_from_slice(&to.to_be_bytes());
            }
        }
        Ok(len)
    }
}

/// A request decoded from raw `(code, payload)` bytes, as the firmware
/// listener sees it. `Move` is represented as the raw payload plus an
/// accessor that iterates points without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedRequest<'a> {
    Handshake,
    Begin,
    End,
    Pen(PenState),
    Move(&'a [u8]),
    Dot(Point),
    Line { from: Point, to: Point },
}

impl<'a> ParsedRequest<'a> {
    /// Decodes a command from its code byte and payload. Fails only on a
    /// payload length mismatch for the given command (an unknown command
    /// byte is the caller's concern — see spec §4.3 dispatch's "any other
    /// command" case, which is not represented here at all).
    pub fn decode(code: CommandCode, payload: &'a [u8]) -> Result<Self, FrameError> {
        match code {
            CommandCode::Handshake => Ok(ParsedRequest::Handshake),
            CommandCode::Begin => Ok(ParsedRequest::Begin),
            CommandCode::End => Ok(ParsedRequest::End),
            CommandCode::Pen => {
                let &[b] = payload else {
                    return Err(FrameError::Truncated);
                };
                Ok(ParsedRequest::Pen(PenState::from_byte(b)))
            }
            CommandCode::Move => {
                if payload.len() % 4 != 0 {
                    return Err(FrameError::Truncated);
                }
                Ok(ParsedRequest::Move(payload))
            }
            CommandCode::Dot => {
                let bytes: [u8; 4] = payload.try_into().map_err(|_| FrameError::Truncated)?;
                Ok(ParsedRequest::Dot(Point::from_be_bytes(bytes)))
            }
            CommandCode::Line => {
                if payload.len() != 8 {
                    return Err(FrameError::Truncated);
                }
                let from = Point::from_be_bytes(payload[0..4].try_into().unwrap());
                let to = Point::from_be_bytes(payload[4..8].try_into().unwrap());
                Ok(ParsedRequest::Line { from, to })
            }
        }
    }
}

/// Iterates the points encoded in a `Move` payload, 4 bytes at a time.
pub fn move_points(payload: &[u8]) -> impl Iterator<Item = Point> + '_ {
    payload
        .chunks_exact(4)
        .map(|c| Point::from_be_bytes(c.try_into().unwrap()))
}

/// A typed response, as decoded by the host or encoded by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Handshake { major: u8, minor: u8 },
    Begin,
    End,
    Pen(PenState),
    Move { count: u8 },
    Dot,
    Line,
}

impl Response {
    pub fn ack_code(&self) -> u8 {
        match self {
            Response::Handshake { .. } => CommandCode::Handshake.ack_byte(),
            Response::Begin => CommandCode::Begin.ack_byte(),
            Response::End => CommandCode::End.ack_byte(),
            Response::Pen(_) => CommandCode::Pen.ack_byte(),
            Response::Move { .. } => CommandCode::Move.ack_byte(),
            Response::Dot => CommandCode::Dot.ack_byte(),
            Response::Line => CommandCode::Line.ack_byte(),
        }
    }

    pub fn payload_len(&self) -> usize {
        match self {
            Response::Handshake { .. } => 2,
            Response::Begin | Response::End | Response::Dot | Response::Line => 0,
            Response::Pen(_) => 1,
            Response::Move { .. } => 1,
        }
    }

    pub fn write_payload(&self, out: &mut [u8]) -> Result<usize, FrameError> {
        let len = self.payload_len();
        if out.len() < len {
            return Err(FrameError::BufferTooSmall);
        }
        match self {
            Response::Handshake { major, minor } => {
                out[0] = *major;
                out[1] = *minor;
            }
            Response::Begin | Response::End | Response::Dot | Response::Line => {}
            Response::Pen(state) => out[0] = state.to_byte(),
            Response::Move { count } => out[0] = *count,
        }
        Ok(len)
    }

    /// Decodes a response given the request command that was sent. The
    /// caller must compare `expected.ack_byte()` against `ack` itself —
    /// that mismatch is a [`crate::frame::FrameError`]-independent concern
    /// the host session surfaces as a `ProtocolError`.
    pub fn decode(expected: CommandCode, ack: u8, payload: &[u8]) -> Result<Response, FrameError> {
        if ack != expected.ack_byte() {
            return Err(FrameError::BadStartOfResponse);
        }
        match expected {
            CommandCode::Handshake => {
                let &[major, minor] = payload else {
                    return Err(FrameError::Truncated);
                };
                Ok(Response::Handshake { major, minor })
            }
            CommandCode::Begin => Ok(Response::Begin),
            CommandCode::End => Ok(Response::End),
            CommandCode::Pen => {
                let &[b] = payload else {
                    return Err(FrameError::Truncated);
                };
                Ok(Response::Pen(PenState::from_byte(b)))
            }
            CommandCode::Move => {
                let &[count] = payload else {
                    return Err(FrameError::Truncated);
                };
                Ok(Response::Move { count })
            }
            CommandCode::Dot => Ok(Response::Dot),
            CommandCode::Line => Ok(Response::Line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_is_always_req_plus_one() {
        for code in [
            CommandCode::Handshake,
            CommandCode::Begin,
            CommandCode::End,
            CommandCode::Pen,
            CommandCode::Move,
            CommandCode::Dot,
            CommandCode::Line,
        ] {
            assert_eq!(code.ack_byte(), code.req_byte() + 1);
        }
    }

    #[test]
    fn point_be_round_trip() {
        let p = Point::new(-1, 12345);
        assert_eq!(Point::from_be_bytes(p.to_be_bytes()), p);
    }

    #[test]
    fn pen_state_any_nonzero_is_down() {
        assert_eq!(PenState::from_byte(0), PenState::Up);
        assert_eq!(PenState::from_byte(1), PenState::Down);
        assert_eq!(PenState::from_byte(0xFF), PenState::Down);
    }

    #[test]
    fn move_request_payload_matches_points() {
        let points = [Point::new(-1, 0), Point::new(0, 0)];
        let req = Request::Move(&points);
        assert_eq!(req.payload_len(), 8);
        let mut buf = [0u8; 8];
        req.write_payload(&mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let decoded: std::vec::Vec<Point> = move_points(&buf).collect();
        assert_eq!(decoded, points.to_vec());
    }

    #[test]
    fn parsed_request_decodes_line() {
        let payload = [0u8, 100, 0, 50, 0, 0, 0, 0];
        let parsed = ParsedRequest::decode(CommandCode::Line, &payload).unwrap();
        assert_eq!(
            parsed,
            ParsedRequest::Line {
                from: Point::new(100, 50),
                to: Point::new(0, 0),
            }
        );
    }

    #[test]
    fn response_decode_rejects_wrong_ack() {
        let err = Response::decode(CommandCode::Pen, 0x04, &[1]).unwrap_err();
        assert_eq!(err, FrameError::BadStartOfResponse);
    }
}

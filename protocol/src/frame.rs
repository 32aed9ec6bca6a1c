//! Frame codec: sync markers, Fletcher-16 (mod 255) checksum, and the
//! request/response byte layouts from the wire spec. Independent of any
//! particular transport — callers hand it byte slices.

/// 4-byte preamble the host writes at the start of every request.
pub const SYNC: [u8; 4] = [0xFE, 0xED, 0xBA, 0xBE];
/// 4-byte reply the firmware writes immediately after observing [`SYNC`].
pub const SYNC_ACK: [u8; 4] = [0xCA, 0xFE, 0xF0, 0x0D];
/// Start-of-request marker, written by the host right after [`SYNC`].
pub const SOR_REQ: u8 = 0xFB;
/// Start-of-response marker, written by the firmware before a response frame.
pub const SOR_RSP: u8 = 0xF9;
/// Marker the host writes once it has finished writing a request frame.
pub const ALL_WRITTEN: u8 = 0xFA;
/// The byte the firmware repeats three times to signal a framing/checksum error.
pub const ERR: u8 = 0xEF;
/// The full three-byte error marker.
pub const ERROR_MARKER: [u8; 3] = [ERR, ERR, ERR];

/// Everything that can go wrong decoding or verifying a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Caller-provided buffer was too small to hold the encoded frame.
    BufferTooSmall,
    /// Payload is longer than a single-byte length field can express.
    PayloadTooLarge,
    /// The 4-byte sync preamble did not match.
    BadSync,
    /// The firmware's sync acknowledgement did not match [`SYNC_ACK`].
    BadSyncAck,
    /// Expected [`SOR_REQ`] was not observed.
    BadStartOfRequest,
    /// Expected [`SOR_RSP`] was not observed.
    BadStartOfResponse,
    /// Expected [`ALL_WRITTEN`] was not observed.
    BadAllWritten,
    /// The header echo (`L C FB`) did not match what was sent.
    EchoMismatch,
    /// The payload's repeated `C`/`L` bytes did not match the header.
    PayloadEchoMismatch,
    /// Fletcher-16 derived checksum did not match the trailer.
    ChecksumMismatch,
    /// Input ended before a complete frame could be read.
    Truncated,
}

#[cfg(feature = "std")]
impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FrameError::BufferTooSmall => "output buffer too small",
            FrameError::PayloadTooLarge => "payload exceeds 255 bytes",
            FrameError::BadSync => "bad sync preamble",
            FrameError::BadSyncAck => "bad sync acknowledgement",
            FrameError::BadStartOfRequest => "bad start-of-request marker",
            FrameError::BadStartOfResponse => "bad start-of-response marker",
            FrameError::BadAllWritten => "bad all-written marker",
            FrameError::EchoMismatch => "header echo mismatch",
            FrameError::PayloadEchoMismatch => "payload C/L echo mismatch",
            FrameError::ChecksumMismatch => "checksum mismatch",
            FrameError::Truncated => "frame truncated",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

/// Fletcher-16 **mod 255** checksum over `region`.
///
/// `sum1`/`sum2` are reduced modulo 255, not 256 — that distinction is part
/// of the wire contract (`"abcde"` checksums to `0xC8F0`).
pub fn fletcher16(region: &[u8]) -> u16 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    for &byte in region {
        sum1 = (sum1 + byte as u32) % 255;
        sum2 = (sum2 + sum1) % 255;
    }
    ((sum2 << 8) | sum1) as u16
}

/// Derives the two trailer bytes `(c0, c1)` the firmware actually checks,
/// from the raw Fletcher-16 value over `region`.
///
/// This is *not* just the big-endian split of `fletcher16`: the firmware
/// verification equation uses a two-stage complement derived with `0xFF`
/// (255), not `0x100` (256). Reproducing this exactly is required for
/// interoperation.
pub fn checksum_bytes(region: &[u8]) -> [u8; 2] {
    let fletcher = fletcher16(region);
    let f0 = (fletcher & 0xFF) as u16;
    let f1 = ((fletcher >> 8) & 0xFF) as u16;
    let c0 = 0xFFu16 - ((f0 + f1) % 0xFF);
    let c1 = 0xFFu16 - ((f0 + c0) % 0xFF);
    [c0 as u8, c1 as u8]
}

/// Verifies `trailer` against the checksum recomputed over `region`.
pub fn verify_checksum(region: &[u8], trailer: [u8; 2]) -> bool {
    checksum_bytes(region) == trailer
}

/// Total encoded length of a request frame carrying `payload_len` payload
/// bytes: `4 (sync) + 3 (SOR C L) + 2 (C L, repeated) + payload + 2 (trailer) + 1 (FA)`.
pub const fn request_frame_len(payload_len: usize) -> usize {
    4 + 3 + 2 + payload_len + 2 + 1
}

/// Encodes a full request frame (sync preamble through `ALL_WRITTEN`) for
/// command byte `code` and `payload` into `out`.
///
/// This does not perform the header-echo handshake (§4.2 step 3) — that is
/// a transport-level read/write interleaving the caller (the host session)
/// drives itself, writing the sync+header first and this function's tail
/// only after the echo has been verified. See [`encode_sync_and_header`]
/// and [`encode_body`].
pub fn encode_request_frame(code: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    if payload.len() > u8::MAX as usize {
        return Err(FrameError::PayloadTooLarge);
    }
    let needed = request_frame_len(payload.len());
    if out.len() < needed {
        return Err(FrameError::BufferTooSmall);
    }

    let mut w = 0;
    out[w..w + 4].copy_from_slice(&SYNC);
    w += 4;
    out[w] = SOR_REQ;
    out[w + 1] = code;
    out[w + 2] = payload.len() as u8;
    w += 3;

    let body_start = w;
    let body_len = encode_body(code, payload, &mut out[body_start..])?;
    w += body_len;

    out[w] = ALL_WRITTEN;
    w += 1;
    Ok(w)
}

/// Writes just the sync preamble + `SOR_REQ C L` header (the first 7 bytes
/// of a request frame, before the host reads back the echo).
pub fn encode_sync_and_header(code: u8, payload_len: u8, out: &mut [u8; 7]) {
    out[0..4].copy_from_slice(&SYNC);
    out[4] = SOR_REQ;
    out[5] = code;
    out[6] = payload_len;
}

/// The 3-byte echo the firmware is expected to send back after the header:
/// `L C FB` (reverse order of what the host sent).
pub fn expected_header_echo(code: u8, payload_len: u8) -> [u8; 3] {
    [payload_len, code, SOR_REQ]
}

/// Writes the checksummed body of a request frame: `C L payload... F0 F1`.
/// Returns the number of bytes written.
pub fn encode_body(code: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    if payload.len() > u8::MAX as usize {
        return Err(FrameError::PayloadTooLarge);
    }
    let region_len = 2 + payload.len();
    if out.len() < region_len + 2 {
        return Err(FrameError::BufferTooSmall);
    }

    out[0] = code;
    out[1] = payload.len() as u8;
    out[2..2 + payload.len()].copy_from_slice(payload);

    let trailer = checksum_bytes(&out[..region_len]);
    out[region_len] = trailer[0];
    out[region_len + 1] = trailer[1];
    Ok(region_len + 2)
}

/// Verifies that a received body's repeated `C`/`L` bytes match the header
/// the firmware already parsed, per spec §4.3 VERIFY.
pub fn verify_payload_echo(code: u8, len: u8, body: &[u8]) -> bool {
    body.len() >= 2 && body[0] == code && body[1] == len
}

/// Encodes a response frame: `F9 L <ack> <payload...>`. Responses carry no
/// checksum (spec §4.2 decode step 4, §9 Open Question).
pub fn encode_response_frame(ack: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    let len = 1 + payload.len();
    if len > u8::MAX as usize {
        return Err(FrameError::PayloadTooLarge);
    }
    if out.len() < 2 + len {
        return Err(FrameError::BufferTooSmall);
    }
    out[0] = SOR_RSP;
    out[1] = len as u8;
    out[2] = ack;
    out[3..3 + payload.len()].copy_from_slice(payload);
    Ok(2 + len)
}

/// Decodes a response frame already known to start with [`SOR_RSP`]:
/// `bytes` is `F9 L <ack> <payload...>`. Returns `(ack, payload)`.
pub fn decode_response_frame(bytes: &[u8]) -> Result<(u8, &[u8]), FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Truncated);
    }
    if bytes[0] != SOR_RSP {
        return Err(FrameError::BadStartOfResponse);
    }
    if bytes.len() < 2 {
        return Err(FrameError::Truncated);
    }
    let len = bytes[1] as usize;
    if bytes.len() < 2 + len {
        return Err(FrameError::Truncated);
    }
    if len == 0 {
        return Err(FrameError::Truncated);
    }
    let ack = bytes[2];
    let payload = &bytes[3..2 + len];
    Ok((ack, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fletcher16_reference_vector() {
        assert_eq!(fletcher16(b"abcde"), 0xC8F0);
    }

    #[test]
    fn fletcher16_linear_in_append() {
        let whole = fletcher16(b"abcdefgh");
        // Not literally additive (it's not a linear checksum over halves),
        // but splitting and recombining the *same* bytes through the byte
        // loop must reproduce the identical running state either way.
        let mut sum1: u32 = 0;
        let mut sum2: u32 = 0;
        for half in [&b"abcd"[..], &b"efgh"[..]] {
            for &byte in half {
                sum1 = (sum1 + byte as u32) % 255;
                sum2 = (sum2 + sum1) % 255;
            }
        }
        assert_eq!(((sum2 << 8) | sum1) as u16, whole);
    }

    #[test]
    fn checksum_uses_mod_255_not_256() {
        // A region whose naive mod-256 Fletcher would differ from mod-255.
        let region = [0xFFu8; 4];
        let fletcher = fletcher16(&region);
        // sum1 mod 255 of four 0xFF bytes: 255 % 255 = 0 each step, so sum1 stays 0.
        assert_eq!(fletcher & 0xFF, 0);
    }

    #[test]
    fn request_frame_round_trip_header_and_body() {
        let payload = [0x01u8];
        let mut header = [0u8; 7];
        encode_sync_and_header(0x07, payload.len() as u8, &mut header);
        assert_eq!(&header[0..4], &SYNC);
        assert_eq!(header[4], SOR_REQ);
        assert_eq!(header[5], 0x07);
        assert_eq!(header[6], 1);

        let echo = expected_header_echo(0x07, 1);
        assert_eq!(echo, [1, 0x07, SOR_REQ]);

        let mut body = [0u8; 16];
        let n = encode_body(0x07, &payload, &mut body).unwrap();
        assert_eq!(n, 2 + 1 + 2);
        assert!(verify_payload_echo(0x07, 1, &body[..n]));
        let trailer = [body[n - 2], body[n - 1]];
        assert!(verify_checksum(&body[..3], trailer));
    }

    #[test]
    fn full_request_frame_encodes_expected_length() {
        let mut out = [0u8; 64];
        let n = encode_request_frame(0x09, &[0, 1, 0, 2], &mut out).unwrap();
        assert_eq!(n, request_frame_len(4));
        assert_eq!(&out[0..4], &SYNC);
        assert_eq!(out[4], SOR_REQ);
        assert_eq!(out[n - 1], ALL_WRITTEN);
    }

    #[test]
    fn response_frame_round_trip() {
        let mut out = [0u8; 16];
        let n = encode_response_frame(0x02, &[1, 0], &mut out).unwrap();
        let (ack, payload) = decode_response_frame(&out[..n]).unwrap();
        assert_eq!(ack, 0x02);
        assert_eq!(payload, &[1, 0]);
    }

    #[test]
    fn response_frame_rejects_bad_marker() {
        let bytes = [0x00, 0x01, 0x04];
        assert_eq!(
            decode_response_frame(&bytes),
            Err(FrameError::BadStartOfResponse)
        );
    }
}

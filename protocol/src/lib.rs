#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Wire protocol for the egg-printer serial link: frame codec, Fletcher-16
//! checksum, and the typed command/response pairs exchanged between the
//! host session and the firmware listener.

pub mod command;
pub mod frame;

pub use command::{CommandCode, ParsedRequest, PenState, Point, Request, Response};
pub use frame::FrameError;

/// Protocol version this crate implements, `(major, minor)`.
pub const PROTOCOL_VERSION: (u8, u8) = (1, 0);

/// Canvas width in steps. Cylindrical: X wraps modulo `CANVAS_WIDTH`.
pub const CANVAS_WIDTH: i32 = 1600;

/// Canvas height in steps. Y is clamped to `[0, CANVAS_HEIGHT - 1]`.
pub const CANVAS_HEIGHT: i32 = 420;

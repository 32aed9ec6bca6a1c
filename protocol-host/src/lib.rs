//! Host-side session for the egg-printer serial link: opens the port,
//! performs synchronization and handshake, and exposes a typed
//! `Session::send` (plus per-command convenience wrappers) over the frame
//! codec in the `protocol` crate.

mod collaborators;
mod config;
mod error;
mod session;

pub use collaborators::{Bootstrapper, PortEnumerator, TokioSerialPortEnumerator, UnimplementedBootstrapper};
pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{Session, Transport};

pub use protocol::{CommandCode, PenState, Point, Request, Response};

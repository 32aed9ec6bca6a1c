//! External collaborators the session consumes but does not implement
//! (spec §1, §6): port enumeration and hex-file bootstrapping. These are
//! narrow trait seams so the core can reference them without pulling in
//! board-flashing or hex-parsing logic.

use std::future::Future;
use std::pin::Pin;

use crate::error::SessionError;

/// Lists serial ports so `open` can pick the single unambiguous one when no
/// port name is given. A stub implementation backed by `tokio_serial` is
/// provided because *some* port discovery is needed in practice; actually
/// building a port-picker UI around it is out of scope.
pub trait PortEnumerator: Send + Sync {
    fn list_ports(&self) -> Result<Vec<String>, SessionError>;
}

/// Default [`PortEnumerator`] backed by `tokio_serial::available_ports`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSerialPortEnumerator;

impl PortEnumerator for TokioSerialPortEnumerator {
    fn list_ports(&self) -> Result<Vec<String>, SessionError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| SessionError::Protocol(format!("failed to list serial ports: {e}")))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

/// Reflashes the listener firmware when a handshake reports an older
/// version (spec §4.1 step 3). Flashing logic itself is explicitly out of
/// scope (spec §1); the handshake retry path calls this and surfaces
/// whatever it returns.
pub trait Bootstrapper: Send + Sync {
    fn upload_hex<'a>(
        &'a self,
        model: &'a str,
        port_name: &'a str,
        hex_lines: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;
}

/// The bootstrapper used when the caller doesn't supply one. Reflashing is
/// not implemented in this core (spec §1's listed exclusion); it returns a
/// clear [`SessionError::Protocol`] so the handshake retry path fails
/// legibly rather than silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnimplementedBootstrapper;

impl Bootstrapper for UnimplementedBootstrapper {
    fn upload_hex<'a>(
        &'a self,
        _model: &'a str,
        _port_name: &'a str,
        _hex_lines: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(async {
            Err(SessionError::Protocol(
                "listener firmware is stale but bootstrapping is not implemented in this core"
                    .into(),
            ))
        })
    }
}

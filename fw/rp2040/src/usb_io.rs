//! [`crate::listener::FrameIo`] implementation over the USB CDC-ACM class,
//! the same transport the teacher used for its serial passthrough. USB
//! delivers bytes in up-to-64-byte packets that rarely line up with the
//! protocol's phase boundaries, so reads are served out of a small
//! overflow buffer fed by `read_packet`, mirroring the teacher's own
//! `frame_buf`/`drop_prefix` bookkeeping in spirit.

use embassy_time::{Duration, Timer};
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::driver::{Driver, EndpointError};
use heapless::Vec;

use rp2040::listener::{FrameIo, ReadOutcome};

use crate::READ_BUFFER_SIZE;

/// Bytes read from the USB endpoint but not yet consumed by the listener.
const OVERFLOW_BUFFER_SIZE: usize = 256;

pub struct UsbFrameIo<'d, 'c, D: Driver<'d>> {
    class: &'c mut CdcAcmClass<'d, D>,
    overflow: Vec<u8, OVERFLOW_BUFFER_SIZE>,
}

impl<'d, 'c, D: Driver<'d>> UsbFrameIo<'d, 'c, D> {
    pub fn new(class: &'c mut CdcAcmClass<'d, D>) -> Self {
        UsbFrameIo {
            class,
            overflow: Vec::new(),
        }
    }

    /// Pulls one byte out of the overflow buffer if one is already
    /// available, without touching the USB endpoint.
    fn pop_overflow(&mut self) -> Option<u8> {
        if self.overflow.is_empty() {
            return None;
        }
        let byte = self.overflow[0];
        self.overflow.rotate_left(1);
        self.overflow.truncate(self.overflow.len() - 1);
        Some(byte)
    }

    async fn fill_from_endpoint(&mut self) -> Result<(), EndpointError> {
        let mut packet = [0u8; READ_BUFFER_SIZE];
        let n = self.class.read_packet(&mut packet).await?;
        for &byte in &packet[..n] {
            // Drop bytes past the overflow buffer's capacity rather than
            // panicking: a well-behaved host never queues this much ahead
            // of the listener consuming it.
            let _ = self.overflow.push(byte);
        }
        Ok(())
    }
}

impl<'d, 'c, D: Driver<'d>> FrameIo for UsbFrameIo<'d, 'c, D> {
    type Error = EndpointError;

    async fn read_byte_blocking(&mut self) -> Result<u8, Self::Error> {
        loop {
            if let Some(b) = self.pop_overflow() {
                return Ok(b);
            }
            self.fill_from_endpoint().await?;
        }
    }

    async fn read_exact_timeout(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<ReadOutcome, Self::Error> {
        let deadline = Timer::after(Duration::from_millis(timeout_ms));
        let mut filled = 0;

        let read_fut = async {
            while filled < buf.len() {
                if let Some(b) = self.pop_overflow() {
                    buf[filled] = b;
                    filled += 1;
                    continue;
                }
                self.fill_from_endpoint().await?;
            }
            Ok::<(), EndpointError>(())
        };

        match embassy_futures::select::select(read_fut, deadline).await {
            embassy_futures::select::Either::First(result) => {
                result?;
                Ok(ReadOutcome::Ready)
            }
            embassy_futures::select::Either::Second(()) => Ok(ReadOutcome::TimedOut),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for chunk in buf.chunks(READ_BUFFER_SIZE) {
            self.class.write_packet(chunk).await?;
        }
        Ok(())
    }
}

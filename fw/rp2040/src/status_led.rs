//! WS2812 status indicator. One LED, driven over PIO, showing which phase
//! the listener loop (`crate::listener`) is in — there is no display or log
//! output to watch otherwise once the board is detached from a debug probe.

use embassy_rp::pio::Instance;
use embassy_rp::pio_programs::ws2812::PioWs2812;
use smart_leds::RGB8;

pub const DEFAULT_NUM_LEDS: usize = 1;

/// Listener lifecycle phases the main loop reports after each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColours {
    /// Waiting for `SYNC`; no host session established yet.
    Idle,
    /// A command is being read, echoed, or dispatched.
    Communicating,
    /// The previous iteration wrote `EF EF EF` (spec §4.3 error marker).
    Error,
    /// The previous iteration finished normally.
    Success,
}

// I haven't figured out why but the red and green codes are switched.
impl StatusColours {
    pub const fn as_rbg(&self) -> RGB8 {
        match self {
            StatusColours::Idle => RGB8::new(0, 0, 100),         // Blue
            StatusColours::Communicating => RGB8::new(10, 70, 100), // Purple
            StatusColours::Error => RGB8::new(0, 100, 0),        // Red
            StatusColours::Success => RGB8::new(100, 0, 0),      // Green
        }
    }
}

pub struct StatusLed<'d, P, const S: usize, const N: usize>
where
    P: Instance,
{
    led: PioWs2812<'d, P, S, N>,
}

impl<'d, P, const S: usize, const N: usize> StatusLed<'d, P, S, N>
where
    P: Instance,
{
    pub fn new(pio_ws2812: PioWs2812<'d, P, S, N>) -> Self {
        StatusLed { led: pio_ws2812 }
    }

    pub async fn set_colour(&mut self, colour: StatusColours) {
        self.led.write(&[colour.as_rbg(); N]).await;
    }

    pub async fn turn_off(&mut self) {
        self.led.write(&[RGB8::new(0, 0, 0); N]).await;
    }
}

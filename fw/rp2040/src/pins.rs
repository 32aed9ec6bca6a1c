//! Hardware seams the motion kernel drives: stepper direction/step/enable
//! lines and the pen servo. Kept as narrow traits (rather than the concrete
//! `embassy_rp` types) so [`crate::motion`] compiles and is unit-testable
//! under `std`, the same separation the teacher draws between its handler
//! logic and the peripherals it borrows (`handlers::HandlerPeripherals`).

use embedded_hal_1::digital::OutputPin;

/// Logical level a direction or step/enable line is driven to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// The six GPIO lines the motion kernel owns: direction, step, and enable
/// for each of the two stepper motors (spec §4.4, §4.3 Begin/End dispatch).
pub trait StepperPins {
    type Pin: OutputPin;

    fn dir_x(&mut self) -> &mut Self::Pin;
    fn step_x(&mut self) -> &mut Self::Pin;
    fn dir_y(&mut self) -> &mut Self::Pin;
    fn step_y(&mut self) -> &mut Self::Pin;
    fn enable_x(&mut self) -> &mut Self::Pin;
    fn enable_y(&mut self) -> &mut Self::Pin;
}

fn write(pin: &mut impl OutputPin, level: Level) {
    let _ = match level {
        Level::Low => pin.set_low(),
        Level::High => pin.set_high(),
    };
}

/// Drives both enable lines low (spec §4.3 `Begin`: "drive both stepper
/// `ENABLE` pins LOW (enabled)").
pub fn enable_steppers<P: StepperPins>(pins: &mut P) {
    write(pins.enable_x(), Level::Low);
    write(pins.enable_y(), Level::Low);
}

/// Drives both enable lines high (spec §4.3 `End`).
pub fn disable_steppers<P: StepperPins>(pins: &mut P) {
    write(pins.enable_x(), Level::High);
    write(pins.enable_y(), Level::High);
}

pub(crate) fn set_dir_x<P: StepperPins>(pins: &mut P, level: Level) {
    write(pins.dir_x(), level);
}

pub(crate) fn set_dir_y<P: StepperPins>(pins: &mut P, level: Level) {
    write(pins.dir_y(), level);
}

pub(crate) fn set_step_x<P: StepperPins>(pins: &mut P, level: Level) {
    write(pins.step_x(), level);
}

pub(crate) fn set_step_y<P: StepperPins>(pins: &mut P, level: Level) {
    write(pins.step_y(), level);
}

/// The pen servo. `set_angle_deg` is synchronous (it only writes a PWM duty
/// register); the 200 ms settle wait in [`crate::motion::set_pen`] is a
/// separate, explicit delay so it is visible at the call site and testable
/// without a real timer.
pub trait Servo {
    fn set_angle_deg(&mut self, degrees: u16);
}

/// Concrete GPIO wiring for the two stepper motors. Built directly from
/// `embassy_rp::gpio::Output` handles the caller has already configured
/// against specific pins; this type only tracks which handle is which line.
#[cfg(feature = "hardware")]
pub struct RpStepperPins<'d> {
    dir_x: embassy_rp::gpio::Output<'d>,
    step_x: embassy_rp::gpio::Output<'d>,
    dir_y: embassy_rp::gpio::Output<'d>,
    step_y: embassy_rp::gpio::Output<'d>,
    enable_x: embassy_rp::gpio::Output<'d>,
    enable_y: embassy_rp::gpio::Output<'d>,
}

#[cfg(feature = "hardware")]
impl<'d> RpStepperPins<'d> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dir_x: embassy_rp::gpio::Output<'d>,
        step_x: embassy_rp::gpio::Output<'d>,
        dir_y: embassy_rp::gpio::Output<'d>,
        step_y: embassy_rp::gpio::Output<'d>,
        enable_x: embassy_rp::gpio::Output<'d>,
        enable_y: embassy_rp::gpio::Output<'d>,
    ) -> Self {
        RpStepperPins {
            dir_x,
            step_x,
            dir_y,
            step_y,
            enable_x,
            enable_y,
        }
    }
}

#[cfg(feature = "hardware")]
impl<'d> StepperPins for RpStepperPins<'d> {
    type Pin = embassy_rp::gpio::Output<'d>;

    fn dir_x(&mut self) -> &mut Self::Pin {
        &mut self.dir_x
    }
    fn step_x(&mut self) -> &mut Self::Pin {
        &mut self.step_x
    }
    fn dir_y(&mut self) -> &mut Self::Pin {
        &mut self.dir_y
    }
    fn step_y(&mut self) -> &mut Self::Pin {
        &mut self.step_y
    }
    fn enable_x(&mut self) -> &mut Self::Pin {
        &mut self.enable_x
    }
    fn enable_y(&mut self) -> &mut Self::Pin {
        &mut self.enable_y
    }
}

/// Pen servo driven by a hardware PWM slice. `embassy_rp::pwm::Pwm` wants a
/// 16-bit `top`/`compare` pair; `top` is fixed so the slice free-runs at
/// 50 Hz and `compare` is recomputed from the commanded angle on every call.
#[cfg(feature = "hardware")]
pub struct RpServo<'d> {
    pwm: embassy_rp::pwm::Pwm<'d>,
    top: u16,
}

#[cfg(feature = "hardware")]
impl<'d> RpServo<'d> {
    /// Clock the PWM slice to run at 50 Hz with the given counter `top`
    /// (e.g. `24_999` alongside a `divider` chosen so `top+1` ticks take
    /// 20 ms), matching standard hobby-servo pulse timing.
    pub fn new(pwm: embassy_rp::pwm::Pwm<'d>, top: u16) -> Self {
        RpServo { pwm, top }
    }

    /// Maps `0..=180` degrees onto a 1000-2000us pulse width, expressed as a
    /// fraction of `top`.
    fn duty_for_angle(&self, degrees: u16) -> u16 {
        let degrees = degrees.min(180) as u32;
        let span = self.top as u32 / 20; // 20ms period -> 1us per (top/20000 * 1000)
        let pulse_us = 1_000 + (degrees * 1_000) / 180;
        ((pulse_us * span) / 1_000) as u16
    }
}

#[cfg(feature = "hardware")]
impl<'d> Servo for RpServo<'d> {
    fn set_angle_deg(&mut self, degrees: u16) {
        let mut config = self.pwm.get_config();
        config.compare_a = self.duty_for_angle(degrees);
        config.compare_b = config.compare_a;
        self.pwm.set_config(&config);
    }
}

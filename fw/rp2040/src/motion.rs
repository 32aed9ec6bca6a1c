//! The motion kernel (spec §4.4): canvas translation, pen servo control, and
//! the two walkers — Bresenham `lineTo` for drawing moves and the
//! cylindrical-shortest-path `flyTo` for repositioning moves. Generic over
//! [`crate::pins::StepperPins`]/[`crate::pins::Servo`] and a
//! `DelayNs` so the walking logic is identical whether it drives real GPIO
//! or a recording test double.

use embedded_hal_async::delay::DelayNs;
use protocol::{CANVAS_HEIGHT, CANVAS_WIDTH};

use crate::pins::{self, Level, Servo, StepperPins};

/// Microseconds the motion kernel waits for each pulse half (spec §4.4:
/// "wait 2 ms").
const STEP_PULSE_US: u32 = 2_000;
/// Milliseconds the kernel blocks after commanding the servo, to let it
/// physically settle (spec §4.4 `setPen`).
const SERVO_SETTLE_MS: u32 = 200;
/// Servo angle commanded when the pen is down (spec §4.4).
const SERVO_DOWN_DEG: u16 = 140;
/// Servo angle commanded when the pen is up (spec §4.4).
const SERVO_UP_DEG: u16 = 170;

/// Firmware-resident pen/position state (spec §3 "Lifecycle": persists for
/// the microcontroller's power cycle). `penX`/`penY` are stored already
/// translated into canvas space, matching spec §4.4 step 5's "update penX,
/// penY to the translated target".
pub struct MotionState {
    pen_down: bool,
    pen_x: i32,
    pen_y: i32,
}

impl MotionState {
    /// Initial pen position is the canvas origin `(0, H/2)` (spec §3).
    pub const fn new() -> Self {
        MotionState {
            pen_down: false,
            pen_x: 0,
            pen_y: CANVAS_HEIGHT / 2,
        }
    }

    pub fn pen_down(&self) -> bool {
        self.pen_down
    }

    /// `setPen` (spec §4.4): records `penDown`, drives the servo, and
    /// blocks 200 ms for it to settle.
    pub async fn set_pen<S: Servo, D: DelayNs>(&mut self, servo: &mut S, delay: &mut D, down: bool) {
        self.pen_down = down;
        servo.set_angle_deg(if down { SERVO_DOWN_DEG } else { SERVO_UP_DEG });
        delay.delay_ms(SERVO_SETTLE_MS).await;
    }

    /// `moveTo` (spec §4.4): dispatches to `lineTo` when the pen is down,
    /// `flyTo` otherwise. This is the only place pen state affects motion.
    pub async fn move_to<P: StepperPins, D: DelayNs>(
        &mut self,
        pins: &mut P,
        delay: &mut D,
        x: i32,
        y: i32,
    ) {
        let (tx, ty) = translate(x, y);
        if self.pen_down {
            self.line_to(pins, delay, tx, ty).await;
        } else {
            self.fly_to(pins, delay, tx, ty).await;
        }
    }

    /// Bresenham walker (spec §4.4 `lineTo`). `tx`/`ty` are already
    /// translated canvas coordinates.
    async fn line_to<P: StepperPins, D: DelayNs>(&mut self, pins: &mut P, delay: &mut D, tx: i32, ty: i32) {
        let dx = tx - self.pen_x;
        let dy = ty - self.pen_y;

        pins::set_dir_x(pins, direction_level(dx));
        pins::set_dir_y(pins, direction_level(dy));

        let dx_abs = dx.unsigned_abs();
        let dy_abs = dy.unsigned_abs();
        let longer = dx_abs.max(dy_abs);
        let shorter = dx_abs.min(dy_abs);
        let x_is_longer = dx_abs >= dy_abs;

        let mut diff = 2 * shorter as i64 - longer as i64;

        for _ in 0..longer {
            set_longer_shorter(pins, x_is_longer, Level::High, diff > 0);
            delay.delay_us(STEP_PULSE_US).await;

            set_longer_shorter(pins, x_is_longer, Level::Low, diff > 0);
            if diff > 0 {
                diff -= 2 * longer as i64;
            }
            delay.delay_us(STEP_PULSE_US).await;

            diff += 2 * shorter as i64;
        }

        self.pen_x = tx;
        self.pen_y = ty;
    }

    /// Cylindrical shortest-path walker (spec §4.4 `flyTo`). `tx`/`ty` are
    /// already translated canvas coordinates; the wrap-around shortcut in X
    /// only applies to the *step count*, never to the stored position.
    async fn fly_to<P: StepperPins, D: DelayNs>(&mut self, pins: &mut P, delay: &mut D, tx: i32, ty: i32) {
        let mut dx = (tx - self.pen_x).rem_euclid(CANVAS_WIDTH);
        if dx.abs() > CANVAS_WIDTH / 2 {
            if dx > 0 {
                dx -= CANVAS_WIDTH;
            } else {
                dx += CANVAS_WIDTH;
            }
        }
        let dy = ty - self.pen_y;

        pins::set_dir_x(pins, direction_level(dx));
        pins::set_dir_y(pins, direction_level(dy));

        let dx_abs = dx.unsigned_abs();
        let dy_abs = dy.unsigned_abs();
        let steps = dx_abs.max(dy_abs);

        for s in 0..steps {
            if s < dx_abs {
                pins::set_step_x(pins, Level::High);
            }
            if s < dy_abs {
                pins::set_step_y(pins, Level::High);
            }
            delay.delay_us(STEP_PULSE_US).await;

            if s < dx_abs {
                pins::set_step_x(pins, Level::Low);
            }
            if s < dy_abs {
                pins::set_step_y(pins, Level::Low);
            }
            delay.delay_us(STEP_PULSE_US).await;
        }

        self.pen_x = tx;
        self.pen_y = ty;
    }
}

impl Default for MotionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Positive → HIGH, negative → LOW, zero → HIGH (spec §4.4 `lineTo` step 1;
/// reused for `flyTo`'s direction-pin step, which states the same rule).
fn direction_level(delta: i32) -> Level {
    if delta < 0 {
        Level::Low
    } else {
        Level::High
    }
}

fn set_longer_shorter<P: StepperPins>(pins: &mut P, x_is_longer: bool, level: Level, pulse_shorter: bool) {
    if x_is_longer {
        pins::set_step_x(pins, level);
        if pulse_shorter {
            pins::set_step_y(pins, level);
        }
    } else {
        pins::set_step_y(pins, level);
        if pulse_shorter {
            pins::set_step_x(pins, level);
        }
    }
}

/// Translates an incoming logical coordinate into canvas space (spec §4.4
/// "Canvas translation"): add the origin `(0, H/2)` and clamp `y` into
/// `[0, H-1]`. `x` is left unclamped; only `flyTo` wraps it, and only for
/// the purposes of choosing a step count.
fn translate(x: i32, y: i32) -> (i32, i32) {
    let ty = (y + CANVAS_HEIGHT / 2).clamp(0, CANVAS_HEIGHT - 1);
    (x, ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::fake::{FakePins, FakeServo};

    struct FakeDelay;

    impl DelayNs for FakeDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn zero_length_line_is_a_no_op() {
        embassy_futures::block_on(async {
            let mut pins = FakePins::new();
            let mut delay = FakeDelay;
            let mut motion = MotionState::new();
            motion.set_pen(&mut FakeServo::default(), &mut delay, true).await;
            let before = pins.events();
            motion.move_to(&mut pins, &mut delay, 0, 0).await;
            // pen is down and already at the origin: no step pulses.
            assert_eq!(pins.events().len(), before.len() + 2); // only the two direction writes
        });
    }

    #[test]
    fn line_to_pulses_longer_axis_max_and_shorter_axis_min() {
        embassy_futures::block_on(async {
            let mut pins = FakePins::new();
            let mut delay = FakeDelay;
            let mut motion = MotionState::new();
            motion.set_pen(&mut FakeServo::default(), &mut delay, true).await;
            // Origin translates to (0, 210). Logical (100, 50) translates to
            // (100, 260): dx=100, dy=50.
            motion.move_to(&mut pins, &mut delay, 100, 50).await;

            assert_eq!(pins.pulse_count("step_x", Level::High), 100);
            assert_eq!(pins.pulse_count("step_y", Level::High), 50);
        });
    }

    #[test]
    fn fly_to_wraps_around_the_cylinder() {
        embassy_futures::block_on(async {
            let mut pins = FakePins::new();
            let mut delay = FakeDelay;
            let mut motion = MotionState::new();
            // pen stays up: moveTo routes through flyTo.
            motion.move_to(&mut pins, &mut delay, 0, 0).await;
            // pen_x is 0; go to CANVAS_WIDTH - 1, which should wrap to a
            // 1-step move rather than CANVAS_WIDTH - 1 steps.
            motion
                .move_to(&mut pins, &mut delay, CANVAS_WIDTH - 1, 0)
                .await;
            assert_eq!(pins.pulse_count("step_x", Level::High), 1);
        });
    }

    #[test]
    fn fly_to_updates_position_to_unwrapped_target() {
        embassy_futures::block_on(async {
            let mut pins = FakePins::new();
            let mut delay = FakeDelay;
            let mut motion = MotionState::new();
            motion
                .move_to(&mut pins, &mut delay, CANVAS_WIDTH - 1, 0)
                .await;
            // A second identical move should now be a no-op in X (already there).
            pins.events(); // drain not needed; just re-issue and recount below.
            let before = pins.pulse_count("step_x", Level::High);
            motion
                .move_to(&mut pins, &mut delay, CANVAS_WIDTH - 1, 0)
                .await;
            assert_eq!(pins.pulse_count("step_x", Level::High), before);
        });
    }

    #[test]
    fn y_is_clamped_into_canvas_height() {
        embassy_futures::block_on(async {
            let mut pins = FakePins::new();
            let mut delay = FakeDelay;
            let mut motion = MotionState::new();
            motion.set_pen(&mut FakeServo::default(), &mut delay, true).await;
            // Logical y far below the bottom clamps to translated y=0; from
            // origin (0,210) that's 210 steps, not more.
            motion.move_to(&mut pins, &mut delay, 0, -10_000).await;
            assert_eq!(pins.pulse_count("step_y", Level::High), 210);
        });
    }
}

#![no_std]
#![no_main]

mod status_led;
mod usb_io;

use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level as GpioLevel, Output};
use embassy_rp::peripherals::{PIO0, USB};
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use embassy_rp::pio_programs::ws2812::{PioWs2812, PioWs2812Program};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_time::Delay;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, Config};
use rp2040::listener::{self, IterationOutcome};
use rp2040::motion::MotionState;
use rp2040::pins::{RpServo, RpStepperPins};
use status_led::{StatusColours, StatusLed, DEFAULT_NUM_LEDS};
use usb_io::UsbFrameIo;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

/// Largest chunk handed to `class.read_packet`/`write_packet` at once (the
/// CDC-ACM class negotiates 64-byte full-speed bulk endpoints).
pub(crate) const READ_BUFFER_SIZE: usize = 64;

/// PWM counter top giving a 20ms period (50Hz) at the default 125MHz system
/// clock with a /100 divider: 125_000_000 / 100 / 50 - 1.
const SERVO_PWM_TOP: u16 = 24_999;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let mut pio = Pio::new(p.PIO0, Irqs);
    let program = PioWs2812Program::new(&mut pio.common);
    let mut status_led = StatusLed::new(PioWs2812::<PIO0, 0, DEFAULT_NUM_LEDS>::new(
        &mut pio.common,
        pio.sm0,
        p.DMA_CH0,
        p.PIN_16,
        &program,
    ));
    status_led.set_colour(StatusColours::Idle).await;

    let stepper_pins = RpStepperPins::new(
        Output::new(p.PIN_2, GpioLevel::Low), // dir_x
        Output::new(p.PIN_3, GpioLevel::Low), // step_x
        Output::new(p.PIN_4, GpioLevel::Low), // dir_y
        Output::new(p.PIN_5, GpioLevel::Low), // step_y
        Output::new(p.PIN_6, GpioLevel::High), // enable_x (disabled at boot)
        Output::new(p.PIN_7, GpioLevel::High), // enable_y (disabled at boot)
    );

    let mut pwm_config = PwmConfig::default();
    pwm_config.top = SERVO_PWM_TOP;
    pwm_config.divider = 100.into();
    let servo_pwm = Pwm::new_output_a(p.PWM_SLICE0, p.PIN_0, pwm_config);
    let mut servo = RpServo::new(servo_pwm, SERVO_PWM_TOP);

    // USB CDC needs the USB peripheral and its interrupt handler.
    let driver = Driver::new(p.USB, Irqs);

    let mut config = Config::new(0x2e8a, 0x000a);
    config.manufacturer = Some("egg-printer");
    config.product = Some("RP2040 Zero plotter");
    config.serial_number = Some("0001");
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    // Descriptor/state buffers must live for the lifetime of the USB device.
    let mut config_descriptor = [0; 256];
    let mut bos_descriptor = [0; 256];
    let mut control_buf = [0; 64];
    let mut state = State::new();

    let mut builder = Builder::new(
        driver,
        config,
        &mut config_descriptor,
        &mut bos_descriptor,
        &mut [], // No Microsoft OS descriptors
        &mut control_buf,
    );

    // CDC-ACM class exposes a USB serial port to the host.
    let mut class = CdcAcmClass::new(&mut builder, &mut state, 64);
    let mut device = builder.build();

    // USB device task runs independently from the listener loop task.
    let usb_fut = device.run();

    let listener_fut = async {
        let mut motion = MotionState::new();
        let mut pins = stepper_pins;
        let mut delay = Delay;

        // Service connections forever; each iteration is one command
        // exchange (spec §4.3). A disconnect just drops back to waiting.
        loop {
            class.wait_connection().await;
            status_led.set_colour(StatusColours::Communicating).await;

            let mut io = UsbFrameIo::new(&mut class);
            loop {
                match listener::run_iteration(&mut io, &mut motion, &mut pins, &mut servo, &mut delay).await {
                    Ok(IterationOutcome::Completed) => status_led.set_colour(StatusColours::Success).await,
                    Ok(IterationOutcome::ErrorReported) => status_led.set_colour(StatusColours::Error).await,
                    Err(_) => break,
                }
            }
        }
    };

    // Execute the USB driver task and the listener loop together; the
    // status LED is driven inline from within the listener loop rather
    // than as a separate concurrent task, since it only ever changes in
    // response to a listener iteration's outcome.
    join(usb_fut, listener_fut).await;
}

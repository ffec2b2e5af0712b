// Complementary PWM pair for the power stage's switch drivers.
//
// One MCPWM timer and operator, two generators on separate pins. Both
// generators act on the same compare value with inverted actions, so at any
// instant one output is in the active part of the period and the other in
// the complementary part. Compare updates latch when the counter wraps
// (SYNC_ON_ZERO) so the pair always switches on the same period boundary.

use esp_hal::gpio::GpioPin;
use esp_hal::mcpwm::operator::{PwmActions, PwmPin, PwmPinConfig, PwmUpdateMethod, UpdateAction};
use esp_hal::mcpwm::timer::{PwmWorkingMode, Timer};
use esp_hal::mcpwm::{McPwm, PeripheralClockConfig};
use esp_hal::peripherals::MCPWM0;
use esp_hal::time::Rate;

use shared::pwm::{duty_to_compare, period_ticks, TimingError};

/// Timing-base resolution. 160 MHz source / 4.
pub const RESOLUTION_HZ: u32 = 40_000_000;

#[derive(Debug)]
pub enum PwmError {
    Timing(TimingError),
    /// The peripheral clock tree cannot produce the requested rates.
    Clock,
}

pub struct DualPwm {
    primary: PwmPin<'static, MCPWM0, 0, true>,
    conjugate: PwmPin<'static, MCPWM0, 0, false>,
    timer: Timer<0, MCPWM0>,
    period_ticks: u16,
    duty_percent: f32,
}

impl DualPwm {
    /// Brings the pair up at `freq_hz` with both outputs parked at 0 %
    /// duty. Fails on a zero frequency or a period the compare hardware
    /// cannot represent; there is no runtime reconfiguration.
    pub fn new(
        mcpwm: MCPWM0,
        pin_primary: GpioPin<4>,
        pin_conjugate: GpioPin<5>,
        freq_hz: u32,
    ) -> Result<Self, PwmError> {
        let ticks = period_ticks(RESOLUTION_HZ, freq_hz).map_err(PwmError::Timing)?;

        let clock_cfg = PeripheralClockConfig::with_frequency(Rate::from_hz(RESOLUTION_HZ))
            .map_err(|_| PwmError::Clock)?;
        let mut mcpwm = McPwm::new(mcpwm, clock_cfg);
        mcpwm.operator0.set_timer(&mcpwm.timer0);

        // primary: high from the counter wrap, low at the compare value
        let primary_actions = PwmActions::empty()
            .on_up_counting_timer_equals_zero(UpdateAction::SetHigh)
            .on_up_counting_timer_equals_timestamp(UpdateAction::SetLow);
        // conjugate: the inverse, on the same compare value
        let conjugate_actions = PwmActions::empty()
            .on_up_counting_timer_equals_zero(UpdateAction::SetLow)
            .on_up_counting_timer_equals_timestamp(UpdateAction::SetHigh);

        let (primary, conjugate) = mcpwm.operator0.with_pins(
            pin_primary,
            PwmPinConfig::new(primary_actions, PwmUpdateMethod::SYNC_ON_ZERO),
            pin_conjugate,
            PwmPinConfig::new(conjugate_actions, PwmUpdateMethod::SYNC_ON_ZERO),
        );

        // counter runs 0..=ticks-1, so the full-scale compare value `ticks`
        // is never reached and 100 % duty holds the primary high
        let timer_cfg = clock_cfg
            .timer_clock_with_frequency(ticks - 1, PwmWorkingMode::Increase, Rate::from_hz(freq_hz))
            .map_err(|_| PwmError::Clock)?;
        let mut timer = mcpwm.timer0;
        timer.start(timer_cfg);

        let mut pwm = Self {
            primary,
            conjugate,
            timer,
            period_ticks: ticks,
            duty_percent: 0.0,
        };
        pwm.set_duty(0.0);
        Ok(pwm)
    }

    /// Sets the duty of the primary output (the conjugate follows as its
    /// inverse). Out-of-range percentages clamp to [0, 100]. Both outputs
    /// pick the new value up together on the next period boundary.
    pub fn set_duty(&mut self, duty_percent: f32) {
        let duty = duty_percent.clamp(0.0, 100.0);
        let compare = duty_to_compare(duty, self.period_ticks);
        self.primary.set_timestamp(compare);
        self.conjugate.set_timestamp(compare);
        self.duty_percent = duty;
    }

    /// Last duty actually applied, after clamping.
    pub fn duty(&self) -> f32 {
        self.duty_percent
    }

    /// Halts the timing base; both outputs stop switching. The pair only
    /// comes back through a fresh `new`.
    #[allow(dead_code)]
    pub fn stop(&mut self) {
        self.timer.stop();
    }
}

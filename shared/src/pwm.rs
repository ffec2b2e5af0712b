//! Timing math for the complementary PWM pair, kept apart from the MCPWM
//! driver so it can be checked on the host.

use libm::roundf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingError {
    ZeroFrequency,
    /// The switching frequency exceeds the timing-base resolution.
    PeriodTooShort,
    /// The period does not fit the 16-bit compare hardware.
    PeriodTooLong,
}

/// Period length in timer ticks for the requested switching frequency on a
/// timing base of `resolution_hz`.
pub fn period_ticks(resolution_hz: u32, freq_hz: u32) -> Result<u16, TimingError> {
    if freq_hz == 0 {
        return Err(TimingError::ZeroFrequency);
    }
    let ticks = resolution_hz / freq_hz;
    if ticks == 0 {
        return Err(TimingError::PeriodTooShort);
    }
    if ticks > u16::MAX as u32 {
        return Err(TimingError::PeriodTooLong);
    }
    Ok(ticks as u16)
}

/// Compare value for a duty percentage. Out-of-range percentages clamp to
/// [0, 100]; the result rounds to the nearest tick.
pub fn duty_to_compare(duty_percent: f32, period_ticks: u16) -> u16 {
    let duty = duty_percent.clamp(0.0, 100.0);
    roundf(duty / 100.0 * period_ticks as f32) as u16
}

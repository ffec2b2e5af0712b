use libm::fabsf;

/// Applied values below this magnitude mean "the stage is not actuating
/// yet": the tick is skipped entirely so the integrator cannot wind up
/// before the first real duty command. The loop therefore does not
/// self-start; the command layer seeds the first nonzero duty.
pub const ARMING_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,

    /// Clamp applied to the incoming value and to the computed output.
    pub output_min: f32,
    pub output_max: f32,

    /// Anti-windup bound on the integral accumulator, for when the stage
    /// stops responding for a while.
    pub integral_min: f32,
    pub integral_max: f32,

    /// Fixed tick period in seconds. Must be positive.
    pub period_s: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kp: 0.4,
            ki: 0.7,
            kd: 0.0,
            output_min: 0.0,
            output_max: 65.0,
            integral_min: -100.0,
            integral_max: 100.0,
            period_s: 0.001,
        }
    }
}

/// Discrete PID over the duty percentage, ticked at a fixed period.
///
/// The regulated value is the previously applied duty itself: each tick
/// compares what the stage is currently putting out against the target and
/// nudges it. Measured telemetry is reported elsewhere, it does not feed
/// this loop.
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    pub config: Config,
    setpoint: f32,
    integral: f32,
    last_error: f32,
}

impl Pid {
    pub fn new(config: Config, setpoint: f32) -> Self {
        debug_assert!(config.period_s > 0.0);
        Self {
            config,
            setpoint,
            integral: 0.0,
            last_error: 0.0,
        }
    }

    /// One control tick.
    ///
    /// `applied` is the duty currently at the output. Returns the next duty
    /// to apply, or `None` while the stage is below the arming threshold
    /// (in which case no state changes at all).
    pub fn update(&mut self, applied: f32) -> Option<f32> {
        if fabsf(applied) < ARMING_EPSILON {
            return None;
        }
        let cfg = &self.config;
        let applied = applied.clamp(cfg.output_min, cfg.output_max);
        let error = self.setpoint - applied;

        self.integral =
            (self.integral + error * cfg.period_s).clamp(cfg.integral_min, cfg.integral_max);

        let derivative = (error - self.last_error) / cfg.period_s;
        self.last_error = error;

        let output = cfg.kp * error + cfg.ki * self.integral + cfg.kd * derivative;
        Some(output.clamp(cfg.output_min, cfg.output_max))
    }

    /// Clears the accumulated error memory. Gains, setpoint and limits are
    /// untouched.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn set_setpoint(&mut self, target: f32) {
        self.setpoint = target;
    }

    pub fn set_kp(&mut self, kp: f32) {
        self.config.kp = kp;
    }

    pub fn set_ki(&mut self, ki: f32) {
        self.config.ki = ki;
    }

    pub fn set_kd(&mut self, kd: f32) {
        self.config.kd = kd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proportional_only() -> Pid {
        Pid::new(
            Config {
                kp: 1.0,
                ki: 0.0,
                kd: 0.0,
                output_min: 0.0,
                output_max: 100.0,
                ..Config::default()
            },
            10.0,
        )
    }

    #[test]
    fn proportional_path() {
        let mut pid = proportional_only();
        // applied 5, target 10 -> error 5 -> output 5 with unity gain
        assert_eq!(pid.update(5.0), Some(5.0));
    }

    #[test]
    fn below_arming_threshold_is_a_complete_no_op() {
        let mut pid = Pid::new(Config::default(), 30.0);
        // build up some state first
        pid.update(10.0);
        let before = pid;
        assert_eq!(pid.update(0.0), None);
        assert_eq!(pid.update(5.0e-7), None);
        assert_eq!(pid.integral.to_bits(), before.integral.to_bits());
        assert_eq!(pid.last_error.to_bits(), before.last_error.to_bits());
    }

    #[test]
    fn integral_saturates_at_the_windup_clamp() {
        let cfg = Config {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
            output_min: 0.0,
            output_max: 50.0,
            integral_min: -2.0,
            integral_max: 2.0,
            period_s: 0.1,
        };
        let mut pid = Pid::new(cfg, 100.0);
        // sustained positive error of ~50 per tick; the accumulator must
        // stop at integral_max and the output at output_max
        for _ in 0..100 {
            let out = pid.update(50.0).unwrap();
            assert!(out <= cfg.output_max);
        }
        assert_eq!(pid.integral, cfg.integral_max);
        assert_eq!(pid.update(50.0), Some(2.0));
    }

    #[test]
    fn output_clamps_under_huge_gains() {
        let mut pid = Pid::new(
            Config {
                kp: 1.0e6,
                ..Config::default()
            },
            60.0,
        );
        assert_eq!(pid.update(1.0), Some(pid.config.output_max));
        pid.set_setpoint(0.0);
        assert_eq!(pid.update(65.0), Some(pid.config.output_min));
    }

    #[test]
    fn reset_reproduces_a_fresh_controller_exactly() {
        let cfg = Config::default();
        let mut used = Pid::new(cfg, 40.0);
        for applied in [10.0, 12.0, 20.0, 33.0] {
            used.update(applied);
        }
        used.reset();

        let mut fresh = Pid::new(cfg, 40.0);
        let a = used.update(17.5).unwrap();
        let b = fresh.update(17.5).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn mutators_take_effect_on_the_next_tick() {
        let mut pid = proportional_only();
        assert_eq!(pid.update(5.0), Some(5.0));
        pid.set_setpoint(20.0);
        assert_eq!(pid.update(5.0), Some(15.0));
        pid.set_kp(2.0);
        assert_eq!(pid.update(5.0), Some(30.0));
    }

    #[test]
    fn incoming_value_is_clamped_before_the_error_forms() {
        let mut pid = proportional_only();
        // applied beyond output_max reads as output_max -> error -90
        pid.set_setpoint(10.0);
        assert_eq!(pid.update(500.0), Some(0.0));
        assert_eq!(pid.last_error, -90.0);
    }
}

// Applies parsed console lines to the regulator. No replies go back over
// the command channel; bad input costs a log line and nothing else.

use esp_println::println;
use libm::fabsf;

use shared::command::{self, Command, Gain};
use shared::pid::{Pid, ARMING_EPSILON};

/// Handles one line. Returns a duty percentage to seed the output with when
/// a target command arms an idle stage (the regulator tick skips itself
/// while the applied duty is below the arming threshold, so the first
/// nonzero duty has to come from here).
pub fn apply(line: &str, pid: &mut Pid, applied_duty: f32) -> Option<f32> {
    let Some(cmd) = command::parse(line) else {
        println!("console: ignored {:?}", line);
        return None;
    };
    match cmd {
        Command::Reset => {
            pid.reset();
            println!("console: regulator state cleared");
            None
        }
        Command::SetTarget(target) => {
            let cfg = pid.config;
            if target < cfg.output_min || target > cfg.output_max {
                println!(
                    "console: target {} outside {}..{}, ignored",
                    target, cfg.output_min, cfg.output_max
                );
                return None;
            }
            pid.set_setpoint(target);
            println!("console: target -> {}%", target);
            let idle = fabsf(applied_duty) < ARMING_EPSILON;
            (idle && fabsf(target) >= ARMING_EPSILON).then_some(target)
        }
        Command::SetGain(gain, value) => {
            match gain {
                Gain::Kp => pid.set_kp(value),
                Gain::Ki => pid.set_ki(value),
                Gain::Kd => pid.set_kd(value),
            }
            println!("console: gain {:?} -> {}", gain, value);
            None
        }
    }
}

//! Console grammar, one command per line:
//!
//! - `R`            reset the regulator's accumulated state
//! - `V:<float>`    set the regulator target
//! - `K:P:<float>`  set one gain (also `K:I:`, `K:D:`)
//! - `<float>`      legacy alias for `V:<float>`
//!
//! Parsing is pure; range checks against the regulator limits happen at the
//! point of application.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Reset,
    SetTarget(f32),
    SetGain(Gain, f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    Kp,
    Ki,
    Kd,
}

/// Parses one line. Malformed input, unknown gain letters and non-finite
/// numbers all come back as `None`; the caller logs and moves on.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == "R" {
        return Some(Command::Reset);
    }
    if let Some(rest) = line.strip_prefix("V:") {
        return parse_float(rest).map(Command::SetTarget);
    }
    if let Some(rest) = line.strip_prefix("K:") {
        let (which, value) = rest.split_once(':')?;
        let gain = match which.trim() {
            "P" => Gain::Kp,
            "I" => Gain::Ki,
            "D" => Gain::Kd,
            _ => return None,
        };
        return parse_float(value).map(|v| Command::SetGain(gain, v));
    }
    parse_float(line).map(Command::SetTarget)
}

fn parse_float(s: &str) -> Option<f32> {
    let v: f32 = s.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

/// Longest line the console accepts.
pub const LINE_MAX: usize = 64;

/// Assembles console bytes into lines. An overlong line is discarded in its
/// entirety; the assembler resynchronizes on the next terminator.
pub struct LineBuffer {
    line: heapless::String<LINE_MAX>,
    overflowed: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            line: heapless::String::new(),
            overflowed: false,
        }
    }

    /// Feeds one byte; returns a complete non-empty line on CR or LF.
    pub fn feed(&mut self, byte: u8) -> Option<heapless::String<LINE_MAX>> {
        match byte {
            b'\r' | b'\n' => {
                let line = core::mem::take(&mut self.line);
                let overflowed = core::mem::take(&mut self.overflowed);
                (!overflowed && !line.is_empty()).then_some(line)
            }
            other => {
                if self.line.push(other as char).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_form() {
        assert_eq!(parse("R"), Some(Command::Reset));
        assert_eq!(parse("V:42.5"), Some(Command::SetTarget(42.5)));
        assert_eq!(parse("K:P:0.8"), Some(Command::SetGain(Gain::Kp, 0.8)));
        assert_eq!(parse("K:I:0.05"), Some(Command::SetGain(Gain::Ki, 0.05)));
        assert_eq!(parse("K:D:1.5"), Some(Command::SetGain(Gain::Kd, 1.5)));
        assert_eq!(parse("12.5"), Some(Command::SetTarget(12.5)));
    }

    #[test]
    fn tolerates_terminal_line_endings_and_padding() {
        assert_eq!(parse("  R \r"), Some(Command::Reset));
        assert_eq!(parse("V: 10.0\r"), Some(Command::SetTarget(10.0)));
        assert_eq!(parse("K:P: 2\r\n"), Some(Command::SetGain(Gain::Kp, 2.0)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
        assert_eq!(parse("hello"), None);
        assert_eq!(parse("V:"), None);
        assert_eq!(parse("V:abc"), None);
        assert_eq!(parse("K:P"), None);
        assert_eq!(parse("K:X:1.0"), None);
        assert_eq!(parse("K::1.0"), None);
        assert_eq!(parse("RV"), None);
    }

    #[test]
    fn rejects_non_finite_numbers() {
        assert_eq!(parse("V:inf"), None);
        assert_eq!(parse("V:NaN"), None);
        assert_eq!(parse("-inf"), None);
    }

    fn feed_str(buffer: &mut LineBuffer, s: &str) -> Option<heapless::String<LINE_MAX>> {
        let mut out = None;
        for &b in s.as_bytes() {
            if let Some(line) = buffer.feed(b) {
                out = Some(line);
            }
        }
        out
    }

    #[test]
    fn assembles_lines_across_terminators() {
        let mut buffer = LineBuffer::new();
        assert_eq!(feed_str(&mut buffer, "V:10.5\r\n").as_deref(), Some("V:10.5"));
        // the CRLF pair must not produce a phantom empty line
        assert_eq!(buffer.feed(b'\n'), None);
        assert_eq!(feed_str(&mut buffer, "R\n").as_deref(), Some("R"));
    }

    #[test]
    fn overlong_line_is_discarded_whole() {
        let mut buffer = LineBuffer::new();
        for _ in 0..LINE_MAX + 10 {
            assert_eq!(buffer.feed(b'x'), None);
        }
        assert_eq!(buffer.feed(b'\n'), None);
        // and the assembler has resynchronized
        assert_eq!(feed_str(&mut buffer, "R\n").as_deref(), Some("R"));
    }
}

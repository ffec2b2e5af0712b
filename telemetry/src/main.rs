use chrono::{DateTime, Utc};
use influxdb::{Client, InfluxDbWriteable, WriteQuery};
use shared::state::{State, FRAME_MAGIC};
use std::{io::Read, mem::size_of, time::Duration};
use zerocopy::FromBytes;

const FRAME_LEN: usize = size_of::<State>();

#[derive(Clone, Debug, InfluxDbWriteable)]
pub struct Record {
    time: DateTime<Utc>,

    tick: u32,
    setpoint: f32,
    duty: f32,

    kp: f32,
    ki: f32,
    kd: f32,

    bus_v: f32,
    shunt_mv: f32,
    current_ma: f32,
    power_mw: f32,
}

impl Record {
    fn from_state(s: &State) -> Self {
        Self {
            time: Utc::now(),
            tick: s.tick,
            setpoint: s.setpoint,
            duty: s.duty,
            kp: s.kp,
            ki: s.ki,
            kd: s.kd,
            bus_v: s.bus_v,
            shunt_mv: s.shunt_mv,
            current_ma: s.current_ma,
            power_mw: s.power_mw,
        }
    }
}

#[tokio::main]
async fn main() {
    let token = std::env::var("INFLUX_TOKEN").unwrap();
    let ip = std::env::var("INFLUX_IP").unwrap();
    let client = Client::new(ip, "powerstage").with_token(token);

    let port_name = find_port().expect("power stage not found");
    println!("power stage @ {}", port_name);

    // Baudrate doesn't matter because this port is CDC
    let mut port = serialport::new(port_name, 1_000_000)
        .timeout(Duration::from_millis(1000))
        .open()
        .expect("Failed to open port");

    let mut scanner = FrameScanner::new();
    let mut frames: Vec<WriteQuery> = vec![];
    let mut chunk = [0u8; 1024];
    loop {
        let n = match port.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(e) => panic!("serial read failed: {e}"),
        };

        for item in scanner.push(&chunk[..n]) {
            match item {
                // pass normal print statements through
                Item::Text(text) => print!("{}", String::from_utf8_lossy(&text)),
                Item::Frame(state) => {
                    frames.push(Record::from_state(&state).into_query("powerstage"))
                }
            }
        }

        if frames.len() >= 20 {
            if client.query(&frames).await.is_err() {
                if frames.len() >= 1000 {
                    frames.clear();
                    println!("Too many failed write attempts");
                    println!("\x07"); // terminal bell
                    std::process::exit(1);
                } else {
                    println!("Write failed, continuing...");
                }
            } else {
                frames.clear();
            }
        }
    }
}

fn find_port() -> Option<String> {
    let ports = serialport::available_ports().expect("No ports found");
    for p in ports {
        if let serialport::SerialPortType::UsbPort(usb_port) = p.port_type {
            if usb_port
                .manufacturer
                .is_some_and(|m| m.eq_ignore_ascii_case("espressif"))
            {
                return Some(p.port_name);
            }
        }
    }
    None
}

#[derive(Debug)]
enum Item {
    Text(Vec<u8>),
    Frame(State),
}

/// Recovers magic-prefixed binary frames from the serial stream. Everything
/// between frames is ordinary log text and is handed back untouched; a
/// partially received frame (or partial magic) stays buffered until the
/// rest arrives.
struct FrameScanner {
    buf: Vec<u8>,
}

impl FrameScanner {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Item> {
        self.buf.extend_from_slice(bytes);
        let mut items = Vec::new();
        loop {
            match find_magic(&self.buf) {
                Some(at) => {
                    if at > 0 {
                        items.push(Item::Text(self.buf.drain(..at).collect()));
                    }
                    if self.buf.len() < FRAME_MAGIC.len() + FRAME_LEN {
                        break; // wait for the rest of the frame
                    }
                    let payload = &self.buf[FRAME_MAGIC.len()..FRAME_MAGIC.len() + FRAME_LEN];
                    let state = State::read_from_bytes(payload).expect("sized payload");
                    self.buf.drain(..FRAME_MAGIC.len() + FRAME_LEN);
                    items.push(Item::Frame(state));
                }
                None => {
                    // release everything except a possible partial magic at
                    // the tail
                    let keep = partial_magic_tail(&self.buf);
                    let release = self.buf.len() - keep;
                    if release > 0 {
                        items.push(Item::Text(self.buf.drain(..release).collect()));
                    }
                    break;
                }
            }
        }
        items
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_MAGIC.len()).position(|w| w == FRAME_MAGIC)
}

fn partial_magic_tail(buf: &[u8]) -> usize {
    for keep in (1..FRAME_MAGIC.len()).rev() {
        if buf.len() >= keep && buf[buf.len() - keep..] == FRAME_MAGIC[..keep] {
            return keep;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    fn sample_state(tick: u32) -> State {
        State {
            tick,
            setpoint: 40.0,
            duty: 39.5,
            bus_v: 12.0,
            ..State::default()
        }
    }

    fn frame_bytes(state: &State) -> Vec<u8> {
        let mut out = FRAME_MAGIC.to_vec();
        out.extend_from_slice(state.as_bytes());
        out
    }

    fn texts(items: &[Item]) -> Vec<u8> {
        items
            .iter()
            .filter_map(|i| match i {
                Item::Text(t) => Some(t.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn ticks(items: &[Item]) -> Vec<u32> {
        items
            .iter()
            .filter_map(|i| match i {
                Item::Frame(s) => Some(s.tick),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn recovers_frames_embedded_in_log_text() {
        let mut stream = b"booting\r\n".to_vec();
        stream.extend_from_slice(&frame_bytes(&sample_state(1)));
        stream.extend_from_slice(b"console: target -> 40%\r\n");
        stream.extend_from_slice(&frame_bytes(&sample_state(2)));

        let mut scanner = FrameScanner::new();
        let items = scanner.push(&stream);

        assert_eq!(ticks(&items), [1, 2]);
        assert_eq!(texts(&items), b"booting\r\nconsole: target -> 40%\r\n");
    }

    #[test]
    fn survives_frames_split_across_reads() {
        let full = frame_bytes(&sample_state(7));
        for split in 1..full.len() - 1 {
            let mut scanner = FrameScanner::new();
            let first = scanner.push(&full[..split]);
            assert!(first.iter().all(|i| matches!(i, Item::Text(_))));
            let second = scanner.push(&full[split..]);
            let mut got = ticks(&first);
            got.extend(ticks(&second));
            assert_eq!(got, [7], "split at {split}");
        }
    }

    #[test]
    fn partial_magic_is_not_flushed_as_text() {
        let mut scanner = FrameScanner::new();
        let items = scanner.push(b"logPS");
        // "PS" could be the start of a frame; only "log" may come out
        assert_eq!(texts(&items), b"log");

        // it was indeed a frame
        let mut rest = FRAME_MAGIC[2..].to_vec();
        rest.extend_from_slice(sample_state(3).as_bytes());
        let items = scanner.push(&rest);
        assert_eq!(ticks(&items), [3]);
        assert!(texts(&items).is_empty());
    }
}

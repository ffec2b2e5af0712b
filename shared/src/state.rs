use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Prefix of every binary telemetry record on the serial stream. Log text
/// interleaves freely; the host scans for this magic to recover frames.
pub const FRAME_MAGIC: [u8; 4] = *b"PST1";

/// Telemetry frame streamed by the firmware once a second and decoded
/// byte-for-byte by the host tool.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct State {
    /// Regulator ticks since boot.
    pub tick: u32,

    pub setpoint: f32,
    pub duty: f32,

    pub kp: f32,
    pub ki: f32,
    pub kd: f32,

    // latest power-monitor reading
    pub bus_v: f32,
    pub shunt_mv: f32,
    pub current_ma: f32,
    pub power_mw: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_bytes() {
        let state = State {
            tick: 7,
            setpoint: 42.0,
            duty: 41.5,
            kp: 0.4,
            ki: 0.7,
            kd: 0.0,
            bus_v: 12.05,
            shunt_mv: 1.25,
            current_ma: 125.0,
            power_mw: 1506.0,
        };
        let bytes = state.as_bytes();
        assert_eq!(bytes.len(), core::mem::size_of::<State>());
        let back = State::read_from_bytes(bytes).unwrap();
        assert_eq!(back.tick, 7);
        assert_eq!(back.duty.to_bits(), state.duty.to_bits());
        assert_eq!(back.power_mw.to_bits(), state.power_mw.to_bits());
    }
}

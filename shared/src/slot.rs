use portable_atomic::{AtomicU32, Ordering};

/// Word-sized f32 cell for handing one value between two execution
/// contexts, stored as its bit pattern.
///
/// Single-writer by convention: exactly one context stores, any context
/// loads. The two instances in this firmware are the applied duty (main
/// loop writes, regulator tick reads) and the commanded duty (regulator
/// tick writes, main loop reads).
pub struct F32Slot(AtomicU32);

impl F32Slot {
    /// Starts at 0.0.
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for F32Slot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exact_bit_patterns() {
        let slot = F32Slot::new();
        assert_eq!(slot.load(), 0.0);
        for v in [42.5f32, -0.0, 1.0e-6, -273.15, f32::MAX] {
            slot.store(v);
            assert_eq!(slot.load().to_bits(), v.to_bits());
        }
    }
}

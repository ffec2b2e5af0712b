use heapless::Vec;

use crate::channel::Producer;

/// Most devices one sampler will poll.
pub const MAX_DEVICES: usize = 4;

/// Raw payload bytes carried per sample.
pub const SAMPLE_BYTES: usize = 8;

/// One pollable device: which bus it sits on and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bus: u8,
    pub addr: u8,
}

/// One raw reading, as it came off the wire. Decoding to engineering units
/// happens on the consumer side.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub device: DeviceDescriptor,
    pub len: u8,
    pub data: [u8; SAMPLE_BYTES],
}

/// The bus transaction the sampler delegates to. Implementations perform
/// one bounded synchronous read for the given device; errors cover NACK and
/// timeout alike and simply cost that device its sample for the tick.
pub trait SampleBus {
    type Error;

    fn read(&mut self, device: &DeviceDescriptor, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

/// Polls a fixed, ordered set of devices from a periodic timer callback and
/// feeds the readings into a channel for the main loop.
pub struct Sampler {
    devices: Vec<DeviceDescriptor, MAX_DEVICES>,
}

impl Sampler {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Registers a device; polling order is registration order. Devices are
    /// never removed at runtime.
    pub fn add_device(&mut self, device: DeviceDescriptor) -> Result<(), CapacityExceeded> {
        self.devices.push(device).map_err(|_| CapacityExceeded)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// One timer tick: read every registered device in order. A failed
    /// transaction skips that device until the next tick (no in-tick retry)
    /// and never blocks the devices after it; a full channel drops the
    /// sample. Returns how many samples were delivered.
    pub fn poll<B: SampleBus, const N: usize>(
        &self,
        bus: &mut B,
        out: &mut Producer<'_, Sample, N>,
    ) -> usize {
        let mut delivered = 0;
        for device in self.devices.iter() {
            let mut sample = Sample {
                device: *device,
                len: 0,
                data: [0; SAMPLE_BYTES],
            };
            if let Ok(n) = bus.read(device, &mut sample.data) {
                sample.len = n.min(SAMPLE_BYTES) as u8;
                if out.push(sample).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    /// Reads a running counter for every device except the one configured
    /// to fail.
    struct MockBus {
        failing_addr: u8,
        counter: u8,
    }

    impl SampleBus for MockBus {
        type Error = ();

        fn read(&mut self, device: &DeviceDescriptor, buf: &mut [u8]) -> Result<usize, ()> {
            if device.addr == self.failing_addr {
                return Err(());
            }
            self.counter += 1;
            buf[0] = device.addr;
            buf[1] = self.counter;
            Ok(2)
        }
    }

    #[test]
    fn device_list_capacity_is_enforced() {
        let mut sampler = Sampler::new();
        for addr in 0..MAX_DEVICES as u8 {
            sampler.add_device(DeviceDescriptor { bus: 0, addr }).unwrap();
        }
        assert_eq!(
            sampler.add_device(DeviceDescriptor { bus: 0, addr: 99 }),
            Err(CapacityExceeded)
        );
        assert_eq!(sampler.device_count(), MAX_DEVICES);
    }

    #[test]
    fn failing_device_never_blocks_the_healthy_one() {
        let mut sampler = Sampler::new();
        sampler.add_device(DeviceDescriptor { bus: 0, addr: 0x40 }).unwrap();
        sampler.add_device(DeviceDescriptor { bus: 0, addr: 0x41 }).unwrap();

        let ch: Channel<Sample, 8> = Channel::new();
        let (mut tx, mut rx) = ch.split().unwrap();
        let mut bus = MockBus {
            failing_addr: 0x40,
            counter: 0,
        };

        for _ in 0..3 {
            assert_eq!(sampler.poll(&mut bus, &mut tx), 1);
        }

        // only the healthy device delivered, in tick order
        for expected in 1..=3u8 {
            let sample = rx.pop().unwrap();
            assert_eq!(sample.device.addr, 0x41);
            assert_eq!(sample.len, 2);
            assert_eq!(sample.data[1], expected);
        }
        assert!(rx.pop().is_none());
    }

    #[test]
    fn full_channel_drops_the_sample_quietly() {
        let mut sampler = Sampler::new();
        sampler.add_device(DeviceDescriptor { bus: 0, addr: 0x41 }).unwrap();

        let ch: Channel<Sample, 2> = Channel::new();
        let (mut tx, mut rx) = ch.split().unwrap();
        let mut bus = MockBus {
            failing_addr: 0,
            counter: 0,
        };

        assert_eq!(sampler.poll(&mut bus, &mut tx), 1);
        assert_eq!(sampler.poll(&mut bus, &mut tx), 1);
        assert_eq!(sampler.poll(&mut bus, &mut tx), 0);

        // the oldest two readings survived
        assert_eq!(rx.pop().unwrap().data[1], 1);
        assert_eq!(rx.pop().unwrap().data[1], 2);
        assert!(rx.pop().is_none());
    }
}

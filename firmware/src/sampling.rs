// Bus adapters the periodic sampler reads through, plus the bundle the
// 50 ms tick borrows.

use embedded_hal::spi::SpiBus;
use esp_hal::gpio::Output;
use esp_hal::i2c::master::I2c;
use esp_hal::spi::master::Spi;
use esp_hal::Blocking;

use shared::channel::Producer;
use shared::sampler::{DeviceDescriptor, Sample, SampleBus, Sampler};

/// Queue depth for each sample channel.
pub const SAMPLE_DEPTH: usize = 10;

pub const MONITOR_BUS_ID: u8 = 0;
pub const TRANSFER_BUS_ID: u8 = 1;

/// Power-monitor reads through the (shared) I2C bus. The sampler borrows
/// the bus for the duration of one tick.
pub struct MonitorBus<'a> {
    pub i2c: &'a mut I2c<'static, Blocking>,
}

impl SampleBus for MonitorBus<'_> {
    type Error = esp_hal::i2c::master::Error;

    fn read(&mut self, device: &DeviceDescriptor, buf: &mut [u8]) -> Result<usize, Self::Error> {
        crate::ina226::read_block(self.i2c, device.addr, buf)
    }
}

/// Fixed-size block reads from the expansion header, chip select by GPIO.
pub struct TransferBus {
    pub spi: Spi<'static, Blocking>,
    pub cs: Output<'static>,
}

impl SampleBus for TransferBus {
    type Error = esp_hal::spi::Error;

    fn read(&mut self, _device: &DeviceDescriptor, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.cs.set_low();
        let result = SpiBus::read(&mut self.spi, buf);
        self.cs.set_high();
        result.map(|_| buf.len())
    }
}

/// Everything the sampler tick owns.
pub struct SamplerBank {
    pub monitor: Sampler,
    pub transfer: Sampler,
    pub transfer_bus: TransferBus,
    pub monitor_tx: Producer<'static, Sample, SAMPLE_DEPTH>,
    pub transfer_tx: Producer<'static, Sample, SAMPLE_DEPTH>,
}

impl SamplerBank {
    /// One 50 ms tick: poll the power monitor(s), then the expansion port.
    /// A failure on either bus costs that device one sample and nothing
    /// else.
    pub fn poll_all(&mut self, i2c: &mut I2c<'static, Blocking>) {
        let mut monitor_bus = MonitorBus { i2c };
        self.monitor.poll(&mut monitor_bus, &mut self.monitor_tx);
        self.transfer.poll(&mut self.transfer_bus, &mut self.transfer_tx);
    }
}

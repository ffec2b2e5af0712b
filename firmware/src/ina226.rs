// INA226 current/voltage/power monitor on the output rail.

use bitfield::bitfield;
use embedded_hal::i2c::I2c;
use esp_println::println;

use shared::sampler::Sample;

/// A1 = A0 = GND.
pub const ADDRESS: u8 = 0x40;

#[repr(u8)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Register {
    Config = 0x00,
    ShuntVoltage = 0x01,
    BusVoltage = 0x02,
    Power = 0x03,
    Current = 0x04,
    Calibration = 0x05,
}

// 10 mOhm shunt, 3.2768 A full scale
const SHUNT_RESISTOR_OHMS: f32 = 0.01;
const MAX_CURRENT_A: f32 = 3.2768;

// register resolutions, scaled to the units we report
const SHUNT_LSB_MV: f32 = 0.0025; // 2.5 uV/bit
const BUS_LSB_V: f32 = 0.00125; // 1.25 mV/bit
const CURRENT_LSB_MA: f32 = 0.1;
const POWER_LSB_MW: f32 = 2.5; // 25 * current LSB

bitfield! {
    struct Config(u16);
    impl Debug;
    _, set_avg: 11, 9;
    _, set_bus_conv_time: 8, 6;
    _, set_shunt_conv_time: 5, 3;
    _, set_mode: 2, 0;
}

/// Writes the configuration and calibration registers. Called once at
/// bring-up; a failure here leaves the monitor unusable until reboot.
pub fn init<T: I2c>(i2c: &mut T) -> Result<(), T::Error> {
    // bit 14 is a reserved always-one bit
    let mut config = Config(1 << 14);
    config.set_avg(0b000); // no averaging
    config.set_bus_conv_time(0b100); // 1.1 ms
    config.set_shunt_conv_time(0b100); // 1.1 ms
    config.set_mode(0b111); // continuous shunt + bus
    write_reg(i2c, Register::Config, config.0)?;

    // CAL = 0.00512 / (current_lsb * Rshunt)
    let current_lsb_a = MAX_CURRENT_A / 32768.0;
    let cal = (0.00512 / (current_lsb_a * SHUNT_RESISTOR_OHMS) + 0.5) as u16;
    write_reg(i2c, Register::Calibration, cal)?;

    println!(
        "INA226 up: config=0x{:04x} cal=0x{:04x} ({} mA/bit)",
        config.0, cal, CURRENT_LSB_MA
    );
    Ok(())
}

fn write_reg<T: I2c>(i2c: &mut T, reg: Register, value: u16) -> Result<(), T::Error> {
    let v = value.to_be_bytes();
    i2c.write(ADDRESS, &[reg as u8, v[0], v[1]])
}

const READOUT: [Register; 4] = [
    Register::ShuntVoltage,
    Register::BusVoltage,
    Register::Current,
    Register::Power,
];

/// One sampler transaction: the four measurement registers, big-endian,
/// two bytes each, in `READOUT` order.
pub fn read_block<T: I2c>(i2c: &mut T, addr: u8, buf: &mut [u8]) -> Result<usize, T::Error> {
    for (i, reg) in READOUT.iter().enumerate() {
        i2c.write_read(addr, &[*reg as u8], &mut buf[2 * i..2 * i + 2])?;
    }
    Ok(2 * READOUT.len())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reading {
    pub bus_v: f32,
    pub shunt_mv: f32,
    pub current_ma: f32,
    pub power_mw: f32,
}

/// Scales a raw sample produced by `read_block` to engineering units.
pub fn decode(sample: &Sample) -> Option<Reading> {
    if (sample.len as usize) < 2 * READOUT.len() {
        return None;
    }
    let d = &sample.data;
    let shunt = i16::from_be_bytes([d[0], d[1]]);
    let bus = u16::from_be_bytes([d[2], d[3]]);
    let current = i16::from_be_bytes([d[4], d[5]]);
    let power = u16::from_be_bytes([d[6], d[7]]);
    Some(Reading {
        shunt_mv: shunt as f32 * SHUNT_LSB_MV,
        bus_v: bus as f32 * BUS_LSB_V,
        current_ma: current as f32 * CURRENT_LSB_MA,
        power_mw: power as f32 * POWER_LSB_MW,
    })
}

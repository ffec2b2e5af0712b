#![no_std]
#![no_main]

mod console;
mod ina226;
mod oled;
mod pwm;
mod sampling;

use core::cell::RefCell;
use core::fmt::Write;

use critical_section::Mutex;
use esp_backtrace as _;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::handler;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::{Duration, Instant, Rate};
use esp_hal::timer::timg::TimerGroup;
use esp_hal::timer::PeriodicTimer;
use esp_hal::uart::{Config as UartConfig, RxConfig, Uart, UartInterrupt};
use esp_hal::Blocking;
use esp_println::println;
use heapless::String;
use portable_atomic::{AtomicU32, Ordering};
use zerocopy::IntoBytes;

use shared::channel::{Channel, Producer};
use shared::command::LineBuffer;
use shared::pid::{Config as PidConfig, Pid};
use shared::sampler::{DeviceDescriptor, Sample, Sampler};
use shared::slot::F32Slot;
use shared::state::{State, FRAME_MAGIC};

use sampling::{SamplerBank, TransferBus, MONITOR_BUS_ID, SAMPLE_DEPTH, TRANSFER_BUS_ID};

const PWM_FREQ_HZ: u32 = 20_000;
const SAMPLE_PERIOD_MS: u64 = 50;
const REGULATOR_PERIOD_MS: u64 = 1;
const STATUS_PERIOD_MS: u64 = 500;
const FRAME_PERIOD_MS: u64 = 1_000;

const COMMAND_DEPTH: usize = 64;

// each channel: one producer context, one consumer context
static MONITOR_SAMPLES: Channel<Sample, SAMPLE_DEPTH> = Channel::new();
static TRANSFER_SAMPLES: Channel<Sample, SAMPLE_DEPTH> = Channel::new();
static COMMAND_BYTES: Channel<u8, COMMAND_DEPTH> = Channel::new();

// hand-off cells, one writer each: the main loop owns the applied duty,
// the regulator tick owns the commanded duty
static APPLIED_DUTY: F32Slot = F32Slot::new();
static COMMANDED_DUTY: F32Slot = F32Slot::new();
static REGULATOR_TICKS: AtomicU32 = AtomicU32::new(0);

// resources shared with interrupt context
static I2C_BUS: Mutex<RefCell<Option<I2c<'static, Blocking>>>> = Mutex::new(RefCell::new(None));
static SAMPLERS: Mutex<RefCell<Option<SamplerBank>>> = Mutex::new(RefCell::new(None));
static REGULATOR: Mutex<RefCell<Option<Pid>>> = Mutex::new(RefCell::new(None));
static CONSOLE: Mutex<RefCell<Option<Uart<'static, Blocking>>>> = Mutex::new(RefCell::new(None));
static COMMAND_TX: Mutex<RefCell<Option<Producer<'static, u8, COMMAND_DEPTH>>>> =
    Mutex::new(RefCell::new(None));
static SAMPLER_TIMER: Mutex<RefCell<Option<PeriodicTimer<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));
static REGULATOR_TIMER: Mutex<RefCell<Option<PeriodicTimer<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));

#[handler]
fn sample_tick() {
    critical_section::with(|cs| {
        if let Some(timer) = SAMPLER_TIMER.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
        let mut bank = SAMPLERS.borrow_ref_mut(cs);
        let mut i2c = I2C_BUS.borrow_ref_mut(cs);
        if let (Some(bank), Some(i2c)) = (bank.as_mut(), i2c.as_mut()) {
            bank.poll_all(i2c);
        }
    });
}

#[handler]
fn regulator_tick() {
    critical_section::with(|cs| {
        if let Some(timer) = REGULATOR_TIMER.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
        if let Some(pid) = REGULATOR.borrow_ref_mut(cs).as_mut() {
            if let Some(next) = pid.update(APPLIED_DUTY.load()) {
                COMMANDED_DUTY.store(next);
            }
            REGULATOR_TICKS.fetch_add(1, Ordering::Relaxed);
        }
    });
}

#[handler]
fn console_rx() {
    critical_section::with(|cs| {
        let mut console = CONSOLE.borrow_ref_mut(cs);
        let Some(console) = console.as_mut() else {
            return;
        };
        if let Some(tx) = COMMAND_TX.borrow_ref_mut(cs).as_mut() {
            let mut buf = [0u8; 32];
            while let Ok(n) = console.read_buffered(&mut buf) {
                if n == 0 {
                    break;
                }
                for &byte in &buf[..n] {
                    // full channel: byte dropped, the parser resyncs on the
                    // next newline
                    let _ = tx.push(byte);
                }
            }
        }
        console.clear_interrupts(UartInterrupt::RxFifoFull.into());
    });
}

#[esp_hal::main]
fn main() -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default());

    let mut status_led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());

    let (monitor_tx, mut monitor_rx) = MONITOR_SAMPLES.split().expect("monitor channel split");
    let (transfer_tx, mut transfer_rx) = TRANSFER_SAMPLES.split().expect("transfer channel split");
    let (command_tx, mut command_rx) = COMMAND_BYTES.split().expect("command channel split");

    // power monitor and display share this bus; every access goes through
    // the critical-section guard once interrupts are live
    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .expect("i2c bring-up")
    .with_sda(peripherals.GPIO6)
    .with_scl(peripherals.GPIO7);
    critical_section::with(|cs| I2C_BUS.borrow_ref_mut(cs).replace(i2c));

    let mut display = oled::Oled::new();
    critical_section::with(|cs| {
        let mut i2c = I2C_BUS.borrow_ref_mut(cs);
        let i2c = i2c.as_mut().unwrap();
        // both are setup-time failures: log once, keep the loop alive
        if display.init(i2c).is_err() {
            println!("display init failed, running headless");
        }
        if ina226::init(i2c).is_err() {
            println!("power monitor init failed, telemetry will be stale");
        }
    });

    let spi = Spi::new(
        peripherals.SPI2,
        SpiConfig::default().with_frequency(Rate::from_mhz(10)),
    )
    .expect("spi bring-up")
    .with_sck(peripherals.GPIO18)
    .with_mosi(peripherals.GPIO19)
    .with_miso(peripherals.GPIO20);
    let transfer_cs = Output::new(peripherals.GPIO21, Level::High, OutputConfig::default());

    let mut monitor = Sampler::new();
    let mut transfer = Sampler::new();
    let registered = monitor
        .add_device(DeviceDescriptor {
            bus: MONITOR_BUS_ID,
            addr: ina226::ADDRESS,
        })
        .and(transfer.add_device(DeviceDescriptor {
            bus: TRANSFER_BUS_ID,
            addr: 0,
        }));
    if registered.is_err() {
        println!("device list full, some sources not polled");
    }
    critical_section::with(|cs| {
        SAMPLERS.borrow_ref_mut(cs).replace(SamplerBank {
            monitor,
            transfer,
            transfer_bus: TransferBus {
                spi,
                cs: transfer_cs,
            },
            monitor_tx,
            transfer_tx,
        })
    });

    let mut pwm = pwm::DualPwm::new(
        peripherals.MCPWM0,
        peripherals.GPIO4,
        peripherals.GPIO5,
        PWM_FREQ_HZ,
    )
    .expect("pwm bring-up");

    critical_section::with(|cs| {
        REGULATOR
            .borrow_ref_mut(cs)
            .replace(Pid::new(PidConfig::default(), 0.0))
    });
    // nothing commanded until the regulator's first armed tick; the main
    // loop skips the sentinel
    COMMANDED_DUTY.store(f32::NAN);

    let uart_config = UartConfig::default()
        .with_baudrate(115_200)
        .with_rx(RxConfig::default().with_fifo_full_threshold(1));
    let mut console_uart = Uart::new(peripherals.UART0, uart_config)
        .expect("console bring-up")
        .with_tx(peripherals.GPIO16)
        .with_rx(peripherals.GPIO17);
    console_uart.set_interrupt_handler(console_rx);
    console_uart.listen(UartInterrupt::RxFifoFull);
    critical_section::with(|cs| {
        CONSOLE.borrow_ref_mut(cs).replace(console_uart);
        COMMAND_TX.borrow_ref_mut(cs).replace(command_tx);
    });

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut sampler_timer = PeriodicTimer::new(timg0.timer0);
    sampler_timer.set_interrupt_handler(sample_tick);
    sampler_timer.enable_interrupt(true);
    sampler_timer
        .start(Duration::from_millis(SAMPLE_PERIOD_MS))
        .expect("sampler timer");
    critical_section::with(|cs| SAMPLER_TIMER.borrow_ref_mut(cs).replace(sampler_timer));

    let timg1 = TimerGroup::new(peripherals.TIMG1);
    let mut regulator_timer = PeriodicTimer::new(timg1.timer0);
    regulator_timer.set_interrupt_handler(regulator_tick);
    regulator_timer.enable_interrupt(true);
    regulator_timer
        .start(Duration::from_millis(REGULATOR_PERIOD_MS))
        .expect("regulator timer");
    critical_section::with(|cs| REGULATOR_TIMER.borrow_ref_mut(cs).replace(regulator_timer));

    status_led.set_high();
    println!(
        "power stage up: pwm {} Hz, sampling every {} ms, regulating every {} ms",
        PWM_FREQ_HZ, SAMPLE_PERIOD_MS, REGULATOR_PERIOD_MS
    );

    let delay = Delay::new();
    let mut lines = LineBuffer::new();
    let mut latest = ina226::Reading::default();
    let mut transfer_frames: u32 = 0;
    let mut last_status = Instant::now();
    let mut last_frame = Instant::now();

    loop {
        // operator commands, one line at a time
        while let Some(byte) = command_rx.pop() {
            if let Some(line) = lines.feed(byte) {
                let seed = critical_section::with(|cs| {
                    REGULATOR
                        .borrow_ref_mut(cs)
                        .as_mut()
                        .and_then(|pid| console::apply(&line, pid, APPLIED_DUTY.load()))
                });
                if let Some(duty) = seed {
                    pwm.set_duty(duty);
                    APPLIED_DUTY.store(pwm.duty());
                }
            }
        }

        // telemetry drains
        while let Some(sample) = monitor_rx.pop() {
            if let Some(reading) = ina226::decode(&sample) {
                latest = reading;
            }
        }
        while let Some(_sample) = transfer_rx.pop() {
            transfer_frames = transfer_frames.wrapping_add(1);
        }

        // actuation hand-off: regulator tick -> output pair
        let commanded = COMMANDED_DUTY.load();
        if !commanded.is_nan() && commanded.to_bits() != APPLIED_DUTY.load().to_bits() {
            pwm.set_duty(commanded);
            APPLIED_DUTY.store(pwm.duty());
        }

        if last_status.elapsed() >= Duration::from_millis(STATUS_PERIOD_MS) {
            last_status = Instant::now();
            draw_status(&mut display, &latest, pwm.duty());
        }
        if last_frame.elapsed() >= Duration::from_millis(FRAME_PERIOD_MS) {
            last_frame = Instant::now();
            emit_frame(&latest, pwm.duty());
            if transfer_frames > 0 {
                println!("expansion port: {} frames", transfer_frames);
                transfer_frames = 0;
            }
        }

        delay.delay_millis(10);
    }
}

fn regulator_snapshot() -> (f32, f32, f32, f32) {
    critical_section::with(|cs| {
        REGULATOR
            .borrow_ref(cs)
            .as_ref()
            .map(|pid| (pid.setpoint(), pid.config.kp, pid.config.ki, pid.config.kd))
            .unwrap_or_default()
    })
}

fn draw_status(display: &mut oled::Oled, reading: &ina226::Reading, duty: f32) {
    let (setpoint, _, _, _) = regulator_snapshot();

    display.clear();
    let mut line: String<24> = String::new();
    let _ = write!(line, "SP {:5.1}% D {:5.1}%", setpoint, duty);
    display.show_string(0, 0, &line);

    line.clear();
    let _ = write!(line, "{:6.2}V {:7.1}MA", reading.bus_v, reading.current_ma);
    display.show_string(0, 2, &line);

    line.clear();
    let _ = write!(line, "{:8.1}MW", reading.power_mw);
    display.show_string(0, 4, &line);

    // one page per critical section so the regulator and sampler ticks fit
    // between the transfers
    for page in 0..oled::PAGES {
        critical_section::with(|cs| {
            if let Some(i2c) = I2C_BUS.borrow_ref_mut(cs).as_mut() {
                let _ = display.flush_page(i2c, page);
            }
        });
    }
}

fn emit_frame(reading: &ina226::Reading, duty: f32) {
    let (setpoint, kp, ki, kd) = regulator_snapshot();
    let state = State {
        tick: REGULATOR_TICKS.load(Ordering::Relaxed),
        setpoint,
        duty,
        kp,
        ki,
        kd,
        bus_v: reading.bus_v,
        shunt_mv: reading.shunt_mv,
        current_ma: reading.current_ma,
        power_mw: reading.power_mw,
    };
    esp_println::Printer::write_bytes(&FRAME_MAGIC);
    esp_println::Printer::write_bytes(state.as_bytes());
}

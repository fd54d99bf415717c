/// FTDI backend implementation using libftd2xx
///
/// This backend drives the MPSSE engine of FT232H / FT2232H / FT4232H parts
/// directly, one command buffer per chip-select window.

use std::time::Duration;
use libftd2xx::{BitMode, ClockDataIn, ClockDataOut, Ftdi, FtdiCommon, FtStatus, MpsseCmdBuilder};
use bitflags::bitflags;

use crate::enumerate::{self, list_bridges};
use crate::error::Error;
use crate::spi::session::Bridge;
use crate::target::{BridgeModel, BridgeTarget};
use super::{SpiBackend, SpiMode};

/*
Pin assignments on the MPSSE channel:
SPI_CLK:   AD0
SPI_MOSI:  AD1
SPI_MISO:  AD2
SPI_CS_N:  AD3
*/

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct SpiPin: u8 {
        const CLK =    1;          // Mask 0x01, AD0
        const MOSI =   1 << 1;     // Mask 0x02, AD1
        const MISO =   1 << 2;     // Mask 0x04, AD2
        const CS_N =   1 << 3;     // Mask 0x08, AD3
        const GPIOL0 = 1 << 4;     // Mask 0x10, AD4
        const GPIOL1 = 1 << 5;     // Mask 0x20, AD5
        const GPIOL2 = 1 << 6;     // Mask 0x40, AD6
        const GPIOL3 = 1 << 7;     // Mask 0x80, AD7
    }
}

/// MPSSE base clock of the H-series parts
const BASE_CLOCK_HZ: u32 = 60_000_000;

/// Fastest SCK: 60 MHz / 2
pub const MAX_CLOCK_HZ: u32 = BASE_CLOCK_HZ / 2;

/// Slowest SCK with divide-by-5 off: 60 MHz / (2 * 65536), rounded up
pub const MIN_CLOCK_HZ: u32 = 458;

/// Largest length a single clock_data_in command accepts
const MAX_CLOCK_BYTES: usize = 0x10000;

const USB_TRANSFER_SIZE: u32 = 0x10000;

// MPSSE setup opcodes (AN_108)
const SET_CLOCK_DIVISOR: u8 = 0x86;
const DISABLE_CLK_DIV5: u8 = 0x8A;
const DISABLE_ADAPTIVE_CLOCKING: u8 = 0x97;
const DISABLE_3PHASE_CLOCKING: u8 = 0x8D;
const DISABLE_LOOPBACK: u8 = 0x85;
const BAD_COMMAND: u8 = 0xAA;
const BAD_COMMAND_ECHO: u8 = 0xFA;

/// Divisor for a requested SCK and the rate it yields
///
/// The yielded rate never exceeds `clock_hz`.
pub fn clock_divisor(clock_hz: u32) -> Result<(u16, u32), Error> {
    if !(MIN_CLOCK_HZ..=MAX_CLOCK_HZ).contains(&clock_hz) {
        return Err(Error::Configuration(format!(
            "{clock_hz} Hz outside the MPSSE range {MIN_CLOCK_HZ}..={MAX_CLOCK_HZ} Hz"
        )));
    }
    let divisor = MAX_CLOCK_HZ.div_ceil(clock_hz) - 1;
    let actual = MAX_CLOCK_HZ / (divisor + 1);
    Ok((divisor as u16, actual))
}

/// Pin state between transactions: CS# high, SCK at its idle level
fn idle_pins(mode: SpiMode) -> SpiPin {
    if mode.cpol() {
        SpiPin::CS_N | SpiPin::CLK
    } else {
        SpiPin::CS_N
    }
}

fn data_out_edge(mode: SpiMode) -> ClockDataOut {
    if mode.cpol() == mode.cpha() {
        ClockDataOut::MsbNeg
    } else {
        ClockDataOut::MsbPos
    }
}

fn data_in_edge(mode: SpiMode) -> ClockDataIn {
    if mode.cpol() == mode.cpha() {
        ClockDataIn::MsbPos
    } else {
        ClockDataIn::MsbNeg
    }
}

/// MPSSE commands for one chip-select window
fn transfer_commands(mode: SpiMode, command: &[u8], response_len: usize) -> Vec<u8> {
    let idle = idle_pins(mode);
    let directions = FtdiBackend::pin_directions().bits();

    let mut builder = MpsseCmdBuilder::new()
        // Assert ChipSelect
        .set_gpio_lower((idle & !SpiPin::CS_N).bits(), directions);
    for part in command.chunks(MAX_CLOCK_BYTES) {
        builder = builder.clock_data_out(data_out_edge(mode), part);
    }
    let mut remaining = response_len;
    while remaining > 0 {
        let len = remaining.min(MAX_CLOCK_BYTES);
        builder = builder.clock_data_in(data_in_edge(mode), len);
        remaining -= len;
    }
    builder
        // Release ChipSelect
        .set_gpio_lower(idle.bits(), directions)
        .send_immediate()
        .as_slice()
        .to_vec()
}

fn open_error(status: FtStatus, target: &BridgeTarget) -> Error {
    match status {
        FtStatus::DEVICE_NOT_FOUND => Error::DeviceNotFound(target.to_string()),
        FtStatus::DEVICE_NOT_OPENED => Error::DeviceBusy(target.to_string()),
        other => Error::FtStatus(other),
    }
}

/// FTDI SPI Backend
pub struct FtdiBackend {
    dev: Ftdi,
    model: BridgeModel,
    mode: SpiMode,
}

impl FtdiBackend {
    /// Open the adapter channel named by `target` and switch it to MPSSE
    pub fn open(target: &BridgeTarget) -> Result<Self, Error> {
        let bridges = list_bridges()?;
        let info = enumerate::resolve(target, &bridges)?;
        let model = info.model.ok_or_else(|| {
            Error::Configuration(format!("{} is not an MPSSE capable FTDI part", info.description))
        })?;
        model.check_channel(target.channel)?;

        log::debug!("Opening D2XX device {} ({model})", info.driver_serial());
        let dev = Ftdi::with_serial_number(info.driver_serial())
            .map_err(|status| open_error(status, target))?;

        let mut backend = Self {
            dev,
            model,
            mode: SpiMode::default(),
        };
        backend.initialize()?;
        Ok(backend)
    }

    pub fn model(&self) -> BridgeModel {
        self.model
    }

    /// Get pin direction configuration (which pins are outputs)
    fn pin_directions() -> SpiPin {
        SpiPin::CLK | SpiPin::MOSI | SpiPin::CS_N
    }

    fn set_idle_pins(&mut self) -> Result<(), Error> {
        let builder = MpsseCmdBuilder::new()
            .set_gpio_lower(idle_pins(self.mode).bits(), Self::pin_directions().bits());
        self.dev.write_all(builder.as_slice())?;
        Ok(())
    }

    /// Check the command processor echoes a bad opcode (AN_135 sync)
    fn synchronize(&mut self) -> Result<(), Error> {
        self.dev.write_all(&[BAD_COMMAND])?;
        let mut echo = [0u8; 2];
        self.dev.read_all(&mut echo)?;
        if echo != [BAD_COMMAND_ECHO, BAD_COMMAND] {
            return Err(Error::Configuration(format!(
                "MPSSE did not synchronise, got {echo:02X?}"
            )));
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), Error> {
        self.dev.reset()?;
        self.dev.set_usb_parameters(USB_TRANSFER_SIZE)?;
        self.dev.set_timeouts(Duration::from_secs(1), Duration::from_secs(1))?;

        // Set latency timer
        self.dev.set_latency_timer(Duration::from_millis(2))?;

        // Set MPSSE mode
        self.dev.set_bit_mode(0x0, BitMode::Reset)?;
        self.dev.set_bit_mode(Self::pin_directions().bits(), BitMode::Mpsse)?;
        std::thread::sleep(Duration::from_millis(50));
        self.dev.purge_all()?;

        self.synchronize()?;
        self.dev.write_all(&[
            DISABLE_CLK_DIV5,
            DISABLE_ADAPTIVE_CLOCKING,
            DISABLE_3PHASE_CLOCKING,
            DISABLE_LOOPBACK,
        ])?;

        // Initial GPIO state: CS_N=HIGH, CLK low
        self.set_idle_pins()
    }
}

impl SpiBackend for FtdiBackend {
    fn configure(&mut self, clock_hz: u32, mode: SpiMode) -> Result<u32, Error> {
        let (divisor, actual) = clock_divisor(clock_hz)?;
        let [lo, hi] = divisor.to_le_bytes();
        self.dev.write_all(&[SET_CLOCK_DIVISOR, lo, hi])?;
        self.mode = mode;
        self.set_idle_pins()?;
        log::debug!("{} SCK divisor {divisor} -> {actual} Hz, {mode}", self.model);
        Ok(actual)
    }

    fn transfer(&mut self, command: &[u8], response: &mut [u8]) -> Result<(), Error> {
        let commands = transfer_commands(self.mode, command, response.len());
        self.dev.write_all(&commands)?;
        if !response.is_empty() {
            self.dev.read_all(response)?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        self.set_idle_pins()?;
        self.dev.set_bit_mode(0x0, BitMode::Reset)?;
        Ok(())
    }
}

/// Opens targets through the D2XX driver
#[derive(Debug, Default, Clone, Copy)]
pub struct FtdiBridge;

impl Bridge for FtdiBridge {
    type Backend = FtdiBackend;

    fn open(&self, target: &BridgeTarget) -> Result<FtdiBackend, Error> {
        FtdiBackend::open(target)
    }
}

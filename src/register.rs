//! PCA9685 register map and mode register bit fields.

use bitflags::bitflags;

/// Default 7-bit bus address with all hardware address pins low.
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Internal oscillator frequency.
pub const OSCILLATOR_HZ: u32 = 25_000_000;

/// Counter steps per PWM period (12-bit resolution).
pub const STEPS: u32 = 4096;

/// Lowest PWM update rate, reached with PRESCALE = 0xFF.
pub const MIN_UPDATE_RATE_HZ: u16 = 24;

/// Highest PWM update rate, reached with PRESCALE = 0x03.
pub const MAX_UPDATE_RATE_HZ: u16 = 1526;

/// Number of physical output channels.
pub const CHANNEL_COUNT: usize = 16;

/// Largest on/off count that still modulates.
pub const MAX_COUNT: u16 = 4095;

/// Bit 12 of an on/off count: the output is held at a constant level and the
/// low 12 bits are ignored.
pub const FULL: u16 = 0x1000;

/// Fixed registers. Per-channel registers are laid out from `Led0OnL` with a
/// stride of 4, see [`crate::Channel::base_addr`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Register {
    Mode1 = 0x00,
    Mode2 = 0x01,
    SubAdr1 = 0x02,
    SubAdr2 = 0x03,
    SubAdr3 = 0x04,
    AllCallAdr = 0x05,
    Led0OnL = 0x06,
    Led0OnH = 0x07,
    Led0OffL = 0x08,
    Led0OffH = 0x09,
    AllLedOnL = 0xFA,
    AllLedOnH = 0xFB,
    AllLedOffL = 0xFC,
    AllLedOffH = 0xFD,
    Prescale = 0xFE,
}

impl Register {
    pub fn addr(&self) -> u8 {
        *self as u8
    }
}

bitflags! {
    /// MODE1 register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Mode1: u8 {
        /// Respond to the LED All Call address.
        const ALLCALL = 0b0000_0001;
        const SUB3 = 0b0000_0010;
        const SUB2 = 0b0000_0100;
        const SUB1 = 0b0000_1000;
        /// Oscillator off. PRESCALE is only writable while set.
        const SLEEP = 0b0001_0000;
        /// Register auto-increment. Never set by this driver.
        const AI = 0b0010_0000;
        /// Clock from the EXTCLK pin. Never set by this driver.
        const EXTCLK = 0b0100_0000;
        /// Reads 1 when outputs were running at sleep time; writing 1 resumes them.
        const RESTART = 0b1000_0000;
    }
}

bitflags! {
    /// MODE2 register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Mode2: u8 {
        const OUTNE_0 = 0b0000_0001;
        const OUTNE_1 = 0b0000_0010;
        /// Totem pole outputs (open drain when clear).
        const OUTDRV = 0b0000_0100;
        /// Outputs change on ACK (on STOP when clear).
        const OCH = 0b0000_1000;
        const INVRT = 0b0001_0000;
    }
}

impl Mode1 {
    /// Power-on configuration written by a reset: all-call disabled, awake.
    pub const DEFAULT: Mode1 = Mode1::empty();

    /// MODE1 value for entering sleep. RESTART is written as 0 so the write
    /// itself never triggers a restart.
    pub fn asleep(self) -> Mode1 {
        (self - Mode1::RESTART) | Mode1::SLEEP
    }

    /// MODE1 value for leaving sleep, with RESTART written as 0.
    pub fn awake(self) -> Mode1 {
        self - Mode1::SLEEP - Mode1::RESTART
    }
}

#![cfg_attr(not(test), no_std)]
#![allow(clippy::inline_always)]
#![allow(clippy::must_use_candidate)]

//! Blocking driver for the NXP PCA9685 16-channel PWM/LED controller, plus a
//! presence scanner for the I2C bus it sits on.

// modules
pub mod register;
pub mod channel;
pub mod transport;
pub mod pca9685;
pub mod scanner;

#[cfg(test)]
mod testing;

pub use channel::Channel;
pub use pca9685::{Config, ConfigError, Error, Pca9685, PowerState};
pub use register::{Mode1, Mode2, Register};
pub use scanner::{BusScanner, ScanResults, ScanStatus};
pub use transport::{BusSpeed, Controller, I2cController, I2cDevice, OpenError, SharingMode, Transport};

pub use embedded_hal as hal;

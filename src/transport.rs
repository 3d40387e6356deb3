//! Claimed, address-bound access to an I2C bus.
//!
//! A [`Controller`] hands out [`Transport`] handles, each bound to one 7-bit
//! address. Claims are either exclusive or shared; an exclusive claim on an
//! address that is already held fails fast with [`OpenError::AddressInUse`].
//! The claim is released when the handle is dropped.
//!
//! [`I2cController`] provides this on top of any `embedded-hal` bus.

use core::cell::RefCell;
use core::fmt;

use embedded_hal::i2c::{self, I2c};
use log::trace;

/// Number of 7-bit addresses.
pub const ADDRESS_COUNT: usize = 128;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BusSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    #[default]
    Fast,
}

impl BusSpeed {
    pub fn hz(&self) -> u32 {
        match *self {
            BusSpeed::Standard => 100_000,
            BusSpeed::Fast => 400_000,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SharingMode {
    /// No other handle may hold the address at the same time.
    Exclusive,
    /// Other shared handles may hold the address too.
    Shared,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// The platform has no I2C bus controller.
    NoController,
    /// The address is held by a claim incompatible with the one requested.
    AddressInUse(u8),
    /// Not a 7-bit address.
    InvalidAddress(u8),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpenError::NoController => write!(f, "No I2C controller found"),
            OpenError::AddressInUse(addr) => write!(f, "Address 0x{:02X} is in use", addr),
            OpenError::InvalidAddress(addr) => write!(f, "Invalid 7-bit address 0x{:02X}", addr),
        }
    }
}

/// Blocking byte transfers against one claimed address.
pub trait Transport {
    type Error: i2c::Error;

    fn address(&self) -> u8;
    fn bus_speed(&self) -> BusSpeed;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reads into `buffer` and returns how many bytes the device supplied.
    /// Transports that cannot tell a short read from a full one return
    /// `buffer.len()`.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error>;
}

/// Claim capability of a bus controller.
pub trait Controller {
    type Transport<'a>: Transport
    where
        Self: 'a;

    fn open(
        &self,
        address: u8,
        sharing: SharingMode,
        speed: BusSpeed,
    ) -> Result<Self::Transport<'_>, OpenError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Claim {
    Free,
    Shared(usize),
    Exclusive,
}

/// Claim-tracking controller over an `embedded-hal` I2C bus.
///
/// The bus is shared through a `RefCell`, so handles must stay on the thread
/// that owns the controller.
pub struct I2cController<I2C> {
    bus: RefCell<I2C>,
    claims: RefCell<[Claim; ADDRESS_COUNT]>,
}

impl<I2C> I2cController<I2C> {
    pub fn new(bus: I2C) -> Self {
        Self {
            bus: RefCell::new(bus),
            claims: RefCell::new([Claim::Free; ADDRESS_COUNT]),
        }
    }

    /// Release the bus and consume self. Only possible once every handle is gone.
    pub fn free(self) -> I2C {
        self.bus.into_inner()
    }

    pub fn is_claimed(&self, address: u8) -> bool {
        self.claims
            .borrow()
            .get(usize::from(address))
            .map_or(false, |claim| *claim != Claim::Free)
    }

    fn release(&self, address: u8) {
        let mut claims = self.claims.borrow_mut();
        if let Some(claim) = claims.get_mut(usize::from(address)) {
            *claim = match *claim {
                Claim::Shared(n) if n > 1 => Claim::Shared(n - 1),
                _ => Claim::Free,
            };
            trace!("i2c: released 0x{:02X}", address);
        }
    }
}

impl<I2C: I2c> Controller for I2cController<I2C> {
    type Transport<'a> = I2cDevice<'a, I2C> where Self: 'a;

    fn open(
        &self,
        address: u8,
        sharing: SharingMode,
        speed: BusSpeed,
    ) -> Result<I2cDevice<'_, I2C>, OpenError> {
        let mut claims = self.claims.borrow_mut();
        let claim = claims
            .get_mut(usize::from(address))
            .ok_or(OpenError::InvalidAddress(address))?;

        *claim = match (*claim, sharing) {
            (Claim::Free, SharingMode::Exclusive) => Claim::Exclusive,
            (Claim::Free, SharingMode::Shared) => Claim::Shared(1),
            (Claim::Shared(n), SharingMode::Shared) => Claim::Shared(n + 1),
            _ => return Err(OpenError::AddressInUse(address)),
        };
        trace!("i2c: claimed 0x{:02X} ({:?}, {} Hz)", address, sharing, speed.hz());

        Ok(I2cDevice {
            controller: self,
            address,
            sharing,
            speed,
        })
    }
}

/// A claimed address on an [`I2cController`].
pub struct I2cDevice<'a, I2C> {
    controller: &'a I2cController<I2C>,
    address: u8,
    sharing: SharingMode,
    speed: BusSpeed,
}

impl<I2C> I2cDevice<'_, I2C> {
    pub fn sharing(&self) -> SharingMode {
        self.sharing
    }
}

impl<I2C: I2c> Transport for I2cDevice<'_, I2C> {
    type Error = I2C::Error;

    fn address(&self) -> u8 {
        self.address
    }

    fn bus_speed(&self) -> BusSpeed {
        self.speed
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), I2C::Error> {
        self.controller.bus.borrow_mut().write(self.address, bytes)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, I2C::Error> {
        self.controller.bus.borrow_mut().read(self.address, buffer)?;
        Ok(buffer.len())
    }

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), I2C::Error> {
        self.controller
            .bus
            .borrow_mut()
            .write_read(self.address, bytes, buffer)
    }
}

impl<I2C> Drop for I2cDevice<'_, I2C> {
    fn drop(&mut self) {
        self.controller.release(self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const NO_TRANSACTIONS: [I2cTransaction; 0] = [];

    #[test]
    fn exclusive_claim_refuses_second_claim() {
        let mut i2c = I2cMock::new(&NO_TRANSACTIONS);
        let controller = I2cController::new(i2c.clone());

        let first = controller
            .open(0x40, SharingMode::Exclusive, BusSpeed::Fast)
            .unwrap();
        assert!(controller.is_claimed(0x40));
        assert_eq!(
            controller.open(0x40, SharingMode::Exclusive, BusSpeed::Fast).err(),
            Some(OpenError::AddressInUse(0x40))
        );
        assert_eq!(
            controller.open(0x40, SharingMode::Shared, BusSpeed::Fast).err(),
            Some(OpenError::AddressInUse(0x40))
        );

        // other addresses are unaffected
        assert!(controller.open(0x41, SharingMode::Exclusive, BusSpeed::Fast).is_ok());

        drop(first);
        assert!(!controller.is_claimed(0x40));
        assert!(controller.open(0x40, SharingMode::Exclusive, BusSpeed::Fast).is_ok());

        i2c.done();
    }

    #[test]
    fn shared_claims_stack() {
        let mut i2c = I2cMock::new(&NO_TRANSACTIONS);
        let controller = I2cController::new(i2c.clone());

        let a = controller.open(0x40, SharingMode::Shared, BusSpeed::Standard).unwrap();
        let b = controller.open(0x40, SharingMode::Shared, BusSpeed::Standard).unwrap();
        assert_eq!(a.bus_speed().hz(), 100_000);
        assert_eq!(b.sharing(), SharingMode::Shared);
        assert!(controller.open(0x40, SharingMode::Exclusive, BusSpeed::Fast).is_err());

        drop(a);
        assert!(controller.is_claimed(0x40));
        assert!(controller.open(0x40, SharingMode::Exclusive, BusSpeed::Fast).is_err());
        drop(b);
        assert!(!controller.is_claimed(0x40));

        i2c.done();
    }

    #[test]
    fn rejects_ten_bit_address() {
        let mut i2c = I2cMock::new(&NO_TRANSACTIONS);
        let controller = I2cController::new(i2c.clone());
        assert_eq!(
            controller.open(0x80, SharingMode::Exclusive, BusSpeed::Fast).err(),
            Some(OpenError::InvalidAddress(0x80))
        );
        assert!(!controller.is_claimed(0x80));
        i2c.done();
    }

    #[test]
    fn device_transfers_use_claimed_address() {
        let expectations = [
            I2cTransaction::write(0x40, vec![0x00, 0x10]),
            I2cTransaction::write_read(0x40, vec![0xFE], vec![0x79]),
            I2cTransaction::read(0x40, vec![0xAB]),
            I2cTransaction::read(0x40, vec![0x00]).with_error(ErrorKind::Other),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let controller = I2cController::new(i2c.clone());

        {
            let mut dev = controller.open(0x40, SharingMode::Exclusive, BusSpeed::Fast).unwrap();
            assert_eq!(dev.address(), 0x40);
            dev.write(&[0x00, 0x10]).unwrap();

            let mut buf = [0u8; 1];
            dev.write_read(&[0xFE], &mut buf).unwrap();
            assert_eq!(buf, [0x79]);

            assert_eq!(dev.read(&mut buf).unwrap(), 1);
            assert_eq!(buf, [0xAB]);

            assert_eq!(dev.read(&mut buf), Err(ErrorKind::Other));
        }

        drop(controller);
        i2c.done();
    }
}

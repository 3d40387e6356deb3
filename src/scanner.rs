use core::fmt;

use log::{debug, info};

use crate::transport::{BusSpeed, Controller, OpenError, SharingMode, Transport, ADDRESS_COUNT};

/// What a probe found at one address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// The probe read was not acknowledged.
    NoDeviceFound,
    Responding,
    /// The probe read completed without supplying data. Only transports that
    /// report short reads produce this.
    NoResponse,
    /// Another owner holds the address.
    AlreadyInUse,
}

impl ScanStatus {
    pub fn is_present(&self) -> bool {
        *self != ScanStatus::NoDeviceFound
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanStatus::NoDeviceFound => write!(f, "No device found."),
            ScanStatus::Responding => write!(f, "Found - Responding."),
            ScanStatus::NoResponse => write!(f, "Found - No response."),
            ScanStatus::AlreadyInUse => write!(f, "Found - Already in use."),
        }
    }
}

/// One status per 7-bit address, in ascending address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResults {
    statuses: [ScanStatus; ADDRESS_COUNT],
}

impl ScanResults {
    pub fn get(&self, address: u8) -> Option<ScanStatus> {
        self.statuses.get(usize::from(address)).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, ScanStatus)> + '_ {
        // ADDRESS_COUNT entries, so every index fits in a u8
        (0..=u8::MAX).zip(self.statuses.iter().copied())
    }

    /// Addresses that answered the probe.
    pub fn responding(&self) -> impl Iterator<Item = u8> + '_ {
        self.iter()
            .filter(|(_, status)| *status == ScanStatus::Responding)
            .map(|(address, _)| address)
    }
}

impl fmt::Display for ScanResults {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (address, status) in self.iter() {
            writeln!(f, "Device: 0x{:02X} - {}", address, status)?;
        }
        Ok(())
    }
}

/// Presence scan of every 7-bit address on a bus.
///
/// Each address is claimed exclusively for the duration of its probe, so the
/// scan runs strictly one address at a time.
pub struct BusScanner<'a, C> {
    controller: &'a C,
    speed: BusSpeed,
}

impl<'a, C: Controller> BusScanner<'a, C> {
    pub fn new(controller: &'a C) -> Self {
        Self {
            controller,
            speed: BusSpeed::Fast,
        }
    }

    pub fn with_speed(mut self, speed: BusSpeed) -> Self {
        self.speed = speed;
        self
    }

    /// Classifies one address. Fails only when there is no bus controller.
    pub fn probe(&self, address: u8) -> Result<ScanStatus, OpenError> {
        let status = match self.controller.open(address, SharingMode::Exclusive, self.speed) {
            Ok(mut transport) => {
                let mut buffer = [0u8; 1];
                match transport.read(&mut buffer) {
                    Ok(0) => ScanStatus::NoResponse,
                    Ok(_) => ScanStatus::Responding,
                    Err(_) => ScanStatus::NoDeviceFound,
                }
            }
            Err(OpenError::AddressInUse(_)) => ScanStatus::AlreadyInUse,
            Err(err) => return Err(err),
        };
        debug!("scan: 0x{:02X} {}", address, status);
        Ok(status)
    }

    /// Probes addresses 0x00 through 0x7F in order.
    pub fn scan_for_devices(&self) -> Result<ScanResults, OpenError> {
        let mut statuses = [ScanStatus::NoDeviceFound; ADDRESS_COUNT];
        for (address, status) in (0..=u8::MAX).zip(statuses.iter_mut()) {
            *status = self.probe(address)?;
        }

        let results = ScanResults { statuses };
        info!(
            "scan: {} of {} addresses occupied",
            results.iter().filter(|(_, status)| status.is_present()).count(),
            results.len()
        );
        Ok(results)
    }
}

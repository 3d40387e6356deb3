//! In-memory stand-ins for the bus, the chip and the delay provider.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

use crate::register::{Mode1, Register};
use crate::transport::{BusSpeed, Controller, OpenError, SharingMode, Transport};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct ChipState {
    pub regs: [u8; 256],
    /// Every `[register, data]` write, in order.
    pub writes: Vec<(u8, u8)>,
    pub transfers: usize,
    pub responds: bool,
    pub short_reads: bool,
    pub nack_register: Option<u8>,
    pub prescale_written_awake: bool,
}

impl ChipState {
    fn new(responds: bool) -> Self {
        Self {
            regs: [0u8; 256],
            writes: Vec::new(),
            transfers: 0,
            responds,
            short_reads: false,
            nack_register: None,
            prescale_written_awake: false,
        }
    }

    fn store(&mut self, reg: u8, data: u8) {
        self.regs[usize::from(reg)] = data;
        if reg == Register::Prescale.addr()
            && !Mode1::from_bits_retain(self.regs[0]).contains(Mode1::SLEEP)
        {
            self.prescale_written_awake = true;
        }
        // ALL_LED registers load the matching register of every channel
        if (Register::AllLedOnL.addr()..=Register::AllLedOffH.addr()).contains(&reg) {
            let offset = reg - Register::AllLedOnL.addr();
            for ix in 0..16u8 {
                self.regs[usize::from(Register::Led0OnL.addr() + 4 * ix + offset)] = data;
            }
        }
    }
}

/// Register-file model of a PCA9685. Clones share the same chip.
#[derive(Clone)]
pub struct FakePca9685 {
    pub address: u8,
    pub speed: BusSpeed,
    pub state: Rc<RefCell<ChipState>>,
}

impl FakePca9685 {
    pub fn new(address: u8) -> Self {
        Self::with_state(address, ChipState::new(true))
    }

    fn with_state(address: u8, state: ChipState) -> Self {
        Self {
            address,
            speed: BusSpeed::Fast,
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn reg(&self, reg: u8) -> u8 {
        self.state.borrow().regs[usize::from(reg)]
    }

    pub fn set_reg(&self, reg: u8, data: u8) {
        self.state.borrow_mut().regs[usize::from(reg)] = data;
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.writes.clear();
        state.transfers = 0;
    }

    pub fn transfers(&self) -> usize {
        self.state.borrow().transfers
    }

    pub fn nack_on(&self, reg: u8) {
        self.state.borrow_mut().nack_register = Some(reg);
    }

    fn check(&self, reg: Option<u8>) -> Result<(), ErrorKind> {
        let mut state = self.state.borrow_mut();
        state.transfers += 1;
        if !state.responds {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        if reg.is_some() && reg == state.nack_register {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }
        Ok(())
    }
}

impl Transport for FakePca9685 {
    type Error = ErrorKind;

    fn address(&self) -> u8 {
        self.address
    }

    fn bus_speed(&self) -> BusSpeed {
        self.speed
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.check(bytes.first().copied())?;
        if let [reg, data] = *bytes {
            let mut state = self.state.borrow_mut();
            state.writes.push((reg, data));
            state.store(reg, data);
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, ErrorKind> {
        self.check(None)?;
        if self.state.borrow().short_reads {
            return Ok(0);
        }
        buffer.fill(0);
        Ok(buffer.len())
    }

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), ErrorKind> {
        let reg = bytes.first().copied().unwrap_or(0);
        self.check(Some(reg))?;
        let state = self.state.borrow();
        for (i, b) in buffer.iter_mut().enumerate() {
            *b = state.regs[usize::from(reg) + i];
        }
        Ok(())
    }
}

/// Bus controller populated with fake devices.
pub struct FakeBus {
    pub chip: FakePca9685,
    pub present: Vec<u8>,
    pub silent: Vec<u8>,
    pub held: Vec<u8>,
    pub has_controller: bool,
    pub opened: RefCell<Vec<(u8, SharingMode, BusSpeed)>>,
}

impl FakeBus {
    pub fn new(chip: FakePca9685) -> Self {
        Self {
            chip,
            present: Vec::new(),
            silent: Vec::new(),
            held: Vec::new(),
            has_controller: true,
            opened: RefCell::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(FakePca9685::with_state(0xFF, ChipState::new(false)))
    }
}

impl Controller for FakeBus {
    type Transport<'a> = FakePca9685;

    fn open(
        &self,
        address: u8,
        sharing: SharingMode,
        speed: BusSpeed,
    ) -> Result<FakePca9685, OpenError> {
        if !self.has_controller {
            return Err(OpenError::NoController);
        }
        if address > 0x7F {
            return Err(OpenError::InvalidAddress(address));
        }
        self.opened.borrow_mut().push((address, sharing, speed));
        if self.held.contains(&address) {
            return Err(OpenError::AddressInUse(address));
        }

        let mut dev = if address == self.chip.address {
            self.chip.clone()
        } else {
            let mut state = ChipState::new(self.present.contains(&address) || self.silent.contains(&address));
            state.short_reads = self.silent.contains(&address);
            FakePca9685::with_state(address, state)
        };
        dev.speed = speed;
        Ok(dev)
    }
}

/// Delay provider that only adds up how long it was asked to wait.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    pub total_ns: Rc<Cell<u64>>,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns.get() / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.set(self.total_ns.get() + u64::from(ns));
    }
}

use core::fmt;

use crate::register::{Register, CHANNEL_COUNT};

/// A PWM output, or the broadcast selector that programs all of them at once.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    C0,
    C1,
    C2,
    C3,
    C4,
    C5,
    C6,
    C7,
    C8,
    C9,
    C10,
    C11,
    C12,
    C13,
    C14,
    C15,
    /// Writes go to the ALLLED_* block and apply to every output, replacing
    /// any per-channel values. Reads return the last broadcast value.
    All,
}

impl Channel {
    /// The 16 physical outputs in register order.
    pub const OUTPUTS: [Channel; CHANNEL_COUNT] = [
        Channel::C0,
        Channel::C1,
        Channel::C2,
        Channel::C3,
        Channel::C4,
        Channel::C5,
        Channel::C6,
        Channel::C7,
        Channel::C8,
        Channel::C9,
        Channel::C10,
        Channel::C11,
        Channel::C12,
        Channel::C13,
        Channel::C14,
        Channel::C15,
    ];

    /// Output number, `None` for the broadcast selector.
    pub fn index(&self) -> Option<u8> {
        match *self {
            Channel::C0 => Some(0),
            Channel::C1 => Some(1),
            Channel::C2 => Some(2),
            Channel::C3 => Some(3),
            Channel::C4 => Some(4),
            Channel::C5 => Some(5),
            Channel::C6 => Some(6),
            Channel::C7 => Some(7),
            Channel::C8 => Some(8),
            Channel::C9 => Some(9),
            Channel::C10 => Some(10),
            Channel::C11 => Some(11),
            Channel::C12 => Some(12),
            Channel::C13 => Some(13),
            Channel::C14 => Some(14),
            Channel::C15 => Some(15),
            Channel::All => None,
        }
    }

    /// Address of the ON_L register of this channel's block. ON_H, OFF_L and
    /// OFF_H follow at +1, +2 and +3.
    pub fn base_addr(&self) -> u8 {
        match self.index() {
            Some(ix) => Register::Led0OnL.addr() + 4 * ix,
            None => Register::AllLedOnL.addr(),
        }
    }

    pub(crate) fn on_l(&self) -> u8 {
        self.base_addr()
    }

    pub(crate) fn on_h(&self) -> u8 {
        self.base_addr() + 1
    }

    pub(crate) fn off_l(&self) -> u8 {
        self.base_addr() + 2
    }

    pub(crate) fn off_h(&self) -> u8 {
        self.base_addr() + 3
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(ix: u8) -> Result<Self, Self::Error> {
        Channel::OUTPUTS.get(usize::from(ix)).copied().ok_or(ix)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.index() {
            Some(ix) => write!(f, "LED{}", ix),
            None => write!(f, "ALL_LED"),
        }
    }
}

/*!
Blocking driver for the NXP [PCA9685] 16-channel, 12-bit PWM/LED controller.

## The Device

Every output has its own 12-bit (4096 step) PWM generator. All outputs share
one update rate, programmable from 24 Hz to 1526 Hz through the PRESCALE
register, which divides the 25 MHz internal oscillator.

Each channel is described by two 13-bit counts: the step at which the output
turns on and the step at which it turns off. Bit 12 (`4096`) of either count
holds the output at a constant level and the low 12 bits are ignored.

## Usage

```ignore
use pca9685_hal::{Channel, Config, I2cController, Pca9685};

let controller = I2cController::new(i2c);
let mut pwm = Pca9685::initialize(&controller, Config::default(), delay)?;

pwm.set_pwm_update_rate(50)?;
pwm.set_duty_cycle(Channel::C0, 7.5)?;
pwm.set_full_on(Channel::C15)?;

// all outputs off, claim released
let (_device, _delay) = pwm.release()?;
```

## Sleep and restart

The oscillator must be stopped (MODE1 SLEEP set) while PRESCALE is written.
Outputs that were running when the chip went to sleep keep their registers and
are resumed by [`Pca9685::restart`] after [`Pca9685::wake`]. Writing any
channel register between `wake` and `restart` discards the pending restart on
real hardware.

[PCA9685]: https://www.nxp.com/docs/en/data-sheet/PCA9685.pdf
*/

use core::fmt::{self, Write};

use embedded_hal::delay::DelayNs;
use heapless::String;
use log::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::register::{
    Mode1, Mode2, Register, CHANNEL_COUNT, DEFAULT_ADDRESS, FULL, MAX_COUNT,
    MAX_UPDATE_RATE_HZ, MIN_UPDATE_RATE_HZ, OSCILLATOR_HZ, STEPS,
};
use crate::transport::{BusSpeed, Controller, OpenError, SharingMode, Transport};

/// SLEEP must be held for at least 5 ms before RESTART is meaningful.
const SETTLE_MS: u32 = 10;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Update rate outside 24..=1526 Hz.
    UpdateRate(u16),
    /// Duty cycle outside 0..=100 %.
    DutyCycle,
    /// On/off count above 4096.
    PwmValue(u16),
    /// Not a 7-bit address.
    Address(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::UpdateRate(hz) => write!(
                f,
                "Update rate {} Hz outside {}..={} Hz",
                hz, MIN_UPDATE_RATE_HZ, MAX_UPDATE_RATE_HZ
            ),
            ConfigError::DutyCycle => write!(f, "Duty cycle outside 0..=100 %"),
            ConfigError::PwmValue(count) => write!(f, "PWM count {} above {}", count, FULL),
            ConfigError::Address(addr) => write!(f, "Invalid 7-bit address 0x{:02X}", addr),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// Rejected before any bus traffic.
    Configuration(ConfigError),
    /// The platform has no I2C bus controller.
    TransportUnavailable,
    /// The device address is already claimed.
    AddressInUse(u8),
    /// NACK or timeout on the bus.
    Transport(E),
}

impl<E> From<OpenError> for Error<E> {
    fn from(err: OpenError) -> Self {
        match err {
            OpenError::NoController => Error::TransportUnavailable,
            OpenError::AddressInUse(addr) => Error::AddressInUse(addr),
            OpenError::InvalidAddress(addr) => Error::Configuration(ConfigError::Address(addr)),
        }
    }
}

impl<E> From<ConfigError> for Error<E> {
    fn from(err: ConfigError) -> Self {
        Error::Configuration(err)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "Configuration Error: {}", err),
            Error::TransportUnavailable => write!(f, "No I2C controller found"),
            Error::AddressInUse(addr) => write!(f, "Address 0x{:02X} is in use", addr),
            Error::Transport(err) => write!(f, "Communication Error: {:?}", err),
        }
    }
}

/// Where the chip is in its sleep/wake/restart cycle, as far as this driver
/// has driven it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PowerState {
    AwakeRunning,
    Asleep,
    /// Awake with the oscillator running, outputs waiting for a restart.
    AwakePendingRestart,
}

/// How to claim the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    pub address: u8,
    pub speed: BusSpeed,
    pub sharing: SharingMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            speed: BusSpeed::Fast,
            sharing: SharingMode::Shared,
        }
    }
}

impl Config {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_speed(mut self, speed: BusSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_sharing(mut self, sharing: SharingMode) -> Self {
        self.sharing = sharing;
        self
    }
}

/// PRESCALE value for an update rate, `None` outside 24..=1526 Hz.
///
/// `round(25 MHz / 4096 / freq) - 1`, rounding half away from zero.
pub fn prescale_for(freq_hz: u16) -> Option<u8> {
    if !(MIN_UPDATE_RATE_HZ..=MAX_UPDATE_RATE_HZ).contains(&freq_hz) {
        return None;
    }
    let steps = STEPS * u32::from(freq_hz);
    let divider = (2 * OSCILLATOR_HZ + steps) / (2 * steps);
    u8::try_from(divider - 1).ok()
}

/// Update rate in whole Hz produced by a PRESCALE value.
pub fn update_rate_for(prescale: u8) -> u32 {
    OSCILLATOR_HZ / ((u32::from(prescale) + 1) * STEPS)
}

/// Off count for a duty cycle strictly between 0 and 100 %.
///
/// The product is exact in `f64` for every `f32` input, so ties round half
/// up as intended. The value is positive, which makes `+ 0.5` and truncation
/// a round half away from zero.
fn stop_count(percent: f32) -> u16 {
    (f64::from(MAX_COUNT) * f64::from(percent) / 100.0 + 0.5) as u16
}

fn binary_string(byte: u8) -> String<8> {
    let mut s = String::new();
    // eight digits always fit
    let _ = write!(s, "{:08b}", byte);
    s
}

/// PCA9685 driver
///
/// Owns the claimed transport. Dropping the driver switches every output off
/// before the transport (and with it the claim) goes away; use
/// [`Pca9685::release`] to observe failures of that last write.
pub struct Pca9685<T: Transport, D> {
    /// `None` only once `release` has handed the transport back.
    transport: Option<T>,
    delay: Option<D>,
    address: u8,
    speed: BusSpeed,
    state: PowerState,
}

impl<T: Transport, D: DelayNs> Pca9685<T, D> {
    /// Claims `config.address` on `controller` and resets the chip.
    pub fn initialize<'a, C>(
        controller: &'a C,
        config: Config,
        delay: D,
    ) -> Result<Self, Error<T::Error>>
    where
        C: Controller<Transport<'a> = T>,
    {
        if config.address > 0x7F {
            return Err(ConfigError::Address(config.address).into());
        }

        let transport = controller.open(config.address, config.sharing, config.speed)?;
        let mut pca9685 = Pca9685::new(transport, delay);
        pca9685.init()?;

        info!(
            "pca9685: 0x{:02X} initialized ({:?}, {} Hz bus)",
            config.address,
            config.sharing,
            config.speed.hz()
        );
        Ok(pca9685)
    }

    /// Stops the oscillator. Channel registers are retained.
    pub fn sleep(&mut self) -> Result<(), Error<T::Error>> {
        let mode = self.mode1()?;
        self.write_mode1(mode.asleep())?;
        self.settle();
        self.enter(PowerState::Asleep);
        Ok(())
    }

    /// Starts the oscillator. Outputs stay frozen until [`Pca9685::restart`].
    pub fn wake(&mut self) -> Result<(), Error<T::Error>> {
        let mode = self.mode1()?;
        self.write_mode1(mode.awake())?;
        self.settle();
        if self.state == PowerState::Asleep {
            self.enter(PowerState::AwakePendingRestart);
        }
        Ok(())
    }

    /// Changes the update rate of all outputs.
    ///
    /// Runs sleep, PRESCALE write, wake and restart in sequence. If the bus
    /// fails part way the chip may be left asleep or with outputs stopped;
    /// [`Pca9685::reset_device`] brings it back to a known state.
    pub fn set_pwm_update_rate(&mut self, freq_hz: u16) -> Result<(), Error<T::Error>> {
        let prescale = prescale_for(freq_hz).ok_or(ConfigError::UpdateRate(freq_hz))?;
        info!(
            "pca9685: 0x{:02X} update rate {} Hz (prescale {})",
            self.address(),
            freq_hz,
            prescale
        );

        self.sleep()?;
        self.write_register(Register::Prescale.addr(), prescale)?;
        self.wake()?;
        self.restart()
    }

    fn settle(&mut self) {
        if let Some(delay) = self.delay.as_mut() {
            delay.delay_ms(SETTLE_MS);
        }
    }
}

impl<T: Transport, D> Pca9685<T, D> {
    /// Binds an already claimed transport. Nothing is sent to the device.
    pub fn new(transport: T, delay: D) -> Self {
        Self {
            address: transport.address(),
            speed: transport.bus_speed(),
            transport: Some(transport),
            delay: Some(delay),
            state: PowerState::AwakeRunning,
        }
    }

    /// Puts the chip in a known state, see [`Pca9685::reset_device`].
    pub fn init(&mut self) -> Result<(), Error<T::Error>> {
        self.reset_device()
    }

    /// Switches every output off and consumes self, handing back the
    /// transport and the delay provider.
    pub fn release(mut self) -> Result<(T, D), Error<T::Error>> {
        let result = self.set_full_off(Channel::All);
        let parts = self.transport.take().zip(self.delay.take());

        info!("pca9685: 0x{:02X} released", self.address);
        result?;
        parts.ok_or(Error::TransportUnavailable)
    }

    /// Outputs fully off, MODE1 back to its default. Safe at any time and the
    /// way to recover from an interrupted update rate change.
    pub fn reset_device(&mut self) -> Result<(), Error<T::Error>> {
        self.set_full_off(Channel::All)?;
        self.write_mode1(Mode1::DEFAULT)?;
        self.enter(PowerState::AwakeRunning);
        Ok(())
    }

    /// Resumes outputs retained across sleep.
    ///
    /// Only a pending restart moves the driver to `AwakeRunning`. While
    /// asleep the bit is written but the oscillator stays stopped.
    pub fn restart(&mut self) -> Result<(), Error<T::Error>> {
        let mode = self.mode1()?;
        self.write_mode1(mode | Mode1::RESTART)?;
        if self.state == PowerState::AwakePendingRestart {
            self.enter(PowerState::AwakeRunning);
        }
        Ok(())
    }

    pub fn set_all_call(&mut self, enable: bool) -> Result<(), Error<T::Error>> {
        self.set_mode1_flag(Mode1::ALLCALL, enable)
    }

    pub fn set_sub_addr1(&mut self, enable: bool) -> Result<(), Error<T::Error>> {
        self.set_mode1_flag(Mode1::SUB1, enable)
    }

    pub fn set_sub_addr2(&mut self, enable: bool) -> Result<(), Error<T::Error>> {
        self.set_mode1_flag(Mode1::SUB2, enable)
    }

    pub fn set_sub_addr3(&mut self, enable: bool) -> Result<(), Error<T::Error>> {
        self.set_mode1_flag(Mode1::SUB3, enable)
    }

    /// Sets the on and off counts of a channel.
    ///
    /// Counts are 0..=4095, or 4096 to hold the output at a constant level.
    /// `Channel::All` programs every output at once.
    pub fn set_pwm(&mut self, channel: Channel, on: u16, off: u16) -> Result<(), Error<T::Error>> {
        for count in [on, off] {
            if count > FULL {
                return Err(ConfigError::PwmValue(count).into());
            }
        }

        let [on_l, on_h] = on.to_le_bytes();
        let [off_l, off_h] = off.to_le_bytes();
        self.write_register(channel.on_l(), on_l)?;
        // the chip drops a pending restart on the first acknowledged write
        if self.state == PowerState::AwakePendingRestart {
            debug!("pca9685: {} written before restart, pending restart dropped", channel);
            self.enter(PowerState::AwakeRunning);
        }
        self.write_register(channel.on_h(), on_h)?;
        self.write_register(channel.off_l(), off_l)?;
        self.write_register(channel.off_h(), off_h)
    }

    pub fn get_pwm_on(&mut self, channel: Channel) -> Result<u16, Error<T::Error>> {
        self.read_count(channel.on_h(), channel.on_l())
    }

    pub fn get_pwm_off(&mut self, channel: Channel) -> Result<u16, Error<T::Error>> {
        self.read_count(channel.off_h(), channel.off_l())
    }

    pub fn set_full_on(&mut self, channel: Channel) -> Result<(), Error<T::Error>> {
        self.set_pwm(channel, FULL, 0)
    }

    pub fn set_full_off(&mut self, channel: Channel) -> Result<(), Error<T::Error>> {
        self.set_pwm(channel, 0, FULL)
    }

    pub fn set_full(&mut self, channel: Channel, on: bool) -> Result<(), Error<T::Error>> {
        if on {
            self.set_full_on(channel)
        } else {
            self.set_full_off(channel)
        }
    }

    /// Sets the share of each period the output is on, 0.0..=100.0 %.
    ///
    /// Every period starts on; only the off point moves. 0 % and 100 % hold the
    /// output at a constant level.
    pub fn set_duty_cycle(&mut self, channel: Channel, percent: f32) -> Result<(), Error<T::Error>> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(ConfigError::DutyCycle.into());
        }

        if percent == 0.0 {
            self.set_full_off(channel)
        } else if percent == 100.0 {
            self.set_full_on(channel)
        } else {
            self.set_pwm(channel, 0, stop_count(percent))
        }
    }

    /// Raw PRESCALE register.
    pub fn prescale(&mut self) -> Result<u8, Error<T::Error>> {
        self.read_register(Register::Prescale.addr())
    }

    /// Update rate in Hz, derived from the PRESCALE register.
    pub fn pwm_update_rate(&mut self) -> Result<u32, Error<T::Error>> {
        Ok(update_rate_for(self.prescale()?))
    }

    pub fn mode1(&mut self) -> Result<Mode1, Error<T::Error>> {
        Ok(Mode1::from_bits_retain(self.read_register(Register::Mode1.addr())?))
    }

    pub fn mode2(&mut self) -> Result<Mode2, Error<T::Error>> {
        Ok(Mode2::from_bits_retain(self.read_register(Register::Mode2.addr())?))
    }

    /// MODE1 as eight binary digits, MSB first.
    pub fn mode1_config(&mut self) -> Result<String<8>, Error<T::Error>> {
        Ok(binary_string(self.mode1()?.bits()))
    }

    /// MODE2 as eight binary digits, MSB first.
    pub fn mode2_config(&mut self) -> Result<String<8>, Error<T::Error>> {
        Ok(binary_string(self.mode2()?.bits()))
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bus_speed(&self) -> BusSpeed {
        self.speed
    }

    pub fn channel_count(&self) -> usize {
        CHANNEL_COUNT
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    fn enter(&mut self, state: PowerState) {
        if self.state != state {
            debug!("pca9685: 0x{:02X} {:?} -> {:?}", self.address(), self.state, state);
            self.state = state;
        }
    }

    fn set_mode1_flag(&mut self, flag: Mode1, enable: bool) -> Result<(), Error<T::Error>> {
        let mut mode = self.mode1()?;
        mode.set(flag, enable);
        self.write_mode1(mode)
    }

    fn write_mode1(&mut self, mode: Mode1) -> Result<(), Error<T::Error>> {
        self.write_register(Register::Mode1.addr(), mode.bits())
    }

    fn read_count(&mut self, high: u8, low: u8) -> Result<u16, Error<T::Error>> {
        let high = self.read_register(high)?;
        let low = self.read_register(low)?;
        Ok(u16::from(high) << 8 | u16::from(low))
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, Error<T::Error>> {
        let mut buffer: [u8; 1] = [0];
        self.transport()?
            .write_read(&[reg], &mut buffer)
            .map_err(Error::Transport)?;
        trace!("pca9685: read 0x{:02X} = {:#010b}", reg, buffer[0]);
        Ok(buffer[0])
    }

    fn write_register(&mut self, reg: u8, byte: u8) -> Result<(), Error<T::Error>> {
        trace!("pca9685: write 0x{:02X} = {:#010b}", reg, byte);
        self.transport()?
            .write(&[reg, byte])
            .map_err(Error::Transport)
    }

    fn transport(&mut self) -> Result<&mut T, Error<T::Error>> {
        self.transport.as_mut().ok_or(Error::TransportUnavailable)
    }
}

impl<T: Transport, D> Drop for Pca9685<T, D> {
    fn drop(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if let Err(err) = self.set_full_off(Channel::All) {
            warn!("pca9685: 0x{:02X} outputs not switched off: {}", self.address(), err);
        }
    }
}

//! Hardware access for the TinyMod4
//!
//! Two banks of switches feed the scanner: nine switches wired straight to
//! GPIO pins and sixteen behind an MCP23017 port expander on the I2C bus.
//! Both are pulled up, so a pressed switch reads low. Readings leave this
//! module inverted (active high).

use crate::config::ScannerConfig;
use rppal::gpio::{Gpio, InputPin};
use rppal::i2c::I2c;
use tracing::{debug, info};

/// Expander pull-up registers (IOCON.BANK = 0)
pub const GPPUA: u8 = 0x0c;
pub const GPPUB: u8 = 0x0d;

/// Expander port registers
pub const GPIOA: u8 = 0x12;
pub const GPIOB: u8 = 0x13;

// Scan errors
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("NKRO not selected on board")]
    NkroNotSelected,

    #[error("Failed to read keys: {0}")]
    ReadError(String),
}

/// A connected board the scanner can sample.
pub trait KeyBoard: Send {
    /// Active-high state of the directly wired switches, bit `i` = pin `i`
    fn read_direct(&mut self) -> Result<u16, ScanError>;

    /// Active-high state of the expander, port A in the low byte
    fn read_expander(&mut self) -> Result<u16, ScanError>;

    /// Whether the mode switch is set to NKRO
    fn nkro_selected(&mut self) -> Result<bool, ScanError>;
}

/// Configures the hardware and hands out a [`KeyBoard`].
///
/// Called again after every failure, so implementations must be able to set
/// the pins and bus up more than once.
pub trait BoardConnector: Send {
    fn connect(&mut self) -> Result<Box<dyn KeyBoard>, ScanError>;
}

/// Packs pin levels (`true` = high) into a bitmask and inverts it.
pub fn pack_direct(levels: &[bool]) -> u16 {
    let mask = ((1u32 << levels.len().min(16)) - 1) as u16;
    let raw = levels
        .iter()
        .take(16)
        .enumerate()
        .fold(0u16, |acc, (i, high)| acc | ((*high as u16) << i));
    raw ^ mask
}

/// Joins the two expander ports and inverts them.
pub fn pack_expander(port_a: u8, port_b: u8) -> u16 {
    (port_a as u16 | (port_b as u16) << 8) ^ 0xffff
}

/// Raspberry Pi implementation on top of rppal.
pub struct RppalBoard {
    direct: Vec<InputPin>,
    mode_select: InputPin,
    i2c: I2c,
}

impl KeyBoard for RppalBoard {
    fn read_direct(&mut self) -> Result<u16, ScanError> {
        let levels: Vec<bool> = self.direct.iter().map(|pin| pin.is_high()).collect();
        Ok(pack_direct(&levels))
    }

    fn read_expander(&mut self) -> Result<u16, ScanError> {
        let port_a = self.i2c.smbus_read_byte(GPIOA)?;
        let port_b = self.i2c.smbus_read_byte(GPIOB)?;
        Ok(pack_expander(port_a, port_b))
    }

    fn nkro_selected(&mut self) -> Result<bool, ScanError> {
        Ok(self.mode_select.is_low())
    }
}

pub struct RppalConnector {
    config: ScannerConfig,
}

impl RppalConnector {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }
}

impl BoardConnector for RppalConnector {
    fn connect(&mut self) -> Result<Box<dyn KeyBoard>, ScanError> {
        debug!("Setting up TinyMod4 pins: {:?}", self.config.direct_pins);
        let gpio = Gpio::new()?;

        let mode_select = gpio.get(self.config.mode_select_pin)?.into_input_pullup();
        let direct = self
            .config
            .direct_pins
            .iter()
            .map(|pin| Ok(gpio.get(*pin)?.into_input_pullup()))
            .collect::<Result<Vec<_>, ScanError>>()?;

        let mut i2c = I2c::with_bus(self.config.i2c_bus)?;
        i2c.set_slave_address(self.config.expander_address)?;
        // Every expander pin is an input after reset, only the pull-ups need enabling
        i2c.smbus_write_byte(GPPUA, 0xff)?;
        i2c.smbus_write_byte(GPPUB, 0xff)?;

        info!(
            "TinyMod4 hardware ready: {} direct pins, expander 0x{:02x} on bus {}",
            direct.len(),
            self.config.expander_address,
            self.config.i2c_bus
        );

        Ok(Box::new(RppalBoard {
            direct,
            mode_select,
            i2c,
        }))
    }
}

//! Runtime configuration.
//!
//! Read from the environment so that the same binary can be pointed at a
//! different transport without rebuilding:
//!
//! - `MCU_PERIPH_BACKEND`: backend to use when a request names none
//! - `MCU_PERIPH_I2C_BUSNUM`, `MCU_PERIPH_SPI_BUSNUM`: default bus numbers
//! - `MCU_PERIPH_GPIO_CHIP`: default GPIO controller
//! - `MCU_PERIPH_PIGPIOD_ADDR`, `MCU_PERIPH_PIGPIOD_PORT`: pigpio daemon
//! - `MCU_PERIPH_LOG`: log filter, see [`crate::logging::init_from`]
//!
//! Numbers are read like C's `strtol` with base 0 (`0x10`, `020` and `16`
//! are all sixteen).

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gpio::GpioParams;
use crate::i2c::I2cParams;
use crate::spi::SpiParams;
use crate::uri::{Cursor, MatchFlags};

pub const ENV_BACKEND: &str = "MCU_PERIPH_BACKEND";
pub const ENV_I2C_BUSNUM: &str = "MCU_PERIPH_I2C_BUSNUM";
pub const ENV_SPI_BUSNUM: &str = "MCU_PERIPH_SPI_BUSNUM";
pub const ENV_GPIO_CHIP: &str = "MCU_PERIPH_GPIO_CHIP";
pub const ENV_PIGPIOD_ADDR: &str = "MCU_PERIPH_PIGPIOD_ADDR";
pub const ENV_PIGPIOD_PORT: &str = "MCU_PERIPH_PIGPIOD_PORT";
pub const ENV_LOG: &str = "MCU_PERIPH_LOG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred backend for requests that name none.
    pub backend: Option<String>,
    pub i2c_busnum: Option<u32>,
    pub spi_busnum: Option<u32>,
    pub gpio_chip: Option<u32>,
    pub pigpiod_addr: Option<String>,
    pub pigpiod_port: Option<String>,
    /// `tracing` filter directives.
    pub log: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| get(key).and_then(|v| parse_number(key, &v));

        Self {
            backend: get(ENV_BACKEND),
            i2c_busnum: number(ENV_I2C_BUSNUM),
            spi_busnum: number(ENV_SPI_BUSNUM),
            gpio_chip: number(ENV_GPIO_CHIP),
            pigpiod_addr: get(ENV_PIGPIOD_ADDR),
            pigpiod_port: get(ENV_PIGPIOD_PORT),
            log: get(ENV_LOG),
        }
    }

    /// Default I2C parameters, with the configured bus number if any.
    pub fn i2c_params(&self) -> I2cParams {
        if let Some(busnum) = self.i2c_busnum {
            info!(busnum, "i2c bus number from configuration");
        }
        I2cParams { busnum: self.i2c_busnum, ..I2cParams::default() }
    }

    pub fn spi_params(&self) -> SpiParams {
        if let Some(busnum) = self.spi_busnum {
            info!(busnum, "spi bus number from configuration");
        }
        SpiParams { busnum: self.spi_busnum, ..SpiParams::default() }
    }

    pub fn gpio_params(&self) -> GpioParams {
        GpioParams { chip: self.gpio_chip, ..GpioParams::default() }
    }
}

fn parse_number(key: &str, value: &str) -> Option<u32> {
    let mut cursor = Cursor::from(value);
    let parsed = match cursor.match_integer(0, MatchFlags::empty()) {
        Ok((n, v)) if n > 0 => u32::try_from(v).ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!(key, value, "ignoring malformed number");
    }
    parsed
}

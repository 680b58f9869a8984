//! Linux kernel device interfaces.
//!
//! - I2C through `/dev/i2c-N`
//! - SPI through `/dev/spidevN.M`
//! - GPIO through sysfs (`/sys/class/gpio`)
//!
//! Accepted connection strings: none at all, `linuxdev`, or
//! `linuxdev://[/busnum]` (the authority must be empty).

mod gpio;
mod i2c;
mod spi;

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::factory::BackendDescriptor;
use crate::uri::{Cursor, MatchFlags};
use crate::{GpioChip, I2cBus, SpiBus};

pub const NAME: &str = "linuxdev";

/// Where the kernel interfaces live.
///
/// The defaults are the real locations; tests point them at a scratch
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxDev {
    /// Directory holding `i2c-N` and `spidevN.M` nodes.
    pub dev_dir: PathBuf,
    /// sysfs GPIO class directory.
    pub gpio_dir: PathBuf,
}

impl Default for LinuxDev {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            gpio_dir: PathBuf::from("/sys/class/gpio"),
        }
    }
}

impl LinuxDev {
    pub fn i2c(self) -> BackendDescriptor<I2cBus> {
        BackendDescriptor::new(NAME, move |params| i2c::create(&self, params))
    }

    pub fn spi(self) -> BackendDescriptor<SpiBus> {
        BackendDescriptor::new(NAME, move |params| spi::create(&self, params))
    }

    pub fn gpio(self) -> BackendDescriptor<GpioChip> {
        BackendDescriptor::new(NAME, move |params| gpio::create(&self, params))
    }
}

/// Validate a `linuxdev` connection string, returning the bus number from
/// its path if there is one.
fn parse_uri(uri: Option<&str>) -> Result<Option<u32>> {
    let Some(uri) = uri else {
        return Ok(None);
    };
    let mut cursor = Cursor::from(uri);
    if cursor.match_literal(NAME)? == 0 {
        return Err(Error::InvalidUri);
    }
    if cursor.match_literal("://")? > 0 && cursor.match_until("/")? > 0 {
        // No host part for local devices.
        return Err(Error::InvalidUri);
    }

    let mut busnum = None;
    if cursor.match_literal("/")? > 0 {
        let (n, value) = cursor.match_integer(10, MatchFlags::empty())?;
        if n > 0 {
            busnum = Some(u32::try_from(value).map_err(|_| Error::InvalidUri)?);
        }
    }
    if !cursor.is_at_end() {
        return Err(Error::InvalidUri);
    }
    Ok(busnum)
}

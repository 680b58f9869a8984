//! Vendor-neutral access to GPIO, I2C and SPI buses.
//!
//! Transports ("backends") register a factory per bus kind in a
//! [`Registry`]. A request either names its backend, through a connection
//! string such as `mpsse://0403:6014/` or a plain backend name, or leaves
//! the registry to probe every backend until one accepts. The bus that
//! comes back dispatches every operation to its backend through one
//! operation table per backend type.
//!
//! ```no_run
//! use mcu_periph::{Config, Platform};
//!
//! # fn main() -> mcu_periph::Result<()> {
//! let platform = Platform::initialize(Config::from_env())?;
//! let mut bus = platform.i2c_bus_create(&platform.i2c_params())?;
//! let dev = bus.open(0x39)?;
//! bus.write(dev, &[0x80, 0x03])?;
//! bus.close(dev)?;
//! bus.release()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
mod error;
mod factory;
pub mod gpio;
mod handle;
pub mod i2c;
pub mod logging;
pub mod object;
mod platform;
mod registry;
pub mod spi;
pub mod uri;

pub use config::Config;
pub use error::{Error, Result};
pub use factory::{BackendDescriptor, Bus, BusFactory, Connect};
pub use gpio::{DriveStrength, GpioChip, GpioOps, GpioParams, PinMode, PinValue};
pub use handle::{BusHandle, BusOps, BusState, DeviceHandle};
pub use i2c::{I2cBus, I2cOps, I2cParams};
pub use object::ObjectBox;
pub use platform::Platform;
pub use registry::Registry;
pub use spi::{SpiBus, SpiMode, SpiOps, SpiParams};

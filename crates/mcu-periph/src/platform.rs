use tracing::debug;

use crate::backend::mpsse::{Mpsse, MpsseConnector};
use crate::backend::pigpiod::{PigpioConnector, Pigpiod};
use crate::config::Config;
use crate::error::Result;
use crate::gpio::{GpioChip, GpioParams};
use crate::i2c::{I2cBus, I2cParams};
use crate::registry::Registry;
use crate::spi::{SpiBus, SpiParams};

/// One registry per bus kind, plus the configuration they were set up
/// from.
///
/// Build it once during start-up, register any extra backends, then share
/// it read-only with whatever creates buses.
#[derive(Debug)]
pub struct Platform {
    pub i2c: Registry<I2cBus>,
    pub spi: Registry<SpiBus>,
    pub gpio: Registry<GpioChip>,
    config: Config,
}

impl Platform {
    /// Empty registries that fall back to the configured backend.
    pub fn new(config: Config) -> Self {
        let mut platform = Self {
            i2c: Registry::new(),
            spi: Registry::new(),
            gpio: Registry::new(),
            config,
        };
        let preferred = platform.config.backend.clone();
        platform.i2c.set_preferred(preferred.clone());
        platform.spi.set_preferred(preferred.clone());
        platform.gpio.set_preferred(preferred);
        platform
    }

    /// Registries with the backends available without outside help.
    ///
    /// That is `linuxdev` on Linux. pigpiod and MPSSE need their client
    /// libraries; see [`register_pigpiod`](Self::register_pigpiod) and
    /// [`register_mpsse`](Self::register_mpsse).
    pub fn initialize(config: Config) -> Result<Self> {
        #[allow(unused_mut)]
        let mut platform = Self::new(config);

        #[cfg(target_os = "linux")]
        {
            use crate::backend::linuxdev::LinuxDev;

            platform.i2c.register(LinuxDev::default().i2c())?;
            platform.spi.register(LinuxDev::default().spi())?;
            platform.gpio.register(LinuxDev::default().gpio())?;
        }

        debug!(
            i2c = ?platform.i2c,
            spi = ?platform.spi,
            gpio = ?platform.gpio,
            "platform initialized"
        );
        Ok(platform)
    }

    /// [`initialize`](Self::initialize) with [`Config::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::initialize(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add the pigpiod I2C backend, pointed at the configured daemon.
    pub fn register_pigpiod<C>(&mut self, connector: C) -> Result<()>
    where
        C: PigpioConnector + 'static,
    {
        let backend = Pigpiod::new(connector).with_daemon(
            self.config.pigpiod_addr.clone(),
            self.config.pigpiod_port.clone(),
        );
        self.i2c.register(backend.i2c())
    }

    /// Add the MPSSE I2C backend.
    pub fn register_mpsse<C>(&mut self, connector: C) -> Result<()>
    where
        C: MpsseConnector + 'static,
    {
        self.i2c.register(Mpsse::new(connector).i2c())
    }

    /// Default I2C parameters from the configuration.
    pub fn i2c_params(&self) -> I2cParams {
        self.config.i2c_params()
    }

    pub fn spi_params(&self) -> SpiParams {
        self.config.spi_params()
    }

    pub fn gpio_params(&self) -> GpioParams {
        self.config.gpio_params()
    }

    pub fn i2c_bus_create(&self, params: &I2cParams) -> Result<I2cBus> {
        self.i2c.create_bus(params)
    }

    pub fn spi_bus_create(&self, params: &SpiParams) -> Result<SpiBus> {
        self.spi.create_bus(params)
    }

    pub fn gpio_chip_create(&self, params: &GpioParams) -> Result<GpioChip> {
        self.gpio.create_bus(params)
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::factory::{Bus, Connect};
use crate::handle::{BusHandle, BusOps, DeviceHandle};

/// Default SPI clock, 1 MHz.
pub const DEFAULT_SPEED: u32 = 1_000_000;

/// Clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Operation table an SPI backend provides.
pub trait SpiOps: BusOps {
    /// Select the device behind `chip_select`.
    fn open(&mut self, chip_select: u32) -> Result<DeviceHandle>;

    /// Full-duplex transfer. At least one buffer is present and, when both
    /// are, they have the same length. Returns bytes transferred.
    fn transfer(
        &mut self,
        dev: DeviceHandle,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
    ) -> Result<usize>;

    fn close(&mut self, dev: DeviceHandle) -> Result<()>;

    fn set_speed(&mut self, _hz: u32) -> Result<()> {
        Err(Error::InvalidObject)
    }

    fn set_mode(&mut self, _mode: SpiMode) -> Result<()> {
        Err(Error::InvalidObject)
    }
}

/// An SPI bus created by some backend.
pub type SpiBus = BusHandle<dyn SpiOps>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiParams {
    pub uri: Option<String>,
    pub backend: Option<String>,
    pub busnum: Option<u32>,
    /// Clock speed in Hz.
    pub speed: u32,
    pub mode: SpiMode,
}

impl Default for SpiParams {
    fn default() -> Self {
        Self {
            uri: None,
            backend: None,
            busnum: None,
            speed: DEFAULT_SPEED,
            mode: SpiMode::Mode0,
        }
    }
}

impl SpiParams {
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_busnum(mut self, busnum: u32) -> Self {
        self.busnum = Some(busnum);
        self
    }
}

impl Connect for SpiParams {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }
}

impl Bus for SpiBus {
    const KIND: &'static str = "spi";
    type Params = SpiParams;
}

impl BusHandle<dyn SpiOps> {
    pub fn new<T: SpiOps + 'static>(backend: &'static str, ops: T) -> Self {
        Self::from_boxed(backend, Box::new(ops))
    }

    pub fn open(&mut self, chip_select: u32) -> Result<DeviceHandle> {
        let dev = self.ops_mut()?.open(chip_select)?;
        self.device_opened();
        Ok(dev)
    }

    /// Shift `tx` out while shifting the same number of bytes into `rx`.
    pub fn transfer(
        &mut self,
        dev: DeviceHandle,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<usize> {
        if tx.len() != rx.len() {
            return Err(Error::InvalidArgument);
        }
        self.ops_mut()?.transfer(dev, Some(tx), Some(rx))
    }

    /// Clock in `buf.len()` bytes, transmitting nothing in particular.
    pub fn read(&mut self, dev: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        self.ops_mut()?.transfer(dev, None, Some(buf))
    }

    /// Clock out `data`, discarding what comes back.
    pub fn write(&mut self, dev: DeviceHandle, data: &[u8]) -> Result<usize> {
        self.ops_mut()?.transfer(dev, Some(data), None)
    }

    pub fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        let res = self.ops_mut()?.close(dev);
        self.device_closed(res)
    }

    pub fn set_speed(&mut self, hz: u32) -> Result<()> {
        self.ops_mut()?.set_speed(hz)
    }

    pub fn set_mode(&mut self, mode: SpiMode) -> Result<()> {
        self.ops_mut()?.set_mode(mode)
    }
}

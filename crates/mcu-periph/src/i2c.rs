use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::factory::{Bus, Connect};
use crate::handle::{BusHandle, BusOps, DeviceHandle};

/// Default I2C clock, 400 kHz fast mode.
pub const DEFAULT_FREQ: u32 = 400_000;

/// Operation table an I2C backend provides.
///
/// `set_freq` and `set_clock_stretch` are optional; the defaults report
/// [`Error::InvalidObject`] like a missing table entry.
pub trait I2cOps: BusOps {
    /// Start talking to the 7-bit `address`.
    fn open(&mut self, address: u16) -> Result<DeviceHandle>;

    /// Burst read; returns the number of bytes read.
    fn read(&mut self, dev: DeviceHandle, buf: &mut [u8]) -> Result<usize>;

    /// Burst write; returns the number of bytes written.
    fn write(&mut self, dev: DeviceHandle, data: &[u8]) -> Result<usize>;

    fn close(&mut self, dev: DeviceHandle) -> Result<()>;

    fn set_freq(&mut self, _hz: u32) -> Result<()> {
        Err(Error::InvalidObject)
    }

    fn set_clock_stretch(&mut self, _enable: bool) -> Result<()> {
        Err(Error::InvalidObject)
    }
}

/// An I2C bus created by some backend.
pub type I2cBus = BusHandle<dyn I2cOps>;

/// What to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2cParams {
    /// Connection string; selects the backend by scheme.
    pub uri: Option<String>,
    /// Backend name, when no URI is given.
    pub backend: Option<String>,
    /// Bus number; each backend has its own default.
    pub busnum: Option<u32>,
    /// Clock frequency in Hz.
    pub freq: u32,
}

impl Default for I2cParams {
    fn default() -> Self {
        Self { uri: None, backend: None, busnum: None, freq: DEFAULT_FREQ }
    }
}

impl I2cParams {
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

impl Connect for I2cParams {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }
}

impl Bus for I2cBus {
    const KIND: &'static str = "i2c";
    type Params = I2cParams;
}

impl BusHandle<dyn I2cOps> {
    pub fn new<T: I2cOps + 'static>(backend: &'static str, ops: T) -> Self {
        Self::from_boxed(backend, Box::new(ops))
    }

    pub fn open(&mut self, address: u16) -> Result<DeviceHandle> {
        let dev = self.ops_mut()?.open(address)?;
        self.device_opened();
        Ok(dev)
    }

    pub fn read(&mut self, dev: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        self.ops_mut()?.read(dev, buf)
    }

    pub fn write(&mut self, dev: DeviceHandle, data: &[u8]) -> Result<usize> {
        self.ops_mut()?.write(dev, data)
    }

    /// Close `dev`. The device counts as closed even if the backend
    /// reports an error tearing it down, but not if it rejects the handle.
    pub fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        let res = self.ops_mut()?.close(dev);
        self.device_closed(res)
    }

    pub fn set_freq(&mut self, hz: u32) -> Result<()> {
        self.ops_mut()?.set_freq(hz)
    }

    pub fn set_clock_stretch(&mut self, enable: bool) -> Result<()> {
        self.ops_mut()?.set_clock_stretch(enable)
    }
}

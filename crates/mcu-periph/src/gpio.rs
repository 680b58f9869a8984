use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::factory::{Bus, Connect};
use crate::handle::{BusHandle, BusOps, DeviceHandle};

/// GPIO pin value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinValue {
    Low,
    High,
}

impl From<bool> for PinValue {
    fn from(value: bool) -> Self {
        if value {
            PinValue::High
        } else {
            PinValue::Low
        }
    }
}

impl From<PinValue> for bool {
    fn from(value: PinValue) -> Self {
        matches!(value, PinValue::High)
    }
}

/// GPIO pin mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinMode {
    #[default]
    Input,
    Output,
    InputPullUp,
    InputPullDown,
}

impl PinMode {
    pub fn is_output(self) -> bool {
        matches!(self, PinMode::Output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriveStrength {
    #[default]
    Default,
    Low,
    Medium,
    High,
}

/// Operation table a GPIO backend provides.
pub trait GpioOps: BusOps {
    /// Claim `pin` and configure it.
    fn open(&mut self, pin: u32, mode: PinMode) -> Result<DeviceHandle>;

    fn read(&mut self, dev: DeviceHandle) -> Result<PinValue>;

    fn write(&mut self, dev: DeviceHandle, value: PinValue) -> Result<()>;

    fn close(&mut self, dev: DeviceHandle) -> Result<()>;

    fn set_drive_strength(
        &mut self,
        _dev: DeviceHandle,
        _drive: DriveStrength,
    ) -> Result<()> {
        Err(Error::InvalidObject)
    }
}

/// A GPIO controller created by some backend.
pub type GpioChip = BusHandle<dyn GpioOps>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioParams {
    pub uri: Option<String>,
    pub backend: Option<String>,
    /// Controller number, for platforms with several.
    pub chip: Option<u32>,
}

impl GpioParams {
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }
}

impl Connect for GpioParams {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }
}

impl Bus for GpioChip {
    const KIND: &'static str = "gpio";
    type Params = GpioParams;
}

impl BusHandle<dyn GpioOps> {
    pub fn new<T: GpioOps + 'static>(backend: &'static str, ops: T) -> Self {
        Self::from_boxed(backend, Box::new(ops))
    }

    pub fn open(&mut self, pin: u32, mode: PinMode) -> Result<DeviceHandle> {
        let dev = self.ops_mut()?.open(pin, mode)?;
        self.device_opened();
        Ok(dev)
    }

    pub fn read(&mut self, dev: DeviceHandle) -> Result<PinValue> {
        self.ops_mut()?.read(dev)
    }

    pub fn write(&mut self, dev: DeviceHandle, value: PinValue) -> Result<()> {
        self.ops_mut()?.write(dev, value)
    }

    pub fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        let res = self.ops_mut()?.close(dev);
        self.device_closed(res)
    }

    pub fn set_drive_strength(
        &mut self,
        dev: DeviceHandle,
        drive: DriveStrength,
    ) -> Result<()> {
        self.ops_mut()?.set_drive_strength(dev, drive)
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::{parse_uri, LinuxDev, NAME};
use crate::error::{Error, Result};
use crate::gpio::{GpioChip, GpioOps, GpioParams, PinMode, PinValue};
use crate::handle::{BusOps, DeviceHandle};
use crate::object::ObjectBox;

struct GpioData {
    sysfs: PathBuf,
    /// Open pins and the mode they were opened with.
    pins: HashMap<u32, PinMode>,
}

struct LinuxDevGpio {
    data: ObjectBox<GpioData>,
}

pub(super) fn create(cfg: &LinuxDev, params: &GpioParams) -> Result<GpioChip> {
    // sysfs exposes every controller through the same directory, so the
    // bus number only has to be well formed.
    parse_uri(params.uri.as_deref())?;
    if !cfg.gpio_dir.join("export").exists() {
        debug!(dir = %cfg.gpio_dir.display(), "no sysfs gpio interface");
        return Err(Error::NoDevice);
    }

    let data = ObjectBox::new(GpioData {
        sysfs: cfg.gpio_dir.clone(),
        pins: HashMap::new(),
    })?;
    Ok(GpioChip::new(NAME, LinuxDevGpio { data }))
}

impl GpioData {
    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.sysfs.join(format!("gpio{pin}"))
    }

    fn control(&self, file: &str, pin: u32) {
        if let Err(err) = fs::write(self.sysfs.join(file), pin.to_string()) {
            debug!(pin, file, %err, "sysfs write ignored");
        }
    }

    fn mode(&self, dev: DeviceHandle) -> Result<(u32, PinMode)> {
        let pin = u32::try_from(dev.raw()).map_err(|_| Error::InvalidHandle)?;
        self.pins.get(&pin).map(|mode| (pin, *mode)).ok_or(Error::InvalidHandle)
    }
}

fn write_attr(dir: &Path, attr: &str, value: &str) -> Result<()> {
    fs::write(dir.join(attr), value).map_err(|err| {
        error!(dir = %dir.display(), attr, %err, "sysfs gpio write failed");
        Error::IoError
    })
}

impl BusOps for LinuxDevGpio {
    fn release(&mut self) -> Result<()> {
        for pin in std::mem::take(&mut self.data.pins).into_keys() {
            self.data.control("unexport", pin);
        }
        Ok(())
    }
}

impl GpioOps for LinuxDevGpio {
    fn open(&mut self, pin: u32, mode: PinMode) -> Result<DeviceHandle> {
        let dev = DeviceHandle::from_raw(i32::try_from(pin).map_err(|_| Error::InvalidArgument)?);
        if self.data.pins.contains_key(&pin) {
            return Err(Error::Busy);
        }

        // Already exported pins make this fail, which is fine.
        self.data.control("export", pin);

        let direction = match mode {
            PinMode::Output => "out",
            PinMode::Input => "in",
            PinMode::InputPullUp | PinMode::InputPullDown => {
                warn!(pin, ?mode, "sysfs gpio has no pull control, using plain input");
                "in"
            }
        };
        if let Err(err) = write_attr(&self.data.pin_dir(pin), "direction", direction) {
            self.data.control("unexport", pin);
            return Err(err);
        }

        self.data.pins.insert(pin, mode);
        Ok(dev)
    }

    fn read(&mut self, dev: DeviceHandle) -> Result<PinValue> {
        let (pin, _) = self.data.mode(dev)?;
        let value = fs::read(self.data.pin_dir(pin).join("value")).map_err(|err| {
            debug!(pin, %err, "gpio read failed");
            Error::IoError
        })?;
        Ok(PinValue::from(value.first() == Some(&b'1')))
    }

    fn write(&mut self, dev: DeviceHandle, value: PinValue) -> Result<()> {
        let (pin, mode) = self.data.mode(dev)?;
        if !mode.is_output() {
            return Err(Error::InvalidArgument);
        }
        let level = if bool::from(value) { "1" } else { "0" };
        write_attr(&self.data.pin_dir(pin), "value", level)
    }

    fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        let (pin, _) = self.data.mode(dev)?;
        self.data.pins.remove(&pin);
        self.data.control("unexport", pin);
        Ok(())
    }
}

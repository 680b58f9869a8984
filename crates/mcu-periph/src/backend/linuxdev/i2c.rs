use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use nix::ioctl_write_int_bad;
use tracing::{debug, error};

use super::{parse_uri, LinuxDev, NAME};
use crate::error::{Error, Result};
use crate::handle::{BusOps, DeviceHandle};
use crate::i2c::{I2cBus, I2cOps, I2cParams};
use crate::object::ObjectBox;

ioctl_write_int_bad!(
    /// `I2C_SLAVE` from `linux/i2c-dev.h`; not `_IOC` encoded.
    i2c_set_slave,
    0x0703
);

const MAX_ADDR: u16 = 0x7f;

struct I2cData {
    busnum: u32,
    path: PathBuf,
    /// Open devices, keyed by their file descriptor.
    devices: HashMap<DeviceHandle, File>,
}

struct LinuxDevI2c {
    data: ObjectBox<I2cData>,
}

pub(super) fn create(cfg: &LinuxDev, params: &I2cParams) -> Result<I2cBus> {
    let busnum = parse_uri(params.uri.as_deref())?
        .or(params.busnum)
        .unwrap_or(0);
    let path = cfg.dev_dir.join(format!("i2c-{busnum}"));
    if !path.exists() {
        debug!(path = %path.display(), "no i2c device node");
        return Err(Error::NoDevice);
    }

    let data = ObjectBox::new(I2cData { busnum, path, devices: HashMap::new() })?;
    debug!(busnum, "linuxdev i2c bus created");
    Ok(I2cBus::new(NAME, LinuxDevI2c { data }))
}

impl LinuxDevI2c {
    fn device(&mut self, dev: DeviceHandle) -> Result<&mut File> {
        self.data.devices.get_mut(&dev).ok_or(Error::InvalidHandle)
    }
}

impl BusOps for LinuxDevI2c {
    fn release(&mut self) -> Result<()> {
        // Dropping the files closes them.
        self.data.devices.clear();
        Ok(())
    }
}

impl I2cOps for LinuxDevI2c {
    fn open(&mut self, address: u16) -> Result<DeviceHandle> {
        if address > MAX_ADDR {
            return Err(Error::InvalidArgument);
        }
        let path = &self.data.path;
        let file = File::options().read(true).write(true).open(path).map_err(
            |err| {
                error!(path = %path.display(), %err, "can't open i2c device");
                Error::NoDevice
            },
        )?;
        // SAFETY: `file` owns the descriptor for the whole call and the
        // request takes its argument by value.
        if let Err(err) = unsafe { i2c_set_slave(file.as_raw_fd(), address.into()) } {
            error!(address, %err, "ioctl I2C_SLAVE failed");
            return Err(Error::IoError);
        }

        let dev = DeviceHandle::from_raw(file.as_raw_fd());
        self.data.devices.insert(dev, file);
        Ok(dev)
    }

    fn read(&mut self, dev: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        self.device(dev)?.read(buf).map_err(|err| {
            debug!(%err, "i2c read failed");
            Error::IoError
        })
    }

    fn write(&mut self, dev: DeviceHandle, data: &[u8]) -> Result<usize> {
        self.device(dev)?.write(data).map_err(|err| {
            debug!(%err, "i2c write failed");
            Error::IoError
        })
    }

    fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        self.data.devices.remove(&dev).map(drop).ok_or(Error::InvalidHandle)
    }
}

impl core::fmt::Debug for I2cData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("I2cData")
            .field("busnum", &self.busnum)
            .field("open", &self.devices.len())
            .finish()
    }
}

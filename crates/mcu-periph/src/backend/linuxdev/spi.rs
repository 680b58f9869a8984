use std::collections::HashMap;
use std::fs::{self, File};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use nix::ioctl_write_ptr;
use tracing::{debug, error, warn};

use super::{parse_uri, LinuxDev, NAME};
use crate::error::{Error, Result};
use crate::handle::{BusOps, DeviceHandle};
use crate::object::ObjectBox;
use crate::spi::{SpiBus, SpiMode, SpiOps, SpiParams};

// From `linux/spi/spidev.h`.
const SPI_IOC_MAGIC: u8 = b'k';

ioctl_write_ptr!(spi_write_mode, SPI_IOC_MAGIC, 1, u8);
ioctl_write_ptr!(spi_write_max_speed_hz, SPI_IOC_MAGIC, 4, u32);
ioctl_write_ptr!(
    /// `SPI_IOC_MESSAGE(1)`
    spi_message_1,
    SPI_IOC_MAGIC,
    0,
    SpiIocTransfer
);

/// `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default)]
pub struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

const _: () = assert!(core::mem::size_of::<SpiIocTransfer>() == 32);

struct SpiData {
    busnum: u32,
    dev_dir: PathBuf,
    speed: u32,
    mode: SpiMode,
    devices: HashMap<DeviceHandle, File>,
}

struct LinuxDevSpi {
    data: ObjectBox<SpiData>,
}

pub(super) fn create(cfg: &LinuxDev, params: &SpiParams) -> Result<SpiBus> {
    let busnum = parse_uri(params.uri.as_deref())?
        .or(params.busnum)
        .unwrap_or(0);

    let prefix = format!("spidev{busnum}.");
    let present = fs::read_dir(&cfg.dev_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .any(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        })
        .unwrap_or(false);
    if !present {
        debug!(busnum, dir = %cfg.dev_dir.display(), "no spidev nodes");
        return Err(Error::NoDevice);
    }

    let data = ObjectBox::new(SpiData {
        busnum,
        dev_dir: cfg.dev_dir.clone(),
        speed: params.speed,
        mode: params.mode,
        devices: HashMap::new(),
    })?;
    debug!(busnum, speed = params.speed, "linuxdev spi bus created");
    Ok(SpiBus::new(NAME, LinuxDevSpi { data }))
}

fn configure(file: &File, speed: u32, mode: SpiMode) -> Result<()> {
    let fd = file.as_raw_fd();
    let bits = mode.bits();
    // SAFETY: `file` owns `fd` for the whole call and each request reads a
    // value of exactly the pointed-to type.
    unsafe { spi_write_mode(fd, &bits) }.map_err(|err| {
        error!(?mode, %err, "ioctl SPI_IOC_WR_MODE failed");
        Error::IoError
    })?;
    // SAFETY: as above.
    unsafe { spi_write_max_speed_hz(fd, &speed) }.map_err(|err| {
        error!(speed, %err, "ioctl SPI_IOC_WR_MAX_SPEED_HZ failed");
        Error::IoError
    })?;
    Ok(())
}

impl BusOps for LinuxDevSpi {
    fn release(&mut self) -> Result<()> {
        self.data.devices.clear();
        Ok(())
    }
}

impl SpiOps for LinuxDevSpi {
    fn open(&mut self, chip_select: u32) -> Result<DeviceHandle> {
        let path = self
            .data
            .dev_dir
            .join(format!("spidev{}.{chip_select}", self.data.busnum));
        let file = File::options().read(true).write(true).open(&path).map_err(
            |err| {
                error!(path = %path.display(), %err, "can't open spi device");
                Error::NoDevice
            },
        )?;
        configure(&file, self.data.speed, self.data.mode)?;

        let dev = DeviceHandle::from_raw(file.as_raw_fd());
        self.data.devices.insert(dev, file);
        Ok(dev)
    }

    fn transfer(
        &mut self,
        dev: DeviceHandle,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
    ) -> Result<usize> {
        let speed = self.data.speed;
        let file = self.data.devices.get(&dev).ok_or(Error::InvalidHandle)?;
        let len = match (&tx, &rx) {
            (Some(tx), _) => tx.len(),
            (None, Some(rx)) => rx.len(),
            (None, None) => return Err(Error::InvalidArgument),
        };
        if len == 0 {
            return Ok(0);
        }

        let xfer = SpiIocTransfer {
            tx_buf: tx.map_or(0, |tx| tx.as_ptr() as u64),
            rx_buf: rx.map_or(0, |rx| rx.as_mut_ptr() as u64),
            len: u32::try_from(len).map_err(|_| Error::InvalidArgument)?,
            speed_hz: speed,
            bits_per_word: 8,
            ..Default::default()
        };
        // SAFETY: `file` owns the descriptor; `xfer` points at buffers of
        // `len` bytes that outlive the call, and `rx` is borrowed mutably.
        let rc = unsafe { spi_message_1(file.as_raw_fd(), &xfer) }.map_err(|err| {
            debug!(%err, "spi transfer failed");
            Error::IoError
        })?;
        Ok(usize::try_from(rc).unwrap_or(0))
    }

    fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        self.data.devices.remove(&dev).map(drop).ok_or(Error::InvalidHandle)
    }

    fn set_speed(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidArgument);
        }
        self.data.speed = hz;
        let mode = self.data.mode;
        for file in self.data.devices.values() {
            configure(file, hz, mode)?;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: SpiMode) -> Result<()> {
        self.data.mode = mode;
        let speed = self.data.speed;
        for file in self.data.devices.values() {
            if let Err(err) = configure(file, speed, mode) {
                warn!(?mode, %err, "failed to apply spi mode to open device");
                return Err(err);
            }
        }
        Ok(())
    }
}

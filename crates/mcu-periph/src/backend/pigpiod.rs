//! I2C through a remote pigpio daemon.
//!
//! The daemon client itself is supplied by the application as a
//! [`PigpioConnector`]; this module only maps bus operations onto its
//! calls. Connection string: `pigpiod[://[host][:port]][/busnum]`, or none
//! at all when probing.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::factory::BackendDescriptor;
use crate::handle::{BusOps, DeviceHandle};
use crate::i2c::{I2cBus, I2cOps, I2cParams};
use crate::object::ObjectBox;
use crate::uri::{Cursor, MatchFlags, DEC_DIGITS};

pub const NAME: &str = "pigpiod";

/// Raspberry Pi's I2C pins on the pin header.
pub const DEFAULT_BUS: u32 = 1;

/// One connection to the daemon.
pub trait PigpioSession: Send {
    /// Returns the daemon's handle for the device.
    fn i2c_open(&mut self, bus: u32, address: u16, flags: u32) -> Result<u32>;

    fn i2c_read_device(&mut self, handle: u32, buf: &mut [u8]) -> Result<usize>;

    fn i2c_write_device(&mut self, handle: u32, data: &[u8]) -> Result<()>;

    fn i2c_close(&mut self, handle: u32) -> Result<()>;

    /// Disconnect. The session is not used afterwards.
    fn stop(&mut self);
}

/// Opens [`PigpioSession`]s.
pub trait PigpioConnector: Send + Sync {
    /// Connect to the daemon at `addr`/`port`; `None` means the client
    /// library's own default.
    fn connect(
        &self,
        addr: Option<&str>,
        port: Option<&str>,
    ) -> Result<Box<dyn PigpioSession>>;
}

/// Daemon location parsed from a connection string.
#[derive(Debug, Default, PartialEq, Eq)]
struct Target {
    host: Option<heapless::String<64>>,
    port: Option<heapless::String<8>>,
    busnum: Option<u32>,
}

fn parse_uri(uri: Option<&str>) -> Result<Target> {
    let mut target = Target::default();
    let Some(uri) = uri else {
        return Ok(target);
    };

    let mut cursor = Cursor::from(uri);
    if cursor.match_literal(NAME)? == 0 {
        return Err(Error::InvalidUri);
    }
    if cursor.match_literal("://")? > 0 {
        let mut host = heapless::String::new();
        let n = cursor.capture_until(":/", &mut host)?;
        if host.len() < n {
            warn!(uri, "pigpiod host name too long");
            return Err(Error::InvalidUri);
        }
        if n > 0 {
            target.host = Some(host);
        }
        if cursor.match_literal(":")? > 0 {
            let mut port = heapless::String::new();
            let n = cursor.capture_chars(DEC_DIGITS, &mut port)?;
            if n == 0 || port.len() < n {
                return Err(Error::InvalidUri);
            }
            target.port = Some(port);
        }
    }
    if cursor.match_literal("/")? > 0 {
        let (n, value) = cursor.match_integer(10, MatchFlags::empty())?;
        if n > 0 {
            target.busnum =
                Some(u32::try_from(value).map_err(|_| Error::InvalidUri)?);
        }
    }
    if !cursor.is_at_end() {
        return Err(Error::InvalidUri);
    }
    Ok(target)
}

/// pigpiod backend configuration.
#[derive(Clone)]
pub struct Pigpiod {
    connector: Arc<dyn PigpioConnector>,
    addr: Option<String>,
    port: Option<String>,
}

impl Pigpiod {
    pub fn new<C: PigpioConnector + 'static>(connector: C) -> Self {
        Self::from_shared(Arc::new(connector))
    }

    pub fn from_shared(connector: Arc<dyn PigpioConnector>) -> Self {
        Self { connector, addr: None, port: None }
    }

    /// Daemon used when the connection string names none.
    pub fn with_daemon(mut self, addr: Option<String>, port: Option<String>) -> Self {
        self.addr = addr;
        self.port = port;
        self
    }

    pub fn i2c(self) -> BackendDescriptor<I2cBus> {
        BackendDescriptor::new(NAME, move |params| self.create(params))
    }

    fn create(&self, params: &I2cParams) -> Result<I2cBus> {
        let target = parse_uri(params.uri.as_deref())?;
        let addr = target.host.as_deref().or(self.addr.as_deref());
        let port = target.port.as_deref().or(self.port.as_deref());
        let busnum = target.busnum.or(params.busnum).unwrap_or(DEFAULT_BUS);

        let mut session = self.connector.connect(addr, port).map_err(|err| {
            debug!(?addr, ?port, %err, "pigpio daemon unreachable");
            Error::NoDevice
        })?;
        let data = match ObjectBox::new(PigpioData {
            session: None,
            busnum,
            handles: BTreeSet::new(),
        }) {
            Ok(data) => data,
            Err(err) => {
                session.stop();
                return Err(err);
            }
        };

        info!(?addr, ?port, bus = busnum, "connected to pigpio daemon");
        let mut ops = PigpiodI2c { data };
        ops.data.session = Some(session);
        Ok(I2cBus::new(NAME, ops))
    }
}

impl core::fmt::Debug for Pigpiod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pigpiod")
            .field("addr", &self.addr)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

struct PigpioData {
    /// `None` once stopped.
    session: Option<Box<dyn PigpioSession>>,
    busnum: u32,
    handles: BTreeSet<u32>,
}

struct PigpiodI2c {
    data: ObjectBox<PigpioData>,
}

impl PigpiodI2c {
    fn session(&mut self) -> Result<&mut (dyn PigpioSession + 'static)> {
        self.data.session.as_deref_mut().ok_or(Error::InvalidObject)
    }

    fn handle(&self, dev: DeviceHandle) -> Result<u32> {
        u32::try_from(dev.raw())
            .ok()
            .filter(|h| self.data.handles.contains(h))
            .ok_or(Error::InvalidHandle)
    }
}

impl BusOps for PigpiodI2c {
    fn release(&mut self) -> Result<()> {
        let handles = std::mem::take(&mut self.data.handles);
        let mut session = self.data.session.take().ok_or(Error::InvalidObject)?;
        for handle in handles {
            if let Err(err) = session.i2c_close(handle) {
                debug!(handle, %err, "closing leftover pigpio handle failed");
            }
        }
        session.stop();
        Ok(())
    }
}

impl I2cOps for PigpiodI2c {
    fn open(&mut self, address: u16) -> Result<DeviceHandle> {
        let busnum = self.data.busnum;
        let handle = self.session()?.i2c_open(busnum, address, 0)?;
        let Ok(raw) = i32::try_from(handle) else {
            warn!(handle, "pigpio handle out of range");
            // Best effort; the handle is unusable either way.
            if let Err(err) = self.session()?.i2c_close(handle) {
                debug!(handle, %err, "closing out-of-range pigpio handle failed");
            }
            return Err(Error::BackendFailure);
        };
        self.data.handles.insert(handle);
        Ok(DeviceHandle::from_raw(raw))
    }

    fn read(&mut self, dev: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        let handle = self.handle(dev)?;
        self.session()?.i2c_read_device(handle, buf)
    }

    fn write(&mut self, dev: DeviceHandle, data: &[u8]) -> Result<usize> {
        let handle = self.handle(dev)?;
        self.session()?.i2c_write_device(handle, data)?;
        Ok(data.len())
    }

    fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        let handle = self.handle(dev)?;
        self.data.handles.remove(&handle);
        self.session()?.i2c_close(handle)
    }
}

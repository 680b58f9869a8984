//! I2C through an FTDI MPSSE USB adapter.
//!
//! The chip library is supplied by the application as an
//! [`MpsseConnector`]. This backend never claims a bus while probing: it
//! needs a connection string naming the adapter, `mpsse://VID:PID[/]` with
//! hexadecimal ids.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::factory::BackendDescriptor;
use crate::handle::{BusOps, DeviceHandle};
use crate::i2c::{I2cBus, I2cOps, I2cParams};
use crate::object::ObjectBox;
use crate::uri::{Cursor, HEX_DIGITS};

pub const NAME: &str = "mpsse";

const MAX_ADDR: u16 = 0x7f;

/// Which adapter to open and how to clock it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpsseRequest {
    pub vid: u16,
    pub pid: u16,
    /// I2C clock in Hz.
    pub freq: u32,
    pub msb_first: bool,
}

/// An open adapter in I2C mode.
pub trait MpsseContext: Send {
    /// Send a start condition.
    fn start(&mut self) -> Result<()>;

    /// Send a stop condition.
    fn stop(&mut self) -> Result<()>;

    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Whether the last byte written was acknowledged.
    fn get_ack(&mut self) -> bool;

    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Acknowledge bytes read from now on.
    fn send_acks(&mut self);

    /// Stop acknowledging bytes read.
    fn send_nacks(&mut self);

    fn set_clock(&mut self, hz: u32) -> Result<()>;

    fn close(&mut self);
}

/// Opens [`MpsseContext`]s.
pub trait MpsseConnector: Send + Sync {
    fn open(&self, request: &MpsseRequest) -> Result<Box<dyn MpsseContext>>;
}

/// Parse `mpsse://VID:PID[/]`.
fn parse_uri(uri: &str) -> Result<(u16, u16)> {
    let mut cursor = Cursor::from(uri);
    if cursor.match_literal(NAME)? == 0 || cursor.match_literal("://")? == 0 {
        return Err(Error::InvalidUri);
    }
    let vid = hex_id(&mut cursor)?;
    if cursor.match_literal(":")? == 0 {
        return Err(Error::InvalidUri);
    }
    let pid = hex_id(&mut cursor)?;
    cursor.match_literal("/")?;
    if !cursor.is_at_end() {
        return Err(Error::InvalidUri);
    }
    Ok((vid, pid))
}

fn hex_id(cursor: &mut Cursor<'_>) -> Result<u16> {
    let mut digits = heapless::String::<4>::new();
    let n = cursor.capture_chars(HEX_DIGITS, &mut digits)?;
    if n == 0 || n > digits.len() {
        return Err(Error::InvalidUri);
    }
    u16::from_str_radix(&digits, 16).map_err(|_| Error::InvalidUri)
}

/// MPSSE backend configuration.
#[derive(Clone)]
pub struct Mpsse {
    connector: Arc<dyn MpsseConnector>,
}

impl Mpsse {
    pub fn new<C: MpsseConnector + 'static>(connector: C) -> Self {
        Self::from_shared(Arc::new(connector))
    }

    pub fn from_shared(connector: Arc<dyn MpsseConnector>) -> Self {
        Self { connector }
    }

    pub fn i2c(self) -> BackendDescriptor<I2cBus> {
        BackendDescriptor::new(NAME, move |params| self.create(params))
    }

    fn create(&self, params: &I2cParams) -> Result<I2cBus> {
        let Some(uri) = params.uri.as_deref() else {
            debug!("mpsse needs a connection string naming the adapter");
            return Err(Error::NoDevice);
        };
        let (vid, pid) = parse_uri(uri)?;
        let request = MpsseRequest { vid, pid, freq: params.freq, msb_first: true };

        let mut context = self.connector.open(&request).map_err(|err| {
            debug!(vid, pid, %err, "can't open mpsse adapter");
            Error::BackendFailure
        })?;
        let data = match ObjectBox::new(MpsseData { context: None, clock: params.freq }) {
            Ok(data) => data,
            Err(err) => {
                context.close();
                return Err(err);
            }
        };

        info!(vid, pid, clockspeed = params.freq, "mpsse adapter opened");
        let mut ops = MpsseI2c { data };
        ops.data.context = Some(context);
        Ok(I2cBus::new(NAME, ops))
    }
}

impl core::fmt::Debug for Mpsse {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mpsse").finish_non_exhaustive()
    }
}

struct MpsseData {
    /// `None` once closed.
    context: Option<Box<dyn MpsseContext>>,
    clock: u32,
}

struct MpsseI2c {
    data: ObjectBox<MpsseData>,
}

/// The 8-bit write address doubles as the device handle.
fn wire_address(dev: DeviceHandle) -> Result<u8> {
    match u8::try_from(dev.raw()) {
        Ok(addr) if addr & 0x01 == 0 => Ok(addr),
        _ => Err(Error::InvalidHandle),
    }
}

impl MpsseI2c {
    fn context(&mut self) -> Result<&mut (dyn MpsseContext + 'static)> {
        self.data.context.as_deref_mut().ok_or(Error::InvalidObject)
    }

    /// Run `body` between a start and a stop condition. The stop is sent
    /// whatever `body` returns.
    fn framed<T>(
        &mut self,
        body: impl FnOnce(&mut dyn MpsseContext) -> Result<T>,
    ) -> Result<T> {
        let ctx = self.context()?;
        ctx.start().map_err(|_| Error::BackendFailure)?;
        let res = body(&mut *ctx);
        if let Err(err) = ctx.stop() {
            debug!(%err, "mpsse stop condition failed");
        }
        res
    }
}

fn send_address(ctx: &mut dyn MpsseContext, addr: u8) -> Result<()> {
    ctx.write(&[addr]).map_err(|_| Error::BackendFailure)?;
    if !ctx.get_ack() {
        return Err(Error::CommunicationError);
    }
    Ok(())
}

impl BusOps for MpsseI2c {
    fn release(&mut self) -> Result<()> {
        let mut ctx = self.data.context.take().ok_or(Error::InvalidObject)?;
        ctx.close();
        Ok(())
    }
}

impl I2cOps for MpsseI2c {
    fn open(&mut self, address: u16) -> Result<DeviceHandle> {
        self.context()?;
        if address > MAX_ADDR {
            return Err(Error::InvalidArgument);
        }
        Ok(DeviceHandle::from_raw(i32::from(address) << 1))
    }

    fn read(&mut self, dev: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        let addr = wire_address(dev)?;
        self.framed(|ctx| {
            send_address(ctx, addr | 0x01)?;
            let res = ctx.read(buf).map_err(|_| Error::CommunicationError);
            // NACK the final byte so the device releases the bus.
            ctx.send_nacks();
            let mut dummy = [0u8; 1];
            let _ = ctx.read(&mut dummy);
            ctx.send_acks();
            res.map(|()| buf.len())
        })
    }

    fn write(&mut self, dev: DeviceHandle, data: &[u8]) -> Result<usize> {
        let addr = wire_address(dev)?;
        self.framed(|ctx| {
            send_address(ctx, addr)?;
            if !data.is_empty() {
                ctx.write(data).map_err(|_| Error::CommunicationError)?;
                if !ctx.get_ack() {
                    return Err(Error::CommunicationError);
                }
            }
            Ok(data.len())
        })
    }

    fn close(&mut self, dev: DeviceHandle) -> Result<()> {
        wire_address(dev).map(drop)
    }

    fn set_freq(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidArgument);
        }
        self.context()?.set_clock(hz)?;
        debug!(from = self.data.clock, to = hz, "mpsse clock changed");
        self.data.clock = hz;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vid_pid() {
        assert_eq!(parse_uri("mpsse://0403:6014/"), Ok((0x0403, 0x6014)));
        assert_eq!(parse_uri("mpsse://403:6014"), Ok((0x0403, 0x6014)));
        assert_eq!(parse_uri("mpsse://0403:601A"), Ok((0x0403, 0x601a)));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(parse_uri("mpsse://"), Err(Error::InvalidUri));
        assert_eq!(parse_uri("mpsse://0403"), Err(Error::InvalidUri));
        assert_eq!(parse_uri("mpsse://04030:6014/"), Err(Error::InvalidUri));
        assert_eq!(parse_uri("mpsse://0403:6014/1"), Err(Error::InvalidUri));
        assert_eq!(parse_uri("mpsse:0403:6014"), Err(Error::InvalidUri));
    }

    #[test]
    fn handles_are_shifted_addresses() {
        assert_eq!(wire_address(DeviceHandle::from_raw(0x39 << 1)), Ok(0x72));
        assert_eq!(wire_address(DeviceHandle::from_raw(0x73)), Err(Error::InvalidHandle));
        assert_eq!(wire_address(DeviceHandle::from_raw(0x100)), Err(Error::InvalidHandle));
        assert_eq!(wire_address(DeviceHandle::from_raw(-2)), Err(Error::InvalidHandle));
    }
}

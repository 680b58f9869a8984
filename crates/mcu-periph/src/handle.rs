use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identifies one open peer on a bus.
///
/// The value is backend specific (a file descriptor, a daemon handle, an
/// encoded address) and only meaningful together with the bus that issued
/// it. Closing the device invalidates it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DeviceHandle(i32);

impl DeviceHandle {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// Lifecycle of a [`BusHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Created, no device currently open.
    Unopened,
    /// At least one device is open.
    DeviceOpen,
    /// Torn down; every operation fails with [`Error::InvalidObject`].
    Released,
}

/// Teardown shared by every backend operation table.
pub trait BusOps: Send {
    /// Disconnect from the transport. Called exactly once per bus.
    fn release(&mut self) -> Result<()>;
}

/// Polymorphic bus object: a backend's private state behind its operation
/// table, tagged with the backend's name.
///
/// Concrete kinds are [`I2cBus`](crate::I2cBus), [`SpiBus`](crate::SpiBus)
/// and [`GpioChip`](crate::GpioChip). The table is shared per backend type
/// (one vtable), never copied per instance.
///
/// Dropping a handle releases it if [`release`](Self::release) was not
/// called explicitly.
pub struct BusHandle<O: ?Sized + BusOps> {
    backend: &'static str,
    ops: Option<Box<O>>,
    open_devices: usize,
}

impl<O: ?Sized + BusOps> BusHandle<O> {
    pub(crate) fn from_boxed(backend: &'static str, ops: Box<O>) -> Self {
        Self { backend, ops: Some(ops), open_devices: 0 }
    }

    /// Name of the backend that built this bus.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn state(&self) -> BusState {
        match (&self.ops, self.open_devices) {
            (None, _) => BusState::Released,
            (Some(_), 0) => BusState::Unopened,
            (Some(_), _) => BusState::DeviceOpen,
        }
    }

    /// Number of devices opened and not yet closed.
    pub fn open_devices(&self) -> usize {
        self.open_devices
    }

    /// Tear the bus down and drop the backend state.
    ///
    /// A second call reports [`Error::InvalidObject`]. A backend error while
    /// disconnecting is reported, but the handle is released regardless.
    pub fn release(&mut self) -> Result<()> {
        let mut ops = self.ops.take().ok_or(Error::InvalidObject)?;
        self.open_devices = 0;
        let res = ops.release();
        debug!(backend = self.backend, ?res, "bus released");
        res
    }

    pub(crate) fn ops_mut(&mut self) -> Result<&mut O> {
        self.ops.as_deref_mut().ok_or(Error::InvalidObject)
    }

    pub(crate) fn device_opened(&mut self) {
        self.open_devices += 1;
    }

    /// Account for a close attempt. A handle the backend did not recognise
    /// leaves the count alone; any other outcome, teardown errors included,
    /// closes the device.
    pub(crate) fn device_closed(&mut self, res: Result<()>) -> Result<()> {
        if !matches!(res, Err(Error::InvalidHandle | Error::InvalidObject)) {
            self.open_devices = self.open_devices.saturating_sub(1);
        }
        res
    }
}

impl<O: ?Sized + BusOps> Drop for BusHandle<O> {
    fn drop(&mut self) {
        if let Some(mut ops) = self.ops.take() {
            if let Err(err) = ops.release() {
                warn!(backend = self.backend, %err, "release on drop failed");
            }
        }
    }
}

impl<O: ?Sized + BusOps> core::fmt::Debug for BusHandle<O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusHandle")
            .field("backend", &self.backend)
            .field("state", &self.state())
            .finish()
    }
}

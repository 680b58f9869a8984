//! Transport backends.
//!
//! Each backend exposes [`BackendDescriptor`](crate::BackendDescriptor)
//! constructors for the bus kinds it supports. `linuxdev` talks to kernel
//! device nodes directly; `pigpiod` and `mpsse` adapt an external client
//! library, supplied by the application through a connector trait.

#[cfg(target_os = "linux")]
pub mod linuxdev;
pub mod mpsse;
pub mod pigpiod;

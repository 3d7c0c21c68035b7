//! Remote device session runtime.
//!
//! Sits between a debugger and an external device-control library:
//!
//! - [`transport`] - the blocking entry points of the device library, behind
//!   the [`Transport`] trait
//! - [`handle`] - owned and borrowed device/session handles that release
//!   exactly once
//! - [`connection`] - a synchronous byte-stream [`Connection`] over a debug
//!   session, with a lock-free read interrupt
//! - [`tracker`] - device online/offline fan-out to keyed subscribers
//! - [`callback`] - adapter for C entry points that report through callbacks
//! - `ffi` (feature `ffi`) - [`Transport`] over the native `mix_device` library
//! - `testing` (feature `testing`) - an in-memory transport

pub mod callback;
pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod status;
pub mod tracker;
pub mod transport;

#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SessionConfig;
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use handle::{Device, DeviceRef, Session};
pub use status::{Status, Transfer};
pub use tracker::{DeviceTracker, SubscriberCallback, SubscriberKey, list_devices, open_device};
pub use transport::Transport;

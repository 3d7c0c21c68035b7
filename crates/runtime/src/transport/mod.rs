//! Boundary to the external device-control library.
//!
//! [`Transport`] lists the blocking entry points the session layer drives.
//! Raw handles are associated types that are moved into the matching
//! `release_*` method, so each handle reaches release at most once. Code
//! outside this module never calls `release_*` directly; the owning wrappers
//! in [`handle`](crate::handle) do it from `Drop`.
//!
//! # Threading contract
//!
//! - Every method may block the calling thread.
//! - `session_interrupt` must be callable while another thread is blocked in
//!   `session_read` on the same session.
//! - Apart from `session_interrupt`, callers serialize all calls that touch
//!   one session or one device (the connection lock does this).
//! - Tracker sinks are invoked on a thread owned by the transport.

use std::sync::Arc;

use devlink_protocol::{Abi, DeviceEvent, Features, Platform, ResolvedExecutable};

use crate::status::Status;

/// Timeout value meaning "block until data, EOF or interruption".
pub const INFINITE_TIMEOUT_US: u64 = u64::MAX;

/// Receives device events from a transport-owned delivery thread.
///
/// The device reference is only valid for the duration of the call.
pub type DeviceEventSink<D> = Arc<dyn Fn(DeviceEvent, &D) + Send + Sync>;

/// Blocking entry points of a device-control library.
pub trait Transport: Send + Sync + 'static {
	/// Opaque device handle. Owned by whoever holds the value.
	type Device: Send + Sync + 'static;
	/// Opaque debug-session handle.
	type Session: Send + Sync + 'static;
	/// Opaque device-tracker handle.
	type Tracker: Send + Sync + 'static;

	/// Opens the device addressed by `url` (`ios://<id>` or `android://<id>`).
	///
	/// On failure the transport's message is returned unmodified.
	fn connect_device(&self, url: &str) -> Result<Self::Device, String>;

	/// Lists currently attached devices, each as an independently owned handle.
	fn list_devices(&self) -> Vec<Self::Device>;

	/// Returns an independently owned copy of a borrowed device handle.
	fn clone_device(&self, device: &Self::Device) -> Self::Device;

	fn release_device(&self, device: Self::Device);

	fn device_uid(&self, device: &Self::Device) -> String;
	fn device_os_version(&self, device: &Self::Device) -> String;
	fn device_brand(&self, device: &Self::Device) -> String;
	fn device_name(&self, device: &Self::Device) -> String;
	fn device_model(&self, device: &Self::Device) -> String;
	fn device_platform(&self, device: &Self::Device) -> Platform;
	fn device_supports_abi(&self, device: &Self::Device, abi: Abi) -> bool;
	fn device_features(&self, device: &Self::Device) -> Features;

	/// Creates a debug session on `device`.
	///
	/// `endpoint` selects the remote debug service; an empty string picks the
	/// transport's default.
	fn create_session(&self, device: &Self::Device, endpoint: &str) -> Result<Self::Session, Status>;

	fn session_is_connected(&self, session: &Self::Session) -> bool;

	/// Reads into `buf`, waiting at most `timeout_us` microseconds
	/// ([`INFINITE_TIMEOUT_US`] waits forever).
	fn session_read(&self, session: &Self::Session, buf: &mut [u8], timeout_us: u64) -> (usize, Status);

	fn session_write(&self, session: &Self::Session, buf: &[u8]) -> (usize, Status);

	/// Disconnects the session. The handle stays valid and must still be released.
	fn session_disconnect(&self, session: &Self::Session) -> Status;

	/// Asks a blocked `session_read` to return early. Thread-safe.
	fn session_interrupt(&self, session: &Self::Session) -> bool;

	fn release_session(&self, session: Self::Session);

	/// Asks the device where the app built at `host_path` is installed.
	fn resolve_executable(&self, device: &Self::Device, host_path: &str) -> Result<ResolvedExecutable, String>;

	/// Creates a tracker that will forward events to `sink` once started.
	fn create_tracker(&self, sink: DeviceEventSink<Self::Device>) -> Self::Tracker;

	fn tracker_start(&self, tracker: &Self::Tracker);

	fn tracker_stop(&self, tracker: &Self::Tracker);

	/// Releases the tracker. No sink call is in progress or starts after this returns.
	fn release_tracker(&self, tracker: Self::Tracker);
}

/// Converts a caller timeout to the transport's microsecond resolution.
pub fn timeout_to_micros(timeout: Option<std::time::Duration>) -> u64 {
	match timeout {
		Some(duration) => u64::try_from(duration.as_micros()).unwrap_or(INFINITE_TIMEOUT_US - 1),
		None => INFINITE_TIMEOUT_US,
	}
}

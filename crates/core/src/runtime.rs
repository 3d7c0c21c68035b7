//! Process-level entry point owned by the embedding application.
//!
//! A [`DeviceRuntime`] holds the transport, the session configuration and the
//! device tracker. Create one at startup with [`DeviceRuntime::init`] and
//! drop it (or call [`shutdown`](DeviceRuntime::shutdown)) at teardown.

use std::sync::Arc;

use devlink_runtime::{Connection, Device, DeviceTracker, SessionConfig, Transport, list_devices};
use tracing::{debug, info};

use crate::error::Result;
use crate::platform::RemotePlatform;

pub struct DeviceRuntime<T: Transport> {
	transport: Arc<T>,
	config: SessionConfig,
	tracker: Option<DeviceTracker<T>>,
}

impl<T: Transport> DeviceRuntime<T> {
	/// Creates the device tracker, starting it if `config.start_tracker` is set.
	pub fn init(transport: Arc<T>, config: SessionConfig) -> Self {
		let tracker = DeviceTracker::new(Arc::clone(&transport));
		if config.start_tracker {
			tracker.start();
		}
		info!(
			target = "devlink",
			tracker_running = tracker.is_running(),
			endpoint = %config.debug_endpoint,
			"device runtime initialised"
		);
		Self {
			transport,
			config,
			tracker: Some(tracker),
		}
	}

	/// [`init`](Self::init) with configuration read from the environment.
	pub fn from_env(transport: Arc<T>) -> Result<Self> {
		let config = SessionConfig::from_env()?;
		Ok(Self::init(transport, config))
	}

	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Currently attached devices.
	pub fn devices(&self) -> Vec<Device<T>> {
		list_devices(&self.transport)
	}

	/// The device tracker, until [`shutdown`](Self::shutdown).
	pub fn tracker(&self) -> Option<&DeviceTracker<T>> {
		self.tracker.as_ref()
	}

	/// A new, unconnected connection using this runtime's configuration.
	pub fn connection(&self) -> Connection<T> {
		Connection::new(Arc::clone(&self.transport), &self.config)
	}

	/// A new remote platform using this runtime's configuration.
	pub fn platform(&self) -> RemotePlatform<T> {
		RemotePlatform::new(Arc::clone(&self.transport), &self.config)
	}

	/// Stops and releases the tracker. Later calls do nothing.
	pub fn shutdown(&mut self) {
		if let Some(tracker) = self.tracker.take() {
			debug!(target = "devlink", subscribers = tracker.subscriber_count(), "shutting down device runtime");
			drop(tracker);
		}
	}
}

impl<T: Transport> Drop for DeviceRuntime<T> {
	fn drop(&mut self) {
		self.shutdown();
	}
}

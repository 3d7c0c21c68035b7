//! Device discovery and online/offline event distribution.
//!
//! [`list_devices`] enumerates attached devices once. A [`DeviceTracker`]
//! wraps the transport's tracker handle and fans its events out to
//! subscribers keyed by [`SubscriberKey`]. Delivery happens on a thread owned
//! by the transport; subscribers may be added or removed from any thread at
//! any time, including from inside a callback.
//!
//! Callbacks receive a [`DeviceRef`] that is only valid for the call. Use
//! [`DeviceRef::promote`] to keep the device.
//!
//! A callback that removes a *different* key waits for any delivery to that
//! key in progress on another thread.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use devlink_protocol::{DeviceEvent, DeviceUrl};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handle::{Device, DeviceRef};
use crate::transport::{DeviceEventSink, Transport};

mod registry;

pub use registry::{SubscriberCallback, SubscriberKey};
use registry::SubscriberRegistry;

/// Enumerates currently attached devices as owned handles.
///
/// Each call goes to the device; avoid calling it in a tight loop and use a
/// [`DeviceTracker`] to follow changes instead.
pub fn list_devices<T: Transport>(transport: &Arc<T>) -> Vec<Device<T>> {
	let devices: Vec<_> = transport
		.list_devices()
		.into_iter()
		.map(|raw| Device::from_raw(Arc::clone(transport), raw))
		.collect();
	debug!(target = "devlink", count = devices.len(), "listed devices");
	devices
}

/// Opens the device addressed by `url` (`ios://<id>` or `android://<id>`).
///
/// Only the scheme and host are passed to the transport. A transport
/// failure is returned as [`Error::Transport`] with its message unmodified.
pub fn open_device<T: Transport>(transport: &Arc<T>, url: &str) -> Result<Device<T>> {
	let parsed = DeviceUrl::parse(url)?;
	debug!(target = "devlink", url = %parsed, "opening device");
	let raw = transport
		.connect_device(&parsed.to_string())
		.map_err(Error::Transport)?;
	Ok(Device::from_raw(Arc::clone(transport), raw))
}

/// Distributes device events to keyed subscribers.
pub struct DeviceTracker<T: Transport> {
	transport: Arc<T>,
	raw: ManuallyDrop<T::Tracker>,
	registry: Arc<SubscriberRegistry<T>>,
	running: AtomicBool,
}

impl<T: Transport> DeviceTracker<T> {
	/// Creates a stopped tracker.
	pub fn new(transport: Arc<T>) -> Self {
		let registry = Arc::new(SubscriberRegistry::new());

		// The sink lives inside the transport, so it must not own it.
		let sink_registry: Weak<SubscriberRegistry<T>> = Arc::downgrade(&registry);
		let sink_transport: Weak<T> = Arc::downgrade(&transport);
		let sink: DeviceEventSink<T::Device> = Arc::new(move |event: DeviceEvent, raw: &T::Device| {
			let (Some(registry), Some(transport)) = (sink_registry.upgrade(), sink_transport.upgrade())
			else {
				return;
			};
			let delivered = registry.dispatch(event, DeviceRef::new(&transport, raw));
			trace!(target = "devlink", ?event, delivered, "device event dispatched");
		});

		let raw = transport.create_tracker(sink);
		Self {
			transport,
			raw: ManuallyDrop::new(raw),
			registry,
			running: AtomicBool::new(false),
		}
	}

	/// Begins event delivery. Calling it again while running does nothing.
	pub fn start(&self) {
		if !self.running.swap(true, Ordering::SeqCst) {
			self.transport.tracker_start(&self.raw);
			debug!(target = "devlink", "device tracker started");
		}
	}

	/// Ends event delivery.
	pub fn stop(&self) {
		if self.running.swap(false, Ordering::SeqCst) {
			self.transport.tracker_stop(&self.raw);
			debug!(target = "devlink", "device tracker stopped");
		}
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Registers `callback` under `key`, replacing any existing subscriber
	/// with that key. Returns `true` if one was replaced.
	pub fn add_subscriber<F>(&self, key: SubscriberKey, callback: F) -> bool
	where
		F: Fn(DeviceEvent, DeviceRef<'_, T>, SubscriberKey) + Send + Sync + 'static,
	{
		let replaced = self.registry.insert(key, Box::new(callback));
		trace!(target = "devlink", %key, replaced, "subscriber added");
		replaced
	}

	/// Removes the subscriber under `key`.
	///
	/// Once this returns, that subscriber is not running and will not be
	/// called again. Safe to call from inside the subscriber's own callback.
	pub fn remove_subscriber(&self, key: SubscriberKey) -> bool {
		let removed = self.registry.remove(key);
		trace!(target = "devlink", %key, removed, "subscriber removed");
		removed
	}

	pub fn subscriber_count(&self) -> usize {
		self.registry.len()
	}
}

impl<T: Transport> Drop for DeviceTracker<T> {
	fn drop(&mut self) {
		self.stop();
		// SAFETY: `raw` is never touched again after this take.
		let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
		self.transport.release_tracker(raw);
		trace!(target = "devlink", "device tracker released");
	}
}

#[cfg(test)]
mod tests;

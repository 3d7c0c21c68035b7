//! Owning and borrowed wrappers around transport handles.
//!
//! - [`Device`] owns a device handle and releases it on drop.
//! - [`DeviceRef`] borrows one without owning it; it can be [`promote`]d
//!   into a [`Device`] through the transport's heap-copy call.
//! - [`Session`] owns a debug-session handle and releases it on drop.
//!
//! None of the wrappers implement `Clone`, and the raw handle only leaves a
//! wrapper by value inside `Drop`, so a handle is released exactly once.
//!
//! [`promote`]: DeviceRef::promote

use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use devlink_protocol::{Abi, DeviceInfo, Features, Platform};

use crate::transport::Transport;

/// An owned device handle.
pub struct Device<T: Transport> {
	transport: Arc<T>,
	raw: ManuallyDrop<T::Device>,
}

impl<T: Transport> Device<T> {
	/// Takes ownership of a raw handle produced by `transport`.
	pub fn from_raw(transport: Arc<T>, raw: T::Device) -> Self {
		Self {
			transport,
			raw: ManuallyDrop::new(raw),
		}
	}

	/// Borrows the device.
	pub fn view(&self) -> DeviceRef<'_, T> {
		DeviceRef {
			transport: &self.transport,
			raw: &self.raw,
		}
	}

	/// Returns an independently owned copy of this device.
	pub fn duplicate(&self) -> Self {
		self.view().promote()
	}

	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	pub(crate) fn raw(&self) -> &T::Device {
		&self.raw
	}
}

impl<T: Transport> Drop for Device<T> {
	fn drop(&mut self) {
		// SAFETY: `raw` is never touched again after this take.
		let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
		tracing::trace!(target = "devlink", "releasing device handle");
		self.transport.release_device(raw);
	}
}

impl<T: Transport> fmt::Debug for Device<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Device").finish_non_exhaustive()
	}
}

/// A borrowed device handle.
///
/// Valid only for the borrow's lifetime; tracker callbacks receive this type
/// and must [`promote`](Self::promote) it to keep the device.
pub struct DeviceRef<'a, T: Transport> {
	transport: &'a Arc<T>,
	raw: &'a T::Device,
}

impl<T: Transport> Clone for DeviceRef<'_, T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T: Transport> Copy for DeviceRef<'_, T> {}

impl<'a, T: Transport> DeviceRef<'a, T> {
	/// Borrows a raw handle owned elsewhere.
	pub fn new(transport: &'a Arc<T>, raw: &'a T::Device) -> Self {
		Self { transport, raw }
	}

	/// Copies the device into an owned, heap-durable handle.
	pub fn promote(&self) -> Device<T> {
		let raw = self.transport.clone_device(self.raw);
		Device::from_raw(Arc::clone(self.transport), raw)
	}

	pub fn uid(&self) -> String {
		self.transport.device_uid(self.raw)
	}

	pub fn os_version(&self) -> String {
		self.transport.device_os_version(self.raw)
	}

	pub fn brand(&self) -> String {
		self.transport.device_brand(self.raw)
	}

	/// User-visible device name.
	pub fn name(&self) -> String {
		self.transport.device_name(self.raw)
	}

	pub fn model(&self) -> String {
		self.transport.device_model(self.raw)
	}

	pub fn platform(&self) -> Platform {
		self.transport.device_platform(self.raw)
	}

	pub fn supports_abi(&self, abi: Abi) -> bool {
		self.transport.device_supports_abi(self.raw, abi)
	}

	/// Queries every known ABI bit and returns the supported set.
	pub fn abis(&self) -> Abi {
		Abi::all()
			.iter()
			.filter(|abi| self.supports_abi(*abi))
			.fold(Abi::empty(), |acc, abi| acc | abi)
	}

	pub fn features(&self) -> Features {
		self.transport.device_features(self.raw)
	}

	/// Fetches all attributes in one snapshot.
	pub fn info(&self) -> DeviceInfo {
		DeviceInfo {
			uid: self.uid(),
			os_version: self.os_version(),
			brand: self.brand(),
			name: self.name(),
			model: self.model(),
			platform: self.platform(),
			abis: self.abis(),
			features: self.features(),
		}
	}

	pub fn transport(&self) -> &'a Arc<T> {
		self.transport
	}

	pub fn raw(&self) -> &'a T::Device {
		self.raw
	}
}

impl<T: Transport> fmt::Debug for DeviceRef<'_, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeviceRef").finish_non_exhaustive()
	}
}

/// An owned debug-session handle.
pub struct Session<T: Transport> {
	transport: Arc<T>,
	raw: ManuallyDrop<T::Session>,
}

impl<T: Transport> Session<T> {
	pub(crate) fn from_raw(transport: Arc<T>, raw: T::Session) -> Self {
		Self {
			transport,
			raw: ManuallyDrop::new(raw),
		}
	}

	pub(crate) fn raw(&self) -> &T::Session {
		&self.raw
	}
}

impl<T: Transport> Drop for Session<T> {
	fn drop(&mut self) {
		// SAFETY: `raw` is never touched again after this take.
		let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
		tracing::trace!(target = "devlink", "releasing session handle");
		self.transport.release_session(raw);
	}
}

impl<T: Transport> fmt::Debug for Session<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session").finish_non_exhaustive()
	}
}

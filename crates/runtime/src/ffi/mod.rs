//! [`Transport`] implementation over the native `mix_device` library.
//!
//! Enabled with the `ffi` feature. Every handle type wraps a non-null pointer
//! owned by the library; the library documents its entry points as
//! thread-safe, so the wrappers are `Send` and `Sync`.

use std::alloc::{Layout, handle_alloc_error};
use std::ffi::{CString, c_char, c_void};
use std::mem;
use std::ptr::{self, NonNull};

use devlink_protocol::{Abi, DeviceEvent, Features, Platform, ResolvedExecutable};
use tracing::warn;

use crate::callback::{
	CallbackSlot, ResolveOutcome, c_message, guard, no_status, on_error, on_resolve_error, on_resolved,
	with_status,
};
use crate::status::Status;
use crate::transport::{DeviceEventSink, Transport};

pub mod sys;

/// Device handle owned by the native library.
#[derive(Debug)]
pub struct FfiDevice(NonNull<sys::mix_device_t>);

/// LLDB connection handle owned by the native library.
#[derive(Debug)]
pub struct FfiSession(NonNull<sys::mix_lldb_debugger>);

/// Device tracker plus the boxed sink registered as its subscriber.
#[derive(Debug)]
pub struct FfiTracker {
	raw: Option<NonNull<sys::mix_device_tracker_t>>,
	sink: *mut DeviceEventSink<FfiDevice>,
}

// SAFETY: the library's handles may be used from any thread; per-handle
// serialization is provided by the connection lock.
unsafe impl Send for FfiDevice {}
// SAFETY: see above.
unsafe impl Sync for FfiDevice {}
// SAFETY: see above; interrupt is documented as callable concurrently with read.
unsafe impl Send for FfiSession {}
// SAFETY: see above.
unsafe impl Sync for FfiSession {}
// SAFETY: the sink is `Send + Sync`; the tracker pointer is library-owned.
unsafe impl Send for FfiTracker {}
// SAFETY: see above.
unsafe impl Sync for FfiTracker {}

/// Native device-control library.
#[derive(Debug, Default)]
pub struct FfiTransport {
	_private: (),
}

impl FfiTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Version string reported by the library.
	pub fn version(&self) -> String {
		// SAFETY: returns a static NUL-terminated string or null.
		unsafe { c_message(sys::mix_version()) }.unwrap_or_default()
	}
}

/// Copies and frees a library-allocated string.
///
/// # Safety
///
/// `ptr` must be null or a string allocated by the library and not yet freed.
unsafe fn take_string(ptr: *mut c_char) -> String {
	if ptr.is_null() {
		return String::new();
	}
	// SAFETY: non-null library string.
	let text = unsafe { c_message(ptr) }.unwrap_or_default();
	// SAFETY: allocated by the library; freed exactly once here.
	unsafe { sys::mix_free_string(ptr) };
	text
}

fn features_from(raw: &sys::mix_features) -> Features {
	let bits = raw
		.as_array()
		.iter()
		.enumerate()
		.filter(|(_, flag)| **flag != 0)
		.fold(0u32, |acc, (bit, _)| acc | (1 << bit));
	Features::from_bits_truncate(bits)
}

unsafe extern "C" fn on_device_event(event: u32, device: *mut sys::mix_device_t, ctx: *mut c_void) {
	guard(|| {
		let (Some(device), false) = (NonNull::new(device), ctx.is_null()) else {
			return;
		};
		// SAFETY: `ctx` is the boxed sink registered in `create_tracker`, kept
		// alive until the subscriber is removed.
		let sink = unsafe { &*ctx.cast::<DeviceEventSink<FfiDevice>>() };
		// Stack-allocated by the library; never released from here.
		let transient = mem::ManuallyDrop::new(FfiDevice(device));
		sink(DeviceEvent::from_raw(event), &*transient);
	});
}

impl Transport for FfiTransport {
	type Device = FfiDevice;
	type Session = FfiSession;
	type Tracker = FfiTracker;

	fn connect_device(&self, url: &str) -> Result<FfiDevice, String> {
		let url = CString::new(url).map_err(|_| format!("device URL contains NUL: {url:?}"))?;
		let mut out: *mut sys::mix_device_t = ptr::null_mut();
		let mut slot = CallbackSlot::<String>::new();

		// SAFETY: connect reports through the error callback before returning.
		unsafe { sys::mix_connect_device(url.as_ptr(), &mut out, on_error, slot.context()) };

		match (NonNull::new(out), slot.take()) {
			(Some(device), None) => Ok(FfiDevice(device)),
			(Some(device), Some(message)) => {
				// SAFETY: the library handed us ownership of `out`.
				unsafe { sys::mix_release_device(device.as_ptr()) };
				Err(message)
			}
			(None, message) => Err(message.unwrap_or_else(|| "device connect failed".to_string())),
		}
	}

	fn list_devices(&self) -> Vec<FfiDevice> {
		let mut list: *mut sys::mix_devices_t = ptr::null_mut();
		// SAFETY: out-pointer is valid for writes.
		unsafe { sys::mix_list_devices(&mut list) };
		if list.is_null() {
			return Vec::new();
		}

		// SAFETY: `list` is live until released below; entries are copied to
		// the heap before that.
		let devices = unsafe {
			(0..sys::mix_devices_count(list))
				.filter_map(|i| NonNull::new(sys::mix_device_at(list, i)))
				.filter_map(|d| NonNull::new(sys::mix_device_clone_to_heap(d.as_ptr())))
				.map(FfiDevice)
				.collect()
		};
		// SAFETY: released exactly once.
		unsafe { sys::mix_release_devices(list) };
		devices
	}

	fn clone_device(&self, device: &FfiDevice) -> FfiDevice {
		// SAFETY: `device` is live for the borrow.
		let copy = unsafe { sys::mix_device_clone_to_heap(device.0.as_ptr()) };
		match NonNull::new(copy) {
			Some(copy) => FfiDevice(copy),
			None => handle_alloc_error(Layout::new::<usize>()),
		}
	}

	fn release_device(&self, device: FfiDevice) {
		// SAFETY: consumed by value, so released exactly once.
		unsafe { sys::mix_release_device(device.0.as_ptr()) };
	}

	fn device_uid(&self, device: &FfiDevice) -> String {
		// SAFETY: `device` is live; the string is library-allocated.
		unsafe { take_string(sys::mix_device_get_uid(device.0.as_ptr())) }
	}

	fn device_os_version(&self, device: &FfiDevice) -> String {
		// SAFETY: as above.
		unsafe { take_string(sys::mix_device_get_os_ver(device.0.as_ptr())) }
	}

	fn device_brand(&self, device: &FfiDevice) -> String {
		// SAFETY: as above.
		unsafe { take_string(sys::mix_device_get_brand(device.0.as_ptr())) }
	}

	fn device_name(&self, device: &FfiDevice) -> String {
		// SAFETY: as above.
		unsafe { take_string(sys::mix_device_get_name(device.0.as_ptr())) }
	}

	fn device_model(&self, device: &FfiDevice) -> String {
		// SAFETY: as above.
		unsafe { take_string(sys::mix_device_get_model(device.0.as_ptr())) }
	}

	fn device_platform(&self, device: &FfiDevice) -> Platform {
		// SAFETY: `device` is live.
		Platform::from_raw(unsafe { sys::mix_device_get_platform(device.0.as_ptr()) })
	}

	fn device_supports_abi(&self, device: &FfiDevice, abi: Abi) -> bool {
		// SAFETY: `device` is live.
		unsafe { sys::mix_device_support_abi(device.0.as_ptr(), abi.bits()) }
	}

	fn device_features(&self, device: &FfiDevice) -> Features {
		let mut raw = sys::mix_features::default();
		// SAFETY: `raw` is a writable struct of the size passed.
		unsafe {
			sys::mix_device_get_features(
				device.0.as_ptr(),
				&mut raw,
				mem::size_of::<sys::mix_features>(),
			)
		};
		features_from(&raw)
	}

	fn create_session(&self, device: &FfiDevice, endpoint: &str) -> Result<FfiSession, Status> {
		let endpoint = CString::new(endpoint).map_err(|_| Status::error("debug endpoint contains NUL"))?;

		// SAFETY: create-session reports its status before returning.
		let (raw, status) = unsafe {
			with_status(no_status(), |cb, ctx| {
				sys::mix_device_create_lldb_connection(device.0.as_ptr(), endpoint.as_ptr(), cb, ctx)
			})
		};

		match NonNull::new(raw) {
			Some(session) if status.is_success() => Ok(FfiSession(session)),
			Some(session) => {
				// SAFETY: owned and never handed out.
				unsafe { sys::mix_lldb_connection_free(session.as_ptr()) };
				Err(status)
			}
			None if status.is_success() => Err(Status::error("transport returned no debug session")),
			None => Err(status),
		}
	}

	fn session_is_connected(&self, session: &FfiSession) -> bool {
		// SAFETY: `session` is live.
		unsafe { sys::mix_lldb_connection_is_connected(session.0.as_ptr()) }
	}

	fn session_read(&self, session: &FfiSession, buf: &mut [u8], timeout_us: u64) -> (usize, Status) {
		// SAFETY: read reports its status before returning; `buf` is writable
		// for its length.
		unsafe {
			with_status(no_status(), |cb, ctx| {
				sys::mix_lldb_connection_read(
					session.0.as_ptr(),
					buf.as_mut_ptr().cast(),
					buf.len(),
					timeout_us,
					cb,
					ctx,
				)
			})
		}
	}

	fn session_write(&self, session: &FfiSession, buf: &[u8]) -> (usize, Status) {
		// SAFETY: write reports its status before returning.
		unsafe {
			with_status(no_status(), |cb, ctx| {
				sys::mix_lldb_connection_write(session.0.as_ptr(), buf.as_ptr().cast(), buf.len(), cb, ctx)
			})
		}
	}

	fn session_disconnect(&self, session: &FfiSession) -> Status {
		// SAFETY: disconnect reports its status before returning.
		let ((), status) = unsafe {
			with_status(Status::no_connection(), |cb, ctx| {
				sys::mix_lldb_connection_disconnect(session.0.as_ptr(), cb, ctx)
			})
		};
		status
	}

	fn session_interrupt(&self, session: &FfiSession) -> bool {
		// SAFETY: documented as callable while another thread is in read.
		unsafe { sys::mix_lldb_connection_interrupt_read(session.0.as_ptr()) }
	}

	fn release_session(&self, session: FfiSession) {
		// SAFETY: consumed by value, so freed exactly once.
		unsafe { sys::mix_lldb_connection_free(session.0.as_ptr()) };
	}

	fn resolve_executable(&self, device: &FfiDevice, host_path: &str) -> Result<ResolvedExecutable, String> {
		let host = CString::new(host_path).map_err(|_| format!("host path contains NUL: {host_path:?}"))?;
		let mut slot = CallbackSlot::<ResolveOutcome>::new();

		// SAFETY: resolve reports through one of its callbacks before returning.
		unsafe {
			sys::mix_device_resolve_executable(
				device.0.as_ptr(),
				host.as_ptr(),
				on_resolved,
				on_resolve_error,
				slot.context(),
			)
		};

		slot.take()
			.unwrap_or_else(|| Err("transport reported no result for executable lookup".to_string()))
	}

	fn create_tracker(&self, sink: DeviceEventSink<FfiDevice>) -> FfiTracker {
		// SAFETY: plain constructor.
		let raw = NonNull::new(unsafe { sys::mix_create_device_tracker() });
		let sink = Box::into_raw(Box::new(sink));

		match raw {
			// SAFETY: `sink` stays alive until `release_tracker` removes it.
			Some(tracker) => unsafe {
				sys::mix_device_tracker_add_subscriber(tracker.as_ptr(), sink.cast(), on_device_event)
			},
			None => warn!(target = "devlink", "native device tracker unavailable"),
		}
		FfiTracker { raw, sink }
	}

	fn tracker_start(&self, tracker: &FfiTracker) {
		if let Some(raw) = tracker.raw {
			// SAFETY: live tracker.
			unsafe { sys::mix_device_tracker_start_listen(raw.as_ptr()) };
		}
	}

	fn tracker_stop(&self, tracker: &FfiTracker) {
		if let Some(raw) = tracker.raw {
			// SAFETY: live tracker.
			unsafe { sys::mix_device_tracker_stop_listen(raw.as_ptr()) };
		}
	}

	fn release_tracker(&self, tracker: FfiTracker) {
		if let Some(raw) = tracker.raw {
			// SAFETY: live tracker; removal waits for in-flight callbacks.
			unsafe {
				sys::mix_device_tracker_remove_subscriber(raw.as_ptr(), tracker.sink.cast());
				sys::mix_release_device_tracker(raw.as_ptr());
			}
		}
		// SAFETY: created by `Box::into_raw` in `create_tracker`, freed once.
		drop(unsafe { Box::from_raw(tracker.sink) });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn feature_bytes_map_to_flags() {
		let raw = sys::mix_features {
			support_log: 1,
			support_debug: 1,
			support_image_mount: 1,
			..Default::default()
		};
		assert_eq!(
			features_from(&raw),
			Features::LOG | Features::DEBUG | Features::IMAGE_MOUNT
		);
	}

	#[test]
	fn feature_struct_matches_header_size() {
		assert_eq!(mem::size_of::<sys::mix_features>(), 15);
	}
}

//! Adapter for C entry points that report their result through a callback.
//!
//! The device library returns status and error details by invoking a
//! callback with an opaque context pointer instead of returning them. For
//! the calls listed below the library invokes the callback on the calling
//! thread before returning, so the result can be collected in a
//! [`CallbackSlot`] on the caller's stack:
//!
//! | Entry point | Callback | Slot |
//! |-------------|----------|------|
//! | `mix_connect_device` | error (null on success) | `CallbackSlot<String>` |
//! | `mix_device_create_lldb_connection` | status | `CallbackSlot<Status>` |
//! | `mix_lldb_connection_read` / `_write` | status | `CallbackSlot<Status>` |
//! | `mix_lldb_connection_disconnect` | status | `CallbackSlot<Status>` |
//! | `mix_device_resolve_executable` | result or error | `CallbackSlot<ResolveOutcome>` |
//!
//! No other entry point may be driven through a slot. If a listed call
//! returns without invoking its callback, the slot stays empty and the caller
//! substitutes a fallback ([`no_status`] or `NoConnection` for disconnect).
//!
//! Trampolines catch panics so nothing unwinds into C.

use std::ffi::{CStr, c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use devlink_protocol::{ConnectionStatus, ResolvedExecutable};

use crate::status::Status;

/// `void (*)(const char *error, void *ctx)`
pub type ErrorCallback = unsafe extern "C" fn(*const c_char, *mut c_void);

/// `void (*)(mix_lldb_connection_status status, const char *error, void *ctx)`
pub type StatusCallback = unsafe extern "C" fn(u32, *const c_char, *mut c_void);

/// `void (*)(const char *app_id, const char *exe_name, const char *container, void *ctx)`
pub type ResolveCallback =
	unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *mut c_void);

/// Result delivered by the resolve-executable callbacks.
pub type ResolveOutcome = Result<ResolvedExecutable, String>;

/// Message used when a status callback never fired.
pub const NO_STATUS_MESSAGE: &str = "transport reported no status";

/// Status substituted when a status callback never fired.
pub fn no_status() -> Status {
	Status::error(NO_STATUS_MESSAGE)
}

/// Stack-scoped result record written by a synchronous callback.
#[derive(Debug)]
pub struct CallbackSlot<T> {
	value: Option<T>,
}

impl<T> Default for CallbackSlot<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> CallbackSlot<T> {
	pub fn new() -> Self {
		Self { value: None }
	}

	/// Opaque context pointer to hand to the C call.
	///
	/// The slot must stay in place and unborrowed until that call returns.
	pub fn context(&mut self) -> *mut c_void {
		(self as *mut Self).cast()
	}

	pub fn is_filled(&self) -> bool {
		self.value.is_some()
	}

	pub fn take(&mut self) -> Option<T> {
		self.value.take()
	}

	/// Stores `value` in the slot behind `ctx`. A null `ctx` is ignored.
	///
	/// # Safety
	///
	/// `ctx` must be null or a pointer returned by [`context`](Self::context)
	/// on a live `CallbackSlot<T>` that is not otherwise borrowed.
	pub unsafe fn fill(ctx: *mut c_void, value: T) {
		// SAFETY: guaranteed by the caller.
		if let Some(slot) = unsafe { ctx.cast::<Self>().as_mut() } {
			slot.value = Some(value);
		}
	}
}

/// Copies a C string, mapping null and empty strings to `None`.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for reads.
pub unsafe fn c_message(ptr: *const c_char) -> Option<String> {
	if ptr.is_null() {
		return None;
	}
	// SAFETY: non-null and NUL-terminated per the caller.
	let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
	(!text.is_empty()).then_some(text)
}

pub(crate) fn guard(f: impl FnOnce()) {
	if catch_unwind(AssertUnwindSafe(f)).is_err() {
		tracing::error!(target = "devlink", "panic inside transport callback suppressed");
	}
}

/// [`ErrorCallback`] writing into a `CallbackSlot<String>`.
///
/// The library also calls this on success with a null error; the slot is
/// then left empty.
///
/// # Safety
///
/// `ctx` must satisfy [`CallbackSlot::fill`] for `String`.
pub unsafe extern "C" fn on_error(error: *const c_char, ctx: *mut c_void) {
	guard(|| {
		// SAFETY: the transport passes a valid C string or null.
		if let Some(message) = unsafe { c_message(error) } {
			// SAFETY: guaranteed by the caller.
			unsafe { CallbackSlot::<String>::fill(ctx, message) };
		}
	});
}

/// [`StatusCallback`] writing into a `CallbackSlot<Status>`.
///
/// # Safety
///
/// `ctx` must satisfy [`CallbackSlot::fill`] for [`Status`].
pub unsafe extern "C" fn on_status(code: u32, error: *const c_char, ctx: *mut c_void) {
	guard(|| {
		// SAFETY: the transport passes a valid C string or null.
		let message = unsafe { c_message(error) };
		let status = Status::new(ConnectionStatus::from_raw(code), message);
		// SAFETY: guaranteed by the caller.
		unsafe { CallbackSlot::<Status>::fill(ctx, status) };
	});
}

/// [`ResolveCallback`] writing `Ok` into a `CallbackSlot<ResolveOutcome>`.
///
/// # Safety
///
/// `ctx` must satisfy [`CallbackSlot::fill`] for [`ResolveOutcome`].
pub unsafe extern "C" fn on_resolved(
	app_id: *const c_char,
	exe_name: *const c_char,
	container: *const c_char,
	ctx: *mut c_void,
) {
	guard(|| {
		// SAFETY: the transport passes valid C strings or null.
		let resolved = unsafe {
			ResolvedExecutable {
				app_id: c_message(app_id).unwrap_or_default(),
				executable_name: c_message(exe_name).unwrap_or_default(),
				container_path: c_message(container).unwrap_or_default(),
			}
		};
		// SAFETY: guaranteed by the caller.
		unsafe { CallbackSlot::<ResolveOutcome>::fill(ctx, Ok(resolved)) };
	});
}

/// [`ErrorCallback`] writing `Err` into a `CallbackSlot<ResolveOutcome>`.
///
/// # Safety
///
/// `ctx` must satisfy [`CallbackSlot::fill`] for [`ResolveOutcome`].
pub unsafe extern "C" fn on_resolve_error(error: *const c_char, ctx: *mut c_void) {
	guard(|| {
		// SAFETY: the transport passes a valid C string or null.
		if let Some(message) = unsafe { c_message(error) } {
			// SAFETY: guaranteed by the caller.
			unsafe { CallbackSlot::<ResolveOutcome>::fill(ctx, Err(message)) };
		}
	});
}

/// Runs a status-reporting call and returns its result with the reported
/// status, or `fallback` if the callback never fired.
///
/// # Safety
///
/// `call` must pass the callback and context only to an entry point that
/// invokes the callback, if at all, before it returns.
pub unsafe fn with_status<R>(fallback: Status, call: impl FnOnce(StatusCallback, *mut c_void) -> R) -> (R, Status) {
	let mut slot = CallbackSlot::<Status>::new();
	let result = call(on_status, slot.context());
	(result, slot.take().unwrap_or(fallback))
}

#[cfg(test)]
mod tests {
	use std::ptr;

	use super::*;

	unsafe extern "C" fn fake_read(dst: *mut u8, len: usize, status: StatusCallback, ctx: *mut c_void) -> usize {
		let data = b"$OK#9a";
		let n = len.min(data.len());
		unsafe {
			ptr::copy_nonoverlapping(data.as_ptr(), dst, n);
			status(0, ptr::null(), ctx);
		}
		n
	}

	unsafe extern "C" fn fake_locked(status: StatusCallback, ctx: *mut c_void) {
		unsafe { status(2, c"device is locked".as_ptr(), ctx) };
	}

	unsafe extern "C" fn fake_silent(_status: StatusCallback, _ctx: *mut c_void) {}

	unsafe extern "C" fn fake_connect(url: *const c_char, on_err: ErrorCallback, ctx: *mut c_void) -> bool {
		let url = unsafe { CStr::from_ptr(url) };
		if url.to_bytes() == b"ios://missing" {
			unsafe { on_err(c"device not found".as_ptr(), ctx) };
			return false;
		}
		true
	}

	unsafe extern "C" fn fake_resolve(
		host: *const c_char,
		on_result: ResolveCallback,
		on_err: ErrorCallback,
		ctx: *mut c_void,
	) {
		let host = unsafe { CStr::from_ptr(host) };
		unsafe {
			if host.to_bytes().ends_with(b".app") {
				on_result(
					c"com.example.demo".as_ptr(),
					c"Demo".as_ptr(),
					c"/private/var/containers/Bundle/Application/1234/Demo.app".as_ptr(),
					ctx,
				);
			} else {
				on_err(c"no matching bundle".as_ptr(), ctx);
			}
		}
	}

	#[test]
	fn status_callback_fills_slot() {
		let mut buf = [0u8; 16];
		let (n, status) = unsafe {
			with_status(no_status(), |cb, ctx| fake_read(buf.as_mut_ptr(), buf.len(), cb, ctx))
		};
		assert_eq!(n, 6);
		assert_eq!(&buf[..n], b"$OK#9a");
		assert_eq!(status, Status::success());
	}

	#[test]
	fn status_message_is_kept_verbatim() {
		let ((), status) = unsafe { with_status(no_status(), |cb, ctx| fake_locked(cb, ctx)) };
		assert_eq!(status.code(), ConnectionStatus::Error);
		assert_eq!(status.message(), Some("device is locked"));
	}

	#[test]
	fn silent_call_yields_fallback() {
		let ((), status) = unsafe { with_status(no_status(), |cb, ctx| fake_silent(cb, ctx)) };
		assert_eq!(status.message(), Some(NO_STATUS_MESSAGE));

		let ((), status) = unsafe { with_status(Status::no_connection(), |cb, ctx| fake_silent(cb, ctx)) };
		assert_eq!(status.code(), ConnectionStatus::NoConnection);
	}

	#[test]
	fn error_callback_reports_message() {
		let mut slot = CallbackSlot::<String>::new();
		let ok = unsafe { fake_connect(c"ios://missing".as_ptr(), on_error, slot.context()) };
		assert!(!ok);
		assert_eq!(slot.take().as_deref(), Some("device not found"));

		let mut slot = CallbackSlot::<String>::new();
		let ok = unsafe { fake_connect(c"ios://present".as_ptr(), on_error, slot.context()) };
		assert!(ok);
		assert!(!slot.is_filled());
	}

	#[test]
	fn resolve_callbacks_share_one_slot() {
		let mut slot = CallbackSlot::<ResolveOutcome>::new();
		unsafe { fake_resolve(c"/build/Demo.app".as_ptr(), on_resolved, on_resolve_error, slot.context()) };
		let resolved = slot.take().unwrap().unwrap();
		assert_eq!(resolved.app_id, "com.example.demo");
		assert_eq!(resolved.executable_name, "Demo");
		assert!(resolved.container_path.ends_with("Demo.app"));

		let mut slot = CallbackSlot::<ResolveOutcome>::new();
		unsafe { fake_resolve(c"/build/demo.apk".as_ptr(), on_resolved, on_resolve_error, slot.context()) };
		assert_eq!(slot.take(), Some(Err("no matching bundle".to_string())));
	}

	#[test]
	fn null_error_means_success() {
		let mut slot = CallbackSlot::<String>::new();
		unsafe { on_error(ptr::null(), slot.context()) };
		assert!(!slot.is_filled());
	}

	#[test]
	fn null_context_and_strings_are_tolerated() {
		unsafe {
			on_status(0, ptr::null(), ptr::null_mut());
			on_error(ptr::null(), ptr::null_mut());
			assert_eq!(c_message(ptr::null()), None);
			assert_eq!(c_message(c"".as_ptr()), None);
		}
	}
}

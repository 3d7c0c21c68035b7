//! Raw declarations from `mix_device.h`.
//!
//! Only the entry points the session layer drives are declared. C enums are
//! passed as `u32`.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

use crate::callback::{ErrorCallback, ResolveCallback, StatusCallback};

macro_rules! opaque {
	($($name:ident),* $(,)?) => {
		$(
			#[repr(C)]
			pub struct $name {
				_private: [u8; 0],
			}
		)*
	};
}

opaque!(mix_device_t, mix_devices_t, mix_device_tracker_t, mix_lldb_debugger);

/// `void (*)(mix_device_event, mix_device_t *, void *)`
pub type mix_device_event_callback = unsafe extern "C" fn(u32, *mut mix_device_t, *mut c_void);

/// Capability flags, one byte per feature, in header order.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct mix_features {
	pub support_log: u8,
	pub support_stat: u8,
	pub support_instruments: u8,
	pub support_perfetto: u8,
	pub support_file_io: u8,
	pub support_screenshot: u8,
	pub support_screenrecord: u8,
	pub support_debug: u8,
	pub support_socket_forward: u8,
	pub support_socket_reverse: u8,
	pub support_app_list: u8,
	pub support_app_notification: u8,
	pub support_shell: u8,
	pub support_app_install: u8,
	pub support_image_mount: u8,
}

impl mix_features {
	pub fn as_array(&self) -> [u8; 15] {
		[
			self.support_log,
			self.support_stat,
			self.support_instruments,
			self.support_perfetto,
			self.support_file_io,
			self.support_screenshot,
			self.support_screenrecord,
			self.support_debug,
			self.support_socket_forward,
			self.support_socket_reverse,
			self.support_app_list,
			self.support_app_notification,
			self.support_shell,
			self.support_app_install,
			self.support_image_mount,
		]
	}
}

#[link(name = "mix_device")]
unsafe extern "C" {
	pub fn mix_version() -> *const c_char;
	pub fn mix_free_string(s: *mut c_char);

	pub fn mix_list_devices(devices: *mut *mut mix_devices_t);
	pub fn mix_devices_count(devices: *mut mix_devices_t) -> usize;
	pub fn mix_device_at(devices: *mut mix_devices_t, index: usize) -> *mut mix_device_t;
	pub fn mix_release_devices(devices: *mut mix_devices_t);

	pub fn mix_connect_device(
		url: *const c_char,
		dev_ptr: *mut *mut mix_device_t,
		err_fn: ErrorCallback,
		usr: *mut c_void,
	);
	pub fn mix_device_clone_to_heap(device: *mut mix_device_t) -> *mut mix_device_t;
	pub fn mix_release_device(device: *mut mix_device_t);

	pub fn mix_device_get_uid(device: *mut mix_device_t) -> *mut c_char;
	pub fn mix_device_get_os_ver(device: *mut mix_device_t) -> *mut c_char;
	pub fn mix_device_get_brand(device: *mut mix_device_t) -> *mut c_char;
	pub fn mix_device_get_name(device: *mut mix_device_t) -> *mut c_char;
	pub fn mix_device_get_model(device: *mut mix_device_t) -> *mut c_char;
	pub fn mix_device_get_platform(device: *mut mix_device_t) -> u32;
	pub fn mix_device_support_abi(device: *mut mix_device_t, abi: u32) -> bool;
	pub fn mix_device_get_features(device: *mut mix_device_t, features: *mut mix_features, size: usize);

	pub fn mix_create_device_tracker() -> *mut mix_device_tracker_t;
	pub fn mix_release_device_tracker(tracker: *mut mix_device_tracker_t);
	pub fn mix_device_tracker_start_listen(tracker: *mut mix_device_tracker_t);
	pub fn mix_device_tracker_stop_listen(tracker: *mut mix_device_tracker_t);
	pub fn mix_device_tracker_add_subscriber(
		tracker: *mut mix_device_tracker_t,
		usr_data: *mut c_void,
		callback: mix_device_event_callback,
	);
	pub fn mix_device_tracker_remove_subscriber(tracker: *mut mix_device_tracker_t, usr_data: *mut c_void);

	pub fn mix_device_resolve_executable(
		device: *mut mix_device_t,
		host_app: *const c_char,
		result: ResolveCallback,
		status: ErrorCallback,
		usr: *mut c_void,
	);

	pub fn mix_device_create_lldb_connection(
		device: *mut mix_device_t,
		port: *const c_char,
		status: StatusCallback,
		usr: *mut c_void,
	) -> *mut mix_lldb_debugger;
	pub fn mix_lldb_connection_free(debugger: *mut mix_lldb_debugger);
	pub fn mix_lldb_connection_disconnect(debugger: *mut mix_lldb_debugger, status: StatusCallback, usr: *mut c_void);
	pub fn mix_lldb_connection_is_connected(debugger: *mut mix_lldb_debugger) -> bool;
	pub fn mix_lldb_connection_read(
		debugger: *mut mix_lldb_debugger,
		dst: *mut c_void,
		len: usize,
		timeout_us: u64,
		status: StatusCallback,
		usr: *mut c_void,
	) -> usize;
	pub fn mix_lldb_connection_write(
		debugger: *mut mix_lldb_debugger,
		src: *const c_void,
		len: usize,
		status: StatusCallback,
		usr: *mut c_void,
	) -> usize;
	pub fn mix_lldb_connection_interrupt_read(debugger: *mut mix_lldb_debugger) -> bool;
}

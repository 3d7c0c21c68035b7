//! Device attributes exposed by the transport.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Operating-system family of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
	Ios,
	Android,
	Unsupported,
}

impl Platform {
	/// Maps the transport's raw platform code (`0` iOS, `1` Android).
	pub fn from_raw(code: u32) -> Self {
		match code {
			0 => Self::Ios,
			1 => Self::Android,
			_ => Self::Unsupported,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ios => "ios",
			Self::Android => "android",
			Self::Unsupported => "unsupported",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

bitflags! {
	/// Instruction-set ABIs a device can execute.
	///
	/// Bit values match the transport's `mix_device_abi` mask.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
	pub struct Abi: u32 {
		const X86 = 1 << 0;
		const X64 = 1 << 1;
		const ARM = 1 << 2;
		const ARM64 = 1 << 3;
		const LOONG64 = 1 << 4;
	}
}

bitflags! {
	/// Capabilities a device advertises through the transport.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
	pub struct Features: u32 {
		const LOG = 1 << 0;
		const STAT = 1 << 1;
		const INSTRUMENTS = 1 << 2;
		const PERFETTO = 1 << 3;
		const FILE_IO = 1 << 4;
		const SCREENSHOT = 1 << 5;
		const SCREEN_RECORD = 1 << 6;
		const DEBUG = 1 << 7;
		const SOCKET_FORWARD = 1 << 8;
		const SOCKET_REVERSE = 1 << 9;
		const APP_LIST = 1 << 10;
		const APP_NOTIFICATION = 1 << 11;
		const SHELL = 1 << 12;
		const APP_INSTALL = 1 << 13;
		const IMAGE_MOUNT = 1 << 14;
	}
}

/// Online/offline notification delivered by a device tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceEvent {
	Online,
	Offline,
}

impl DeviceEvent {
	/// Maps the transport's raw event code (`0` online, anything else offline).
	pub fn from_raw(code: u32) -> Self {
		if code == 0 { Self::Online } else { Self::Offline }
	}
}

/// Snapshot of a device's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
	/// Unique device identifier (UDID on iOS, serial on Android).
	pub uid: String,
	pub os_version: String,
	pub brand: String,
	/// User-visible device name.
	pub name: String,
	/// Hardware model; on Android this is `ro.product.model`.
	pub model: String,
	pub platform: Platform,
	pub abis: Abi,
	pub features: Features,
}

impl DeviceInfo {
	/// Returns `true` if the device advertises debugging support.
	pub fn can_debug(&self) -> bool {
		self.features.contains(Features::DEBUG)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn platform_codes() {
		assert_eq!(Platform::from_raw(0), Platform::Ios);
		assert_eq!(Platform::from_raw(1), Platform::Android);
		assert_eq!(Platform::from_raw(3), Platform::Unsupported);
	}

	#[test]
	fn abi_bits_match_transport_mask() {
		assert_eq!(Abi::ARM64.bits(), 8);
		assert_eq!(Abi::LOONG64.bits(), 16);
		assert!((Abi::ARM | Abi::ARM64).contains(Abi::ARM));
	}

	#[test]
	fn event_codes() {
		assert_eq!(DeviceEvent::from_raw(0), DeviceEvent::Online);
		assert_eq!(DeviceEvent::from_raw(1), DeviceEvent::Offline);
	}
}

//! Priority-ordered architecture lists.
//!
//! The order of an [`ArchitectureList`] is the resolver's only tie-break:
//! the first architecture that loads wins.

use std::fmt;

use devlink_protocol::{Abi, Architecture, Platform};
use devlink_runtime::{DeviceRef, Transport};
use serde::{Deserialize, Serialize};

const IOS: &[Architecture] = &[
	Architecture::Arm64e,
	Architecture::Arm64,
	Architecture::Armv7s,
	Architecture::Armv7k,
	Architecture::Armv7,
	Architecture::Armv6,
	Architecture::Arm,
];

const ANDROID: &[Architecture] = &[
	Architecture::Arm64,
	Architecture::Arm,
	Architecture::X86_64,
	Architecture::X86,
	Architecture::Loong64,
];

/// Ordered architectures, most preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchitectureList(Vec<Architecture>);

impl ArchitectureList {
	pub fn new(archs: impl IntoIterator<Item = Architecture>) -> Self {
		Self(archs.into_iter().collect())
	}

	/// Full list for a platform family.
	pub fn for_platform(platform: Platform) -> Self {
		match platform {
			Platform::Ios => Self::new(IOS.iter().copied()),
			Platform::Android => Self::new(ANDROID.iter().copied()),
			Platform::Unsupported => Self::default(),
		}
	}

	/// Platform list narrowed to the ABIs `device` reports.
	///
	/// Devices that report no ABI get the full platform list.
	pub fn for_device<T: Transport>(device: DeviceRef<'_, T>) -> Self {
		let full = Self::for_platform(device.platform());
		let abis = device.abis();
		if abis.is_empty() {
			return full;
		}
		full.restricted_to(abis)
	}

	/// Keeps only architectures whose ABI is in `abis`, preserving order.
	pub fn restricted_to(&self, abis: Abi) -> Self {
		Self::new(self.0.iter().copied().filter(|arch| abis.contains(arch.abi())))
	}

	pub fn as_slice(&self) -> &[Architecture] {
		&self.0
	}

	pub fn iter(&self) -> impl Iterator<Item = Architecture> + '_ {
		self.0.iter().copied()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<Architecture>> for ArchitectureList {
	fn from(archs: Vec<Architecture>) -> Self {
		Self(archs)
	}
}

impl<'a> IntoIterator for &'a ArchitectureList {
	type Item = Architecture;
	type IntoIter = std::iter::Copied<std::slice::Iter<'a, Architecture>>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter().copied()
	}
}

impl fmt::Display for ArchitectureList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&join_names(&self.0))
	}
}

/// Joins architecture names with `", "`.
pub fn join_names(archs: &[Architecture]) -> String {
	archs
		.iter()
		.map(|arch| arch.name())
		.collect::<Vec<_>>()
		.join(", ")
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use devlink_runtime::Device;
	use devlink_runtime::testing::{MockDeviceSpec, MockTransport};

	use super::*;

	#[test]
	fn ios_order_prefers_newest() {
		let list = ArchitectureList::for_platform(Platform::Ios);
		assert_eq!(list.to_string(), "arm64e, arm64, armv7s, armv7k, armv7, armv6, arm");
	}

	#[test]
	fn android_order() {
		let list = ArchitectureList::for_platform(Platform::Android);
		assert_eq!(list.to_string(), "arm64, arm, x86_64, i386, loongarch64");
	}

	#[test]
	fn unsupported_platform_is_empty() {
		assert!(ArchitectureList::for_platform(Platform::Unsupported).is_empty());
	}

	#[test]
	fn device_abis_narrow_the_list() {
		let transport = Arc::new(MockTransport::new());
		transport.add_device("android://emu", MockDeviceSpec::android("emu").with_abis(Abi::X64 | Abi::X86));
		let raw = transport.connect_device("android://emu").unwrap();
		let device = Device::from_raw(Arc::clone(&transport), raw);

		let list = ArchitectureList::for_device(device.view());
		assert_eq!(list.as_slice(), &[Architecture::X86_64, Architecture::X86]);
	}

	#[test]
	fn device_without_abis_gets_full_list() {
		let transport = Arc::new(MockTransport::new());
		transport.add_device("ios://a", MockDeviceSpec::ios("a").with_abis(Abi::empty()));
		let raw = transport.connect_device("ios://a").unwrap();
		let device = Device::from_raw(Arc::clone(&transport), raw);

		let list = ArchitectureList::for_device(device.view());
		assert_eq!(list, ArchitectureList::for_platform(Platform::Ios));
	}

	#[test]
	fn arm64_device_keeps_arm64_family_only() {
		let list = ArchitectureList::for_platform(Platform::Ios).restricted_to(Abi::ARM64);
		assert_eq!(list.as_slice(), &[Architecture::Arm64e, Architecture::Arm64]);
	}
}

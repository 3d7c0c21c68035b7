//! Remote device platform: connect to a device, then resolve executables on it.

use std::sync::Arc;

use devlink_protocol::{DeviceScheme, DeviceUrl};
use devlink_runtime::{Connection, SessionConfig, Status, Transport};
use parking_lot::Mutex;
use tracing::debug;

use crate::arch_list::ArchitectureList;
use crate::error::ResolveError;
use crate::module::{FileModuleLoader, ModuleLoader, ModuleSpec};
use crate::resolver::{ModuleResolver, ResolvedModule};

/// A remote iOS or Android device as seen by a debugger.
///
/// Owns one [`Connection`]; process-attach logic uses
/// [`connection`](Self::connection) as its byte stream.
pub struct RemotePlatform<T: Transport, L = FileModuleLoader> {
	connection: Arc<Connection<T>>,
	resolver: ModuleResolver<L>,
	scheme: Mutex<Option<DeviceScheme>>,
}

impl<T: Transport> RemotePlatform<T> {
	pub fn new(transport: Arc<T>, config: &SessionConfig) -> Self {
		Self::with_resolver(transport, config, ModuleResolver::new())
	}
}

impl<T: Transport, L: ModuleLoader> RemotePlatform<T, L> {
	pub fn with_resolver(transport: Arc<T>, config: &SessionConfig, resolver: ModuleResolver<L>) -> Self {
		Self {
			connection: Arc::new(Connection::new(transport, config)),
			resolver,
			scheme: Mutex::new(None),
		}
	}

	/// `remote-ios` or `remote-android` after a successful connect;
	/// `remote-device` otherwise.
	pub fn name(&self) -> &'static str {
		match *self.scheme.lock() {
			Some(DeviceScheme::Ios) => "remote-ios",
			Some(DeviceScheme::Android) => "remote-android",
			None => "remote-device",
		}
	}

	/// Connects to the device at `url` and opens its debug session.
	///
	/// The URL scheme names the platform only once the connect succeeds; a
	/// failed connect leaves no device selected and resets the name.
	pub fn connect_remote(&self, url: &str) -> Status {
		let status = self.connection.connect(url);
		*self.scheme.lock() = match DeviceUrl::parse(url) {
			Ok(parsed) if status.is_success() => Some(parsed.scheme()),
			_ => None,
		};
		debug!(target = "devlink", platform = self.name(), url, status = %status, "connect remote");
		status
	}

	/// Closes the debug session. The device stays selected.
	pub fn disconnect_remote(&self) -> Status {
		self.connection.disconnect()
	}

	pub fn is_connected(&self) -> bool {
		self.connection.is_connected()
	}

	/// Display name of the connected device.
	pub fn hostname(&self) -> Option<String> {
		self.connection.with_device(|device| device.name())
	}

	/// Architectures to try for this device, most preferred first. Empty
	/// when no device is selected.
	pub fn supported_architectures(&self) -> ArchitectureList {
		self.connection
			.with_device(|device| ArchitectureList::for_device(device))
			.unwrap_or_default()
	}

	/// Finds the local module for the app built at `spec.path` as installed
	/// on the connected device.
	pub fn resolve_executable(&self, spec: &ModuleSpec) -> Result<ResolvedModule, ResolveError> {
		let name = self.name();
		self.connection
			.with_device(|device| {
				let archs = ArchitectureList::for_device(device);
				self.resolver.resolve(device, spec, &archs, name)
			})
			.unwrap_or(Err(ResolveError::NoDevice))
	}

	pub fn connection(&self) -> &Arc<Connection<T>> {
		&self.connection
	}
}

#[cfg(test)]
mod tests {
	use devlink_protocol::{Abi, Architecture, ResolvedExecutable};
	use devlink_runtime::testing::{MockDeviceSpec, MockTransport};

	use super::*;

	fn platform() -> (Arc<MockTransport>, RemotePlatform<MockTransport>) {
		let transport = Arc::new(MockTransport::new());
		transport.add_device("ios://a1", MockDeviceSpec::ios("a1").with_name("Test iPhone"));
		transport.add_device(
			"android://emulator-5554",
			MockDeviceSpec::android("emulator-5554").with_abis(Abi::X64),
		);
		let platform = RemotePlatform::new(Arc::clone(&transport), &SessionConfig::default());
		(transport, platform)
	}

	#[test]
	fn name_follows_url_scheme() {
		let (_transport, platform) = platform();
		assert_eq!(platform.name(), "remote-device");

		assert!(platform.connect_remote("ios://a1").is_success());
		assert_eq!(platform.name(), "remote-ios");

		assert!(platform.connect_remote("android://emulator-5554").is_success());
		assert_eq!(platform.name(), "remote-android");
	}

	#[test]
	fn failed_connect_does_not_name_platform() {
		let (transport, platform) = platform();
		transport.fail_connect("android://offline", "device not found");

		assert!(!platform.connect_remote("android://offline").is_success());
		assert_eq!(platform.name(), "remote-device");
		assert!(platform.supported_architectures().is_empty());

		assert!(platform.connect_remote("ios://a1").is_success());
		assert!(!platform.connect_remote("android://offline").is_success());
		assert_eq!(platform.name(), "remote-device");
		assert!(platform.supported_architectures().is_empty());
	}

	#[test]
	fn hostname_is_device_name() {
		let (_transport, platform) = platform();
		assert_eq!(platform.hostname(), None);
		platform.connect_remote("ios://a1");
		assert_eq!(platform.hostname().as_deref(), Some("Test iPhone"));
	}

	#[test]
	fn architectures_follow_connected_device() {
		let (_transport, platform) = platform();
		assert!(platform.supported_architectures().is_empty());

		platform.connect_remote("android://emulator-5554");
		assert_eq!(platform.supported_architectures().as_slice(), &[Architecture::X86_64]);
	}

	#[test]
	fn disconnect_keeps_device_selected() {
		let (_transport, platform) = platform();
		platform.connect_remote("ios://a1");
		assert!(platform.is_connected());

		assert!(platform.disconnect_remote().is_success());
		assert!(!platform.is_connected());
		assert_eq!(platform.hostname().as_deref(), Some("Test iPhone"));
	}

	#[test]
	fn resolve_without_device_fails() {
		let (_transport, platform) = platform();
		let err = platform.resolve_executable(&ModuleSpec::new("/build/Demo.app")).unwrap_err();
		assert_eq!(err, ResolveError::NoDevice);
	}

	#[test]
	fn resolve_reports_missing_local_executable() {
		let (transport, platform) = platform();
		let dir = tempfile::tempdir().unwrap();
		let host = dir.path().to_string_lossy().into_owned();
		transport.set_resolution(
			&host,
			Ok(ResolvedExecutable {
				app_id: "com.example.Demo".into(),
				executable_name: "Demo".into(),
				container_path: "/var/containers/Demo.app".into(),
			}),
		);
		platform.connect_remote("ios://a1");

		let err = platform.resolve_executable(&ModuleSpec::new(dir.path())).unwrap_err();
		assert!(matches!(err, ResolveError::NotReadable { .. }));
	}
}

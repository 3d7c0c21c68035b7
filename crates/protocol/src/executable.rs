//! Result of asking a device where an executable is installed.

use serde::{Deserialize, Serialize};

/// Install location the device reports for a host-side application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedExecutable {
	/// Application identifier on the device (bundle id or package name).
	pub app_id: String,
	/// Executable file name, relative to both the host bundle and the container.
	pub executable_name: String,
	/// Absolute path of the app container on the device.
	pub container_path: String,
}

impl ResolvedExecutable {
	/// Remote path of the executable inside its container.
	pub fn remote_executable_path(&self) -> String {
		format!(
			"{}/{}",
			self.container_path.trim_end_matches('/'),
			self.executable_name
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remote_path_joins_container_and_name() {
		let resolved = ResolvedExecutable {
			app_id: "com.example.Demo".into(),
			executable_name: "Demo".into(),
			container_path: "/private/var/containers/Bundle/Application/ABC/Demo.app/".into(),
		};
		assert_eq!(
			resolved.remote_executable_path(),
			"/private/var/containers/Bundle/Application/ABC/Demo.app/Demo"
		);
	}
}

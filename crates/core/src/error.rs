//! Error types for devlink.

use std::path::PathBuf;

use devlink_protocol::Architecture;
use thiserror::Error;

use crate::arch_list::join_names;

/// Result type alias for devlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by devlink.
#[derive(Debug, Error)]
pub enum Error {
	/// Runtime error (configuration, device discovery).
	#[error(transparent)]
	Runtime(#[from] devlink_runtime::Error),

	/// Executable resolution failed.
	#[error(transparent)]
	Resolve(#[from] ResolveError),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Why a remote executable could not be matched to a local module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
	/// The local candidate file is missing or cannot be opened.
	#[error("'{}' is not readable", .path.display())]
	NotReadable { path: PathBuf },

	/// The file exists but no listed architecture could be loaded from it.
	#[error(
		"'{}' doesn't contain any '{platform}' platform architectures: {}",
		.path.display(),
		join_names(.attempted)
	)]
	NoMatchingArchitecture {
		path: PathBuf,
		platform: String,
		/// Every architecture tried, in the order tried.
		attempted: Vec<Architecture>,
	},

	/// The transport could not locate the executable on the device. Holds
	/// the transport's message unmodified.
	#[error("{0}")]
	ResolveFailed(String),

	/// Resolution was requested while no device is connected.
	#[error("the platform is not currently connected")]
	NoDevice,
}

impl ResolveError {
	/// Architectures tried before giving up, if the search ran.
	pub fn attempted(&self) -> &[Architecture] {
		match self {
			Self::NoMatchingArchitecture { attempted, .. } => attempted,
			_ => &[],
		}
	}
}

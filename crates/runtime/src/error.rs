//! Error types for the devlink runtime.

use devlink_protocol::UrlError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside the connection status vocabulary.
///
/// Connection operations report [`Status`](crate::Status) values instead;
/// these errors cover configuration and device discovery.
#[derive(Debug, Error)]
pub enum Error {
	/// Device URL could not be parsed.
	#[error(transparent)]
	InvalidUrl(#[from] UrlError),

	/// Transport refused to open a device.
	#[error("{0}")]
	Transport(String),

	/// Configuration value could not be interpreted.
	#[error("Invalid configuration: {0}")]
	Config(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns the transport message if this error came from the transport.
	pub fn transport_message(&self) -> Option<&str> {
		match self {
			Error::Transport(message) => Some(message),
			_ => None,
		}
	}
}

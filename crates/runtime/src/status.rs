//! Status values returned by connection operations.

use std::fmt;

use devlink_protocol::ConnectionStatus;

/// Status code plus the transport's message, if it sent one.
///
/// Messages are kept exactly as the transport reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	code: ConnectionStatus,
	message: Option<String>,
}

impl Status {
	pub fn new(code: ConnectionStatus, message: Option<String>) -> Self {
		Self { code, message }
	}

	pub fn success() -> Self {
		Self::new(ConnectionStatus::Success, None)
	}

	pub fn no_connection() -> Self {
		Self::new(ConnectionStatus::NoConnection, None)
	}

	pub fn interrupted() -> Self {
		Self::new(ConnectionStatus::Interrupted, None)
	}

	pub fn timed_out() -> Self {
		Self::new(ConnectionStatus::TimedOut, None)
	}

	/// An `Error` status carrying `message`.
	pub fn error(message: impl Into<String>) -> Self {
		Self::new(ConnectionStatus::Error, Some(message.into()))
	}

	pub fn code(&self) -> ConnectionStatus {
		self.code
	}

	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}

	pub fn is_success(&self) -> bool {
		self.code.is_success()
	}
}

impl From<ConnectionStatus> for Status {
	fn from(code: ConnectionStatus) -> Self {
		Self::new(code, None)
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.message {
			Some(message) => write!(f, "{}: {}", self.code, message),
			None => write!(f, "{}", self.code),
		}
	}
}

/// Byte count and status of a read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
	pub bytes: usize,
	pub status: Status,
}

impl Transfer {
	pub fn new(bytes: usize, status: Status) -> Self {
		Self { bytes, status }
	}

	/// Zero bytes with a `NoConnection` status.
	pub fn no_connection() -> Self {
		Self::new(0, Status::no_connection())
	}
}

//! Connection status codes reported by the device transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a connection-level operation.
///
/// The discriminants match the transport's numeric status codes, so a raw
/// code maps 1:1 onto a variant via [`ConnectionStatus::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ConnectionStatus {
	/// The operation completed.
	Success = 0,
	/// The peer closed the stream.
	EndOfFile = 1,
	/// The operation failed; the accompanying message carries details.
	Error = 2,
	/// The caller-specified timeout elapsed.
	TimedOut = 3,
	/// No session is attached.
	NoConnection = 4,
	/// The transport detected that the peer is gone.
	LostConnection = 5,
	/// A blocked read was cancelled on request.
	Interrupted = 6,
}

impl ConnectionStatus {
	/// Maps a raw transport status code. Unknown codes become [`Error`](Self::Error).
	pub fn from_raw(code: u32) -> Self {
		match code {
			0 => Self::Success,
			1 => Self::EndOfFile,
			2 => Self::Error,
			3 => Self::TimedOut,
			4 => Self::NoConnection,
			5 => Self::LostConnection,
			6 => Self::Interrupted,
			_ => Self::Error,
		}
	}

	/// Returns the raw transport code for this status.
	pub fn as_raw(self) -> u32 {
		self as u32
	}

	pub fn is_success(self) -> bool {
		self == Self::Success
	}

	/// Returns the lowercase name used in logs and serialized output.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::EndOfFile => "end_of_file",
			Self::Error => "error",
			Self::TimedOut => "timed_out",
			Self::NoConnection => "no_connection",
			Self::LostConnection => "lost_connection",
			Self::Interrupted => "interrupted",
		}
	}
}

impl fmt::Display for ConnectionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

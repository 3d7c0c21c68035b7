//! Device URLs of the form `scheme://host`.
//!
//! The transport accepts only the scheme and the device host part; ports,
//! paths and query strings on the input are dropped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::device::Platform;

/// URL scheme naming the device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceScheme {
	Ios,
	Android,
}

impl DeviceScheme {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ios => "ios",
			Self::Android => "android",
		}
	}

	/// Returns the device platform this scheme addresses.
	pub fn platform(self) -> Platform {
		match self {
			Self::Ios => Platform::Ios,
			Self::Android => Platform::Android,
		}
	}
}

/// Errors produced while parsing a device URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
	#[error("malformed device URL '{input}': {reason}")]
	Malformed { input: String, reason: String },

	#[error("unsupported device URL scheme '{0}' (expected ios:// or android://)")]
	UnsupportedScheme(String),

	#[error("device URL '{0}' has no host")]
	MissingHost(String),
}

/// A parsed `ios://<host>` or `android://<host>` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceUrl {
	scheme: DeviceScheme,
	host: String,
}

impl DeviceUrl {
	/// Parses `input`, keeping only scheme and host.
	pub fn parse(input: &str) -> Result<Self, UrlError> {
		let parsed = Url::parse(input.trim()).map_err(|e| UrlError::Malformed {
			input: input.to_string(),
			reason: e.to_string(),
		})?;

		let scheme = match parsed.scheme() {
			"ios" => DeviceScheme::Ios,
			"android" => DeviceScheme::Android,
			other => return Err(UrlError::UnsupportedScheme(other.to_string())),
		};

		let host = parsed
			.host_str()
			.filter(|h| !h.is_empty())
			.ok_or_else(|| UrlError::MissingHost(input.to_string()))?;

		Ok(Self {
			scheme,
			host: host.to_string(),
		})
	}

	pub fn scheme(&self) -> DeviceScheme {
		self.scheme
	}

	/// Device host part (UDID, serial or network address).
	pub fn host(&self) -> &str {
		&self.host
	}
}

impl fmt::Display for DeviceUrl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}://{}", self.scheme.as_str(), self.host)
	}
}

impl FromStr for DeviceUrl {
	type Err = UrlError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

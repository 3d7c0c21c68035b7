//! Session configuration.
//!
//! Values are layered, later layers winning:
//! 1. Built-in defaults
//! 2. JSON file named by `DEVLINK_CONFIG`
//! 3. Individual environment overrides (`DEVLINK_DEBUG_ENDPOINT`,
//!    `DEVLINK_INTERRUPT_POLL_MS`, `DEVLINK_START_TRACKER`)

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "DEVLINK_CONFIG";
/// Overrides [`SessionConfig::debug_endpoint`].
pub const DEBUG_ENDPOINT_ENV: &str = "DEVLINK_DEBUG_ENDPOINT";
/// Overrides [`SessionConfig::interrupt_poll_ms`]; `off` disables slicing.
pub const INTERRUPT_POLL_ENV: &str = "DEVLINK_INTERRUPT_POLL_MS";
/// Overrides [`SessionConfig::start_tracker`].
pub const START_TRACKER_ENV: &str = "DEVLINK_START_TRACKER";

const DEFAULT_INTERRUPT_POLL_MS: u64 = 250;

/// Settings shared by connections and the device runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Remote debug service passed to session creation. Empty selects the
	/// transport default.
	pub debug_endpoint: String,
	/// Longest single blocking read before the connection checks for a
	/// pending interrupt. `None` (or `0`) forwards the caller's timeout as is.
	pub interrupt_poll_ms: Option<u64>,
	/// Start device event delivery as soon as the runtime is initialised.
	pub start_tracker: bool,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			debug_endpoint: String::new(),
			interrupt_poll_ms: Some(DEFAULT_INTERRUPT_POLL_MS),
			start_tracker: false,
		}
	}
}

impl SessionConfig {
	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Loads configuration using `lookup` in place of the process environment.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut config = match lookup(CONFIG_ENV).filter(|p| !p.trim().is_empty()) {
			Some(path) => Self::from_file(path.trim())?,
			None => Self::default(),
		};
		config.apply_overrides(&lookup)?;
		Ok(config)
	}

	/// Reads a JSON file. Missing keys keep their defaults.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path)?;
		let config: Self = serde_json::from_str(&text)?;
		debug!(target = "devlink", path = %path.display(), "loaded session config");
		Ok(config)
	}

	/// Poll interval used to slice blocking reads, if enabled.
	pub fn interrupt_poll_interval(&self) -> Option<Duration> {
		self.interrupt_poll_ms
			.filter(|ms| *ms > 0)
			.map(Duration::from_millis)
	}

	fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(endpoint) = lookup(DEBUG_ENDPOINT_ENV) {
			self.debug_endpoint = endpoint.trim().to_string();
		}

		if let Some(raw) = lookup(INTERRUPT_POLL_ENV) {
			self.interrupt_poll_ms = parse_poll_ms(&raw)?;
		}

		if let Some(raw) = lookup(START_TRACKER_ENV) {
			self.start_tracker = parse_flag(START_TRACKER_ENV, &raw)?;
		}

		Ok(())
	}
}

fn parse_poll_ms(raw: &str) -> Result<Option<u64>> {
	let value = raw.trim();
	if matches!(value.to_ascii_lowercase().as_str(), "off" | "none" | "") {
		return Ok(None);
	}
	value.parse::<u64>().map(Some).map_err(|_| {
		Error::Config(format!(
			"{INTERRUPT_POLL_ENV} must be a number of milliseconds or 'off', got '{value}'"
		))
	})
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" | "" => Ok(false),
		other => Err(Error::Config(format!("{key} must be a boolean, got '{other}'"))),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::io::Write;

	use super::*;

	fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key: &str| map.get(key).cloned()
	}

	#[test]
	fn defaults_when_nothing_is_set() {
		let config = SessionConfig::from_lookup(lookup_from(&[])).unwrap();
		assert_eq!(config, SessionConfig::default());
		assert_eq!(config.interrupt_poll_interval(), Some(Duration::from_millis(250)));
	}

	#[test]
	fn file_values_are_overridden_by_env() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"debug_endpoint": "lldb-server", "start_tracker": true}}"#).unwrap();
		let path = file.path().to_str().unwrap().to_string();

		let config = SessionConfig::from_lookup(lookup_from(&[
			(CONFIG_ENV, path.as_str()),
			(DEBUG_ENDPOINT_ENV, "debugserver"),
		]))
		.unwrap();

		assert_eq!(config.debug_endpoint, "debugserver");
		assert!(config.start_tracker);
		assert_eq!(config.interrupt_poll_ms, Some(250));
	}

	#[test]
	fn null_poll_in_file_disables_slicing() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"interrupt_poll_ms": null}}"#).unwrap();

		let config = SessionConfig::from_file(file.path()).unwrap();
		assert_eq!(config.interrupt_poll_interval(), None);
	}

	#[test]
	fn poll_override_accepts_off_and_numbers() {
		let off = SessionConfig::from_lookup(lookup_from(&[(INTERRUPT_POLL_ENV, "off")])).unwrap();
		assert_eq!(off.interrupt_poll_ms, None);

		let fast = SessionConfig::from_lookup(lookup_from(&[(INTERRUPT_POLL_ENV, "20")])).unwrap();
		assert_eq!(fast.interrupt_poll_interval(), Some(Duration::from_millis(20)));

		let zero = SessionConfig::from_lookup(lookup_from(&[(INTERRUPT_POLL_ENV, "0")])).unwrap();
		assert_eq!(zero.interrupt_poll_interval(), None);
	}

	#[test]
	fn invalid_values_are_config_errors() {
		let err = SessionConfig::from_lookup(lookup_from(&[(START_TRACKER_ENV, "maybe")])).unwrap_err();
		assert!(matches!(err, Error::Config(_)));

		let err = SessionConfig::from_lookup(lookup_from(&[(INTERRUPT_POLL_ENV, "soon")])).unwrap_err();
		assert!(err.to_string().contains(INTERRUPT_POLL_ENV));
	}

	#[test]
	fn missing_config_file_is_io_error() {
		let err = SessionConfig::from_lookup(lookup_from(&[(CONFIG_ENV, "/nonexistent/devlink.json")])).unwrap_err();
		assert!(matches!(err, Error::Io(_)));
	}
}

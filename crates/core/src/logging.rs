use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// How much of the session layer's activity reaches the log.
///
/// Other targets of the embedding process stay at `warn`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
	/// Failed connects, refused interrupts and other warnings.
	#[default]
	Quiet,
	/// Session lifecycle: connect, disconnect, tracker events, resolution.
	Sessions,
	/// Every read, write and transport callback.
	Wire,
}

impl LogLevel {
	fn directives(self) -> &'static str {
		match self {
			Self::Quiet => "warn,devlink=warn",
			Self::Sessions => "warn,devlink=debug",
			Self::Wire => "warn,devlink=trace",
		}
	}
}

/// Installs a stderr `fmt` subscriber for `level`. `RUST_LOG` overrides it.
///
/// Embedders that install their own subscriber do not need this; if one is
/// already set, this does nothing.
pub fn init_logging(level: LogLevel) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directives()));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	let _ = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_thread_names(true)
		.compact()
		.try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn levels_only_widen_devlink_target() {
		assert_eq!(LogLevel::default(), LogLevel::Quiet);
		for level in [LogLevel::Quiet, LogLevel::Sessions, LogLevel::Wire] {
			assert!(level.directives().starts_with("warn,devlink="));
			assert!(EnvFilter::try_new(level.directives()).is_ok());
		}
	}

	#[test]
	fn repeated_init_is_harmless() {
		init_logging(LogLevel::Quiet);
		init_logging(LogLevel::Wire);
		tracing::debug!(target = "devlink", "still logging");
	}
}

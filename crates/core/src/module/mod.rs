//! Local module images.
//!
//! A [`ModuleSpec`] names a local file and optionally pins the architecture
//! slice and binary UUID to load from it. A [`ModuleLoader`] turns a spec
//! into a [`ModuleImage`] or explains why it cannot.

use std::path::{Path, PathBuf};

use devlink_protocol::Architecture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod object;

pub use object::FileModuleLoader;
#[cfg(test)]
pub(crate) use object::fixtures;

/// What to load from a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
	pub path: PathBuf,
	/// Forced architecture; `None` accepts any recognised slice.
	#[serde(default)]
	pub architecture: Option<Architecture>,
	/// Required binary identity (Mach-O `LC_UUID`).
	#[serde(default)]
	pub uuid: Option<Uuid>,
}

impl ModuleSpec {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			architecture: None,
			uuid: None,
		}
	}

	pub fn with_architecture(mut self, arch: Architecture) -> Self {
		self.architecture = Some(arch);
		self
	}

	pub fn with_uuid(mut self, uuid: Uuid) -> Self {
		self.uuid = Some(uuid);
		self
	}

	/// Returns `true` if the spec pins an architecture or a UUID.
	pub fn is_exact(&self) -> bool {
		self.architecture.is_some() || self.uuid.is_some()
	}

	/// Same constraints, different file.
	pub fn at(&self, path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			..self.clone()
		}
	}
}

/// Container format of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFormat {
	MachO,
	Elf,
}

/// One architecture slice of a local object file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleImage {
	pub path: PathBuf,
	pub architecture: Architecture,
	pub uuid: Option<Uuid>,
	pub format: ObjectFormat,
	/// Byte offset of the slice within the file (non-zero inside fat files).
	pub offset: u64,
	pub size: u64,
}

impl ModuleImage {
	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// Why a module could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("'{}' is not a recognised object file", .0.display())]
	UnknownFormat(PathBuf),

	#[error("'{}' is truncated or malformed: {reason}", .path.display())]
	Malformed { path: PathBuf, reason: String },

	#[error("'{}' has no slice matching the requested architecture or UUID", .0.display())]
	NoMatchingSlice(PathBuf),
}

/// Loads module images from local files.
pub trait ModuleLoader: Send + Sync {
	fn load(&self, spec: &ModuleSpec) -> Result<ModuleImage, LoadError>;
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for &L {
	fn load(&self, spec: &ModuleSpec) -> Result<ModuleImage, LoadError> {
		(**self).load(spec)
	}
}

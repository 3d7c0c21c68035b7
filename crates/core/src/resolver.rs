//! Matches an executable installed on a device to a local module image.
//!
//! The device reports where the app built at a host path is installed. The
//! executable is then looked up inside the host path and loaded for the
//! first architecture in priority order that yields an image.

use std::fs::File;
use std::path::Path;

use devlink_protocol::{Architecture, ResolvedExecutable};
use devlink_runtime::{DeviceRef, Transport};
use serde::Serialize;
use tracing::{debug, warn};

use crate::arch_list::ArchitectureList;
use crate::error::ResolveError;
use crate::module::{FileModuleLoader, ModuleImage, ModuleLoader, ModuleSpec};

/// A local image bound to its on-device install location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModule {
	pub image: ModuleImage,
	/// Application identifier reported by the device.
	pub app_id: String,
	/// `<container>/<executable>` on the device.
	pub platform_path: String,
	/// `<container>` on the device.
	pub remote_install_path: String,
	/// Architectures tried during the search, in order, including the winner.
	/// Empty when an exact architecture or UUID loaded directly.
	pub attempted: Vec<Architecture>,
}

impl ResolvedModule {
	pub fn architecture(&self) -> Architecture {
		self.image.architecture
	}
}

/// Resolves executables with a [`ModuleLoader`].
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver<L = FileModuleLoader> {
	loader: L,
}

impl ModuleResolver {
	pub fn new() -> Self {
		Self::default()
	}
}

impl<L: ModuleLoader> ModuleResolver<L> {
	pub fn with_loader(loader: L) -> Self {
		Self { loader }
	}

	pub fn loader(&self) -> &L {
		&self.loader
	}

	/// Asks `device` where the app at `spec.path` is installed and loads the
	/// matching local executable.
	///
	/// `platform` names the platform in diagnostics. Transport failures are
	/// returned as [`ResolveError::ResolveFailed`] without searching.
	pub fn resolve<T: Transport>(
		&self,
		device: DeviceRef<'_, T>,
		spec: &ModuleSpec,
		archs: &ArchitectureList,
		platform: &str,
	) -> Result<ResolvedModule, ResolveError> {
		let host = spec.path.to_string_lossy();
		let located = device
			.transport()
			.resolve_executable(device.raw(), &host)
			.map_err(|message| {
				warn!(target = "devlink", host = %host, error = %message, "device could not resolve executable");
				ResolveError::ResolveFailed(message)
			})?;

		debug!(
			target = "devlink",
			app_id = %located.app_id,
			executable = %located.executable_name,
			container = %located.container_path,
			"device resolved executable"
		);
		self.resolve_located(&located, spec, archs, platform)
	}

	/// Loads the local executable for an install location the device already
	/// reported.
	pub fn resolve_located(
		&self,
		located: &ResolvedExecutable,
		spec: &ModuleSpec,
		archs: &ArchitectureList,
		platform: &str,
	) -> Result<ResolvedModule, ResolveError> {
		let candidate = spec.path.join(&located.executable_name);
		if !candidate.exists() {
			return Err(ResolveError::NotReadable { path: candidate });
		}
		let candidate_spec = spec.at(&candidate);

		if candidate_spec.is_exact() {
			match self.loader.load(&candidate_spec) {
				Ok(image) => return Ok(bind(image, located, Vec::new())),
				Err(e) => {
					debug!(target = "devlink", path = %candidate.display(), error = %e, "exact module not found, searching architectures");
				}
			}
		}

		let mut attempted = Vec::with_capacity(archs.len());
		for arch in archs {
			attempted.push(arch);
			let forced = ModuleSpec {
				architecture: Some(arch),
				..candidate_spec.clone()
			};
			match self.loader.load(&forced) {
				Ok(image) => {
					debug!(target = "devlink", path = %candidate.display(), %arch, "module resolved");
					return Ok(bind(image, located, attempted));
				}
				Err(e) => {
					debug!(target = "devlink", %arch, error = %e, "architecture did not load");
				}
			}
		}

		if !is_readable(&candidate) {
			return Err(ResolveError::NotReadable { path: candidate });
		}
		Err(ResolveError::NoMatchingArchitecture {
			path: candidate,
			platform: platform.to_string(),
			attempted,
		})
	}
}

fn bind(image: ModuleImage, located: &ResolvedExecutable, attempted: Vec<Architecture>) -> ResolvedModule {
	ResolvedModule {
		image,
		app_id: located.app_id.clone(),
		platform_path: located.remote_executable_path(),
		remote_install_path: located.container_path.clone(),
		attempted,
	}
}

fn is_readable(path: &Path) -> bool {
	File::open(path).is_ok()
}

//! Remote device debugging sessions for iOS and Android.
//!
//! Builds on [`devlink_runtime`] (transport boundary, connection bridge,
//! device tracker) and adds what a debugger needs on top:
//!
//! - [`module`] - local object files (Mach-O thin/fat, ELF)
//! - [`arch_list`] - priority-ordered architectures per platform
//! - [`resolver`] - matches an installed executable to a local module
//! - [`platform`] - connect to a device and resolve executables on it
//! - [`runtime`] - process-level registry owned by the application
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use devlink::{DeviceRuntime, ModuleSpec, SessionConfig};
//! use devlink_runtime::ffi::FfiTransport;
//!
//! devlink::logging::init_logging(devlink::logging::LogLevel::Sessions);
//! let runtime = DeviceRuntime::init(Arc::new(FfiTransport::new()), SessionConfig::from_env()?);
//! let platform = runtime.platform();
//! let status = platform.connect_remote("ios://00008030-001A2B3C4D5E6F");
//! if !status.is_success() {
//!     eprintln!("connect failed: {status}");
//! }
//! let module = platform.resolve_executable(&ModuleSpec::new("build/Demo.app"))?;
//! println!("{} -> {}", module.image.path.display(), module.platform_path);
//! ```

pub mod arch_list;
pub mod error;
pub mod logging;
pub mod module;
pub mod platform;
pub mod resolver;
pub mod runtime;

pub use arch_list::ArchitectureList;
pub use devlink_protocol::{
	Abi, Architecture, ConnectionStatus, DeviceEvent, DeviceInfo, DeviceUrl, Features, Platform,
	ResolvedExecutable,
};
pub use devlink_runtime::{
	Connection, ConnectionState, Device, DeviceRef, DeviceTracker, SessionConfig, Status,
	SubscriberKey, Transfer, Transport, list_devices,
};
pub use error::{Error, ResolveError, Result};
pub use module::{FileModuleLoader, ModuleImage, ModuleLoader, ModuleSpec};
pub use platform::RemotePlatform;
pub use resolver::{ModuleResolver, ResolvedModule};
pub use runtime::DeviceRuntime;

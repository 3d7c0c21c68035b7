//! Shared types for the devlink remote device session layer.
//!
//! Plain data exchanged between the transport boundary, the connection
//! bridge and the module resolver:
//!
//! - [`ConnectionStatus`] - status vocabulary of connection operations
//! - [`Platform`], [`Abi`], [`Features`], [`DeviceInfo`] - device attributes
//! - [`DeviceUrl`] - `ios://` / `android://` addresses
//! - [`Architecture`] - target architectures and object-file identifiers
//! - [`ResolvedExecutable`] - install location reported by a device

pub mod arch;
pub mod device;
pub mod executable;
pub mod status;
pub mod url;

pub use arch::{Architecture, UnknownArchitecture};
pub use device::{Abi, DeviceEvent, DeviceInfo, Features, Platform};
pub use executable::ResolvedExecutable;
pub use status::ConnectionStatus;
pub use url::{DeviceScheme, DeviceUrl, UrlError};

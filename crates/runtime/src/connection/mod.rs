//! Synchronous byte-stream connection over a transport debug session.
//!
//! A [`Connection`] holds at most one device and one debug session. One lock
//! serializes `connect`, `attach`, `disconnect`, `read`, `write` and
//! `is_connected`, so they never overlap on the same connection.
//!
//! [`Connection::interrupt_read`] never takes that lock, because a blocked
//! `read` holds it for its whole duration. Instead the connection keeps a
//! second, short-lived slot with a shared reference to the current session
//! and a pending flag:
//!
//! - the interrupt path clones the session out of the slot and calls the
//!   transport's interrupt entry point without holding the connection lock;
//! - `read` splits its wait into slices of at most the configured poll
//!   interval and checks the pending flag between slices, so an interrupt is
//!   delivered in bounded time even when the transport drops it.
//!
//! Raising the flag and calling the transport happen under a small delivery
//! lock that `read` also takes before acting on the flag. A read that finds
//! the flag raised first drains the transport with a zero timeout, which
//! consumes an interrupt the transport latched. Each `interrupt_read` yields
//! at most one `Interrupted` read.
//!
//! Because the slot holds an `Arc`, a session that is being interrupted is
//! released only after the interrupt call returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use devlink_protocol::ConnectionStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::handle::{Device, DeviceRef, Session};
use crate::status::{Status, Transfer};
use crate::tracker::open_device;
use crate::transport::{Transport, timeout_to_micros};

/// Lifecycle phase of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
	Disconnected = 0,
	Connecting = 1,
	Connected = 2,
}

impl ConnectionState {
	fn from_u8(value: u8) -> Self {
		match value {
			1 => Self::Connecting,
			2 => Self::Connected,
			_ => Self::Disconnected,
		}
	}
}

enum DeviceSlot<T: Transport> {
	/// Opened by this connection; released on reconnect or drop.
	Owned(Device<T>),
	/// Owned elsewhere; this connection only keeps it alive.
	Shared(Arc<Device<T>>),
}

impl<T: Transport> DeviceSlot<T> {
	fn device(&self) -> &Device<T> {
		match self {
			Self::Owned(device) => device,
			Self::Shared(device) => device,
		}
	}
}

struct Inner<T: Transport> {
	device: Option<DeviceSlot<T>>,
	session: Option<Arc<Session<T>>>,
}

struct InterruptSignal<T: Transport> {
	pending: AtomicBool,
	/// Held while the flag and the transport's latch change together.
	delivery: Mutex<()>,
	session: Mutex<Option<Arc<Session<T>>>>,
}

impl<T: Transport> InterruptSignal<T> {
	fn arm(&self, session: Arc<Session<T>>) {
		self.pending.store(false, Ordering::SeqCst);
		*self.session.lock() = Some(session);
	}

	fn disarm(&self) {
		self.pending.store(false, Ordering::SeqCst);
		self.session.lock().take();
	}

	fn current(&self) -> Option<Arc<Session<T>>> {
		self.session.lock().clone()
	}

	/// Clears the flag after the transport itself reported `Interrupted`.
	fn delivered(&self) {
		let _delivery = self.delivery.lock();
		self.pending.store(false, Ordering::SeqCst);
	}
}

/// One logical debugging connection to a remote device.
pub struct Connection<T: Transport> {
	transport: Arc<T>,
	endpoint: String,
	poll_interval: Option<Duration>,
	inner: Mutex<Inner<T>>,
	state: AtomicU8,
	interrupt: InterruptSignal<T>,
}

impl<T: Transport> Connection<T> {
	pub fn new(transport: Arc<T>, config: &SessionConfig) -> Self {
		Self {
			transport,
			endpoint: config.debug_endpoint.clone(),
			poll_interval: config.interrupt_poll_interval(),
			inner: Mutex::new(Inner {
				device: None,
				session: None,
			}),
			state: AtomicU8::new(ConnectionState::Disconnected as u8),
			interrupt: InterruptSignal {
				pending: AtomicBool::new(false),
				delivery: Mutex::new(()),
				session: Mutex::new(None),
			},
		}
	}

	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Current phase, read without taking the connection lock.
	pub fn state(&self) -> ConnectionState {
		ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
	}

	fn set_state(&self, state: ConnectionState) {
		self.state.store(state as u8, Ordering::SeqCst);
	}

	/// Connects to `url` (`ios://<id>` or `android://<id>`).
	///
	/// Any device and session already held are released first. If the device
	/// opens but the session does not, the device stays held and the
	/// transport's status is returned.
	pub fn connect(&self, url: &str) -> Status {
		let mut inner = self.inner.lock();
		self.set_state(ConnectionState::Connecting);
		self.release_locked(&mut inner);

		let device = match open_device(&self.transport, url) {
			Ok(device) => device,
			Err(e) => {
				warn!(target = "devlink", url, error = %e, "device connect failed");
				self.set_state(ConnectionState::Disconnected);
				return Status::error(e.to_string());
			}
		};

		inner.device = Some(DeviceSlot::Owned(device));
		self.open_session(&mut inner)
	}

	/// Creates a session on a device owned by someone else.
	///
	/// The connection keeps `device` alive but never releases it itself.
	pub fn attach(&self, device: Arc<Device<T>>) -> Status {
		let mut inner = self.inner.lock();
		self.set_state(ConnectionState::Connecting);
		self.release_locked(&mut inner);

		inner.device = Some(DeviceSlot::Shared(device));
		self.open_session(&mut inner)
	}

	fn open_session(&self, inner: &mut Inner<T>) -> Status {
		let Some(slot) = inner.device.as_ref() else {
			self.set_state(ConnectionState::Disconnected);
			return Status::no_connection();
		};

		match self
			.transport
			.create_session(slot.device().raw(), &self.endpoint)
		{
			Ok(raw) => {
				let session = Arc::new(Session::from_raw(Arc::clone(&self.transport), raw));
				self.interrupt.arm(Arc::clone(&session));
				inner.session = Some(session);
				self.set_state(ConnectionState::Connected);
				debug!(target = "devlink", endpoint = %self.endpoint, "debug session established");
				Status::success()
			}
			Err(status) => {
				warn!(target = "devlink", status = %status, "debug session creation failed");
				self.set_state(ConnectionState::Disconnected);
				status
			}
		}
	}

	/// Releases the session, then the device.
	fn release_locked(&self, inner: &mut Inner<T>) {
		self.interrupt.disarm();
		if inner.session.take().is_some() {
			trace!(target = "devlink", "dropped previous session");
		}
		if inner.device.take().is_some() {
			trace!(target = "devlink", "dropped previous device");
		}
	}

	/// Disconnects the debug session and releases it.
	///
	/// Returns `NoConnection` when no session is held. The device is kept so
	/// [`reconnect`](Self::reconnect) does not need to open it again; it is
	/// released by the next `connect`/`attach` or on drop.
	pub fn disconnect(&self) -> Status {
		let mut inner = self.inner.lock();
		let Some(session) = inner.session.take() else {
			return Status::no_connection();
		};

		let status = self.transport.session_disconnect(session.raw());
		self.interrupt.disarm();
		drop(session);
		self.set_state(ConnectionState::Disconnected);

		if status.is_success() {
			debug!(target = "devlink", "disconnected");
		} else {
			warn!(target = "devlink", status = %status, "disconnect reported failure");
		}
		status
	}

	/// Reopens a session on the device still held after [`disconnect`](Self::disconnect).
	pub fn reconnect(&self) -> Status {
		let mut inner = self.inner.lock();
		if inner.session.is_some() {
			return Status::success();
		}
		self.set_state(ConnectionState::Connecting);
		self.open_session(&mut inner)
	}

	/// Returns `true` if a session is held and the transport reports it live.
	pub fn is_connected(&self) -> bool {
		let inner = self.inner.lock();
		inner
			.session
			.as_ref()
			.is_some_and(|session| self.transport.session_is_connected(session.raw()))
	}

	/// Reads into `buf`, waiting up to `timeout` (`None` waits indefinitely).
	///
	/// Returns `NoConnection` with zero bytes immediately when no session is
	/// held.
	pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> Transfer {
		let inner = self.inner.lock();
		let Some(session) = inner.session.as_ref() else {
			return Transfer::no_connection();
		};

		let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
		loop {
			if let Some(transfer) = self.take_pending_interrupt(session, buf) {
				return transfer;
			}

			let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
			let slice = match (remaining, self.poll_interval) {
				(Some(remaining), Some(poll)) => Some(remaining.min(poll)),
				(Some(remaining), None) => Some(remaining),
				(None, poll) => poll,
			};

			let (bytes, status) = self
				.transport
				.session_read(session.raw(), buf, timeout_to_micros(slice));

			match status.code() {
				ConnectionStatus::TimedOut if bytes == 0 => {
					let expired = match deadline {
						Some(deadline) => Instant::now() >= deadline,
						None => false,
					};
					if expired || self.poll_interval.is_none() {
						return Transfer::new(0, status);
					}
				}
				ConnectionStatus::Interrupted => {
					self.interrupt.delivered();
					debug!(target = "devlink", "read interrupted");
					return Transfer::new(bytes, status);
				}
				_ => {
					trace!(target = "devlink", bytes, status = %status.code(), "read");
					return Transfer::new(bytes, status);
				}
			}
		}
	}

	/// Turns a raised interrupt flag into the result of this read.
	///
	/// The transport is drained first so an interrupt it latched is consumed
	/// here rather than by the following read. Data that was already waiting
	/// is returned instead of `Interrupted`.
	fn take_pending_interrupt(&self, session: &Session<T>, buf: &mut [u8]) -> Option<Transfer> {
		let _delivery = self.interrupt.delivery.lock();
		if !self.interrupt.pending.swap(false, Ordering::SeqCst) {
			return None;
		}

		let (bytes, status) = self.transport.session_read(session.raw(), buf, 0);
		if status.code() == ConnectionStatus::TimedOut && bytes == 0 {
			trace!(target = "devlink", "pending interrupt delivered by connection");
			return Some(Transfer::new(0, Status::interrupted()));
		}
		debug!(target = "devlink", bytes, status = %status.code(), "pending interrupt drained");
		Some(Transfer::new(bytes, status))
	}

	/// Writes `buf` to the session.
	pub fn write(&self, buf: &[u8]) -> Transfer {
		let inner = self.inner.lock();
		let Some(session) = inner.session.as_ref() else {
			return Transfer::no_connection();
		};

		let (bytes, status) = self.transport.session_write(session.raw(), buf);
		trace!(target = "devlink", bytes, status = %status.code(), "write");
		Transfer::new(bytes, status)
	}

	/// Asks a `read` blocked on another thread to return `Interrupted`.
	///
	/// Does not take the connection lock. Returns `false` when no session is
	/// held, or when the transport refuses the request and read slicing is
	/// disabled. An interrupt that arrives while no read is in progress makes
	/// the next read return `Interrupted`, unless data is already waiting.
	/// Later reads are unaffected.
	pub fn interrupt_read(&self) -> bool {
		let Some(session) = self.interrupt.current() else {
			return false;
		};

		let _delivery = self.interrupt.delivery.lock();
		self.interrupt.pending.store(true, Ordering::SeqCst);
		let delivered = self.transport.session_interrupt(session.raw());
		if delivered || self.poll_interval.is_some() {
			debug!(target = "devlink", delivered, "read interrupt requested");
			return true;
		}

		self.interrupt.pending.store(false, Ordering::SeqCst);
		warn!(target = "devlink", "transport refused read interrupt");
		false
	}

	/// Canonical URI of the connection. Always empty.
	pub fn uri(&self) -> &str {
		""
	}

	/// Runs `f` on the held device under the connection lock.
	pub fn with_device<R>(&self, f: impl FnOnce(DeviceRef<'_, T>) -> R) -> Option<R> {
		let inner = self.inner.lock();
		inner.device.as_ref().map(|slot| f(slot.device().view()))
	}

	/// Returns `true` if a device is held, with or without a session.
	pub fn has_device(&self) -> bool {
		self.inner.lock().device.is_some()
	}
}

impl<T: Transport> Drop for Connection<T> {
	fn drop(&mut self) {
		let inner = self.inner.get_mut();
		self.interrupt.disarm();
		inner.session.take();
		inner.device.take();
	}
}

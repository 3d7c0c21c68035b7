//! In-memory transport for tests.
//!
//! [`MockTransport`] keeps devices, sessions and trackers in process memory.
//! Session reads block on a condition variable until data is pushed, the
//! peer goes away, the read is interrupted or the timeout elapses. Handle
//! accounting panics on a second release of the same handle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use devlink_protocol::{
	Abi, ConnectionStatus, DeviceEvent, Features, Platform, ResolvedExecutable,
};
use parking_lot::{Condvar, Mutex};

use crate::status::Status;
use crate::transport::{DeviceEventSink, INFINITE_TIMEOUT_US, Transport};

/// Attributes of a simulated device.
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
	pub uid: String,
	pub name: String,
	pub os_version: String,
	pub brand: String,
	pub model: String,
	pub platform: Platform,
	pub abis: Abi,
	pub features: Features,
}

impl MockDeviceSpec {
	pub fn ios(uid: &str) -> Self {
		Self {
			uid: uid.to_string(),
			name: format!("iPhone ({uid})"),
			os_version: "17.4".to_string(),
			brand: "Apple".to_string(),
			model: "iPhone15,2".to_string(),
			platform: Platform::Ios,
			abis: Abi::ARM64,
			features: Features::DEBUG | Features::FILE_IO | Features::APP_LIST,
		}
	}

	pub fn android(uid: &str) -> Self {
		Self {
			uid: uid.to_string(),
			name: format!("Pixel ({uid})"),
			os_version: "14".to_string(),
			brand: "google".to_string(),
			model: "Pixel 8".to_string(),
			platform: Platform::Android,
			abis: Abi::ARM64 | Abi::ARM,
			features: Features::DEBUG | Features::SHELL | Features::SOCKET_FORWARD,
		}
	}

	pub fn with_name(mut self, name: &str) -> Self {
		self.name = name.to_string();
		self
	}

	pub fn with_abis(mut self, abis: Abi) -> Self {
		self.abis = abis;
		self
	}

	pub fn with_features(mut self, features: Features) -> Self {
		self.features = features;
		self
	}
}

/// Simulated device handle.
#[derive(Debug)]
pub struct MockDevice {
	id: u64,
	spec: Arc<MockDeviceSpec>,
}

impl MockDevice {
	/// Handle id; transient tracker devices use id `0`.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn spec(&self) -> &MockDeviceSpec {
		&self.spec
	}
}

/// Simulated debug-session handle.
#[derive(Debug)]
pub struct MockSession {
	id: u64,
	pipe: Arc<MockPipe>,
}

impl MockSession {
	pub fn id(&self) -> u64 {
		self.id
	}
}

/// Simulated tracker handle.
#[derive(Debug)]
pub struct MockTracker {
	id: u64,
}

#[derive(Debug, Default)]
struct PipeState {
	inbound: VecDeque<u8>,
	outbound: Vec<u8>,
	connected: bool,
	eof: bool,
	lost: bool,
	interrupted: bool,
	blocked_readers: usize,
}

/// Byte stream behind a [`MockSession`], driven by the test as the remote peer.
#[derive(Debug, Default)]
pub struct MockPipe {
	state: Mutex<PipeState>,
	cond: Condvar,
}

impl MockPipe {
	/// Makes `bytes` available to the next read.
	pub fn push_inbound(&self, bytes: &[u8]) {
		self.state.lock().inbound.extend(bytes.iter().copied());
		self.cond.notify_all();
	}

	/// Drains everything written to the session so far.
	pub fn take_outbound(&self) -> Vec<u8> {
		std::mem::take(&mut self.state.lock().outbound)
	}

	/// Peer closes the stream cleanly; reads return `EndOfFile` once drained.
	pub fn close(&self) {
		self.state.lock().eof = true;
		self.cond.notify_all();
	}

	/// Peer disappears; reads and writes return `LostConnection`.
	pub fn drop_peer(&self) {
		let mut state = self.state.lock();
		state.lost = true;
		state.connected = false;
		drop(state);
		self.cond.notify_all();
	}

	/// Number of threads currently blocked in a read.
	pub fn blocked_readers(&self) -> usize {
		self.state.lock().blocked_readers
	}

	/// Waits until a reader is blocked or `timeout` elapses.
	pub fn wait_for_blocked_reader(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		while Instant::now() < deadline {
			if self.blocked_readers() > 0 {
				return true;
			}
			std::thread::sleep(Duration::from_millis(1));
		}
		false
	}
}

/// How the mock reacts to `session_interrupt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptMode {
	/// Interrupts wake a blocked read and latch for the next read.
	Latching,
	/// Interrupts only affect a read that is already blocked.
	WakeOnly,
	/// Interrupts are refused and have no effect.
	Unsupported,
}

struct TrackerEntry {
	sink: DeviceEventSink<MockDevice>,
	running: bool,
}

#[derive(Default)]
struct MockState {
	devices: Vec<(String, Arc<MockDeviceSpec>)>,
	connect_errors: HashMap<String, String>,
	session_failure: Option<Status>,
	disconnect_status: Option<Status>,
	resolutions: HashMap<String, Result<ResolvedExecutable, String>>,
	live_devices: HashSet<u64>,
	device_releases: usize,
	live_sessions: HashSet<u64>,
	session_releases: usize,
	pipes: Vec<Arc<MockPipe>>,
	endpoints: Vec<String>,
	read_timeouts: Vec<u64>,
	resolve_calls: usize,
	trackers: HashMap<u64, TrackerEntry>,
}

/// In-memory [`Transport`] implementation.
pub struct MockTransport {
	state: Mutex<MockState>,
	next_id: AtomicU64,
	interrupt_mode: Mutex<InterruptMode>,
}

impl Default for MockTransport {
	fn default() -> Self {
		Self::new()
	}
}

impl MockTransport {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MockState::default()),
			next_id: AtomicU64::new(1),
			interrupt_mode: Mutex::new(InterruptMode::Latching),
		}
	}

	fn next_id(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::SeqCst)
	}

	/// Registers a device reachable at `url`.
	pub fn add_device(&self, url: &str, spec: MockDeviceSpec) {
		let mut state = self.state.lock();
		state.devices.retain(|(u, _)| u != url);
		state.devices.push((url.to_string(), Arc::new(spec)));
	}

	/// Makes `connect_device(url)` fail with `message`.
	pub fn fail_connect(&self, url: &str, message: &str) {
		self.state
			.lock()
			.connect_errors
			.insert(url.to_string(), message.to_string());
	}

	/// Makes every `create_session` fail with `status` (`None` restores success).
	pub fn fail_sessions(&self, status: Option<Status>) {
		self.state.lock().session_failure = status;
	}

	/// Status returned by `session_disconnect` (default: success).
	pub fn set_disconnect_status(&self, status: Status) {
		self.state.lock().disconnect_status = Some(status);
	}

	pub fn set_interrupt_mode(&self, mode: InterruptMode) {
		*self.interrupt_mode.lock() = mode;
	}

	/// Answer for `resolve_executable(_, host_path)`.
	pub fn set_resolution(&self, host_path: &str, result: Result<ResolvedExecutable, String>) {
		self.state
			.lock()
			.resolutions
			.insert(host_path.to_string(), result);
	}

	/// Pipe of the most recently created session.
	pub fn last_pipe(&self) -> Option<Arc<MockPipe>> {
		self.state.lock().pipes.last().cloned()
	}

	pub fn live_devices(&self) -> usize {
		self.state.lock().live_devices.len()
	}

	pub fn device_releases(&self) -> usize {
		self.state.lock().device_releases
	}

	pub fn live_sessions(&self) -> usize {
		self.state.lock().live_sessions.len()
	}

	pub fn session_releases(&self) -> usize {
		self.state.lock().session_releases
	}

	/// Endpoints passed to `create_session`, in call order.
	pub fn endpoints(&self) -> Vec<String> {
		self.state.lock().endpoints.clone()
	}

	/// Timeouts passed to `session_read`, in call order.
	pub fn read_timeouts(&self) -> Vec<u64> {
		self.state.lock().read_timeouts.clone()
	}

	pub fn resolve_calls(&self) -> usize {
		self.state.lock().resolve_calls
	}

	/// Trackers created and not yet released.
	pub fn tracker_count(&self) -> usize {
		self.state.lock().trackers.len()
	}

	/// Delivers `event` for the device at `url` to every running tracker,
	/// on the calling thread. Returns the number of trackers reached.
	pub fn emit(&self, event: DeviceEvent, url: &str) -> usize {
		let (spec, sinks) = {
			let state = self.state.lock();
			let Some(spec) = state
				.devices
				.iter()
				.find(|(u, _)| u == url)
				.map(|(_, s)| Arc::clone(s))
			else {
				return 0;
			};
			let sinks: Vec<_> = state
				.trackers
				.values()
				.filter(|t| t.running)
				.map(|t| Arc::clone(&t.sink))
				.collect();
			(spec, sinks)
		};

		let transient = MockDevice { id: 0, spec };
		for sink in &sinks {
			sink(event, &transient);
		}
		sinks.len()
	}

	fn new_device(&self, spec: Arc<MockDeviceSpec>) -> MockDevice {
		let id = self.next_id();
		self.state.lock().live_devices.insert(id);
		MockDevice { id, spec }
	}
}

impl Transport for MockTransport {
	type Device = MockDevice;
	type Session = MockSession;
	type Tracker = MockTracker;

	fn connect_device(&self, url: &str) -> Result<MockDevice, String> {
		let spec = {
			let state = self.state.lock();
			if let Some(message) = state.connect_errors.get(url) {
				return Err(message.clone());
			}
			state
				.devices
				.iter()
				.find(|(u, _)| u == url)
				.map(|(_, s)| Arc::clone(s))
				.ok_or_else(|| format!("device not found: {url}"))?
		};
		Ok(self.new_device(spec))
	}

	fn list_devices(&self) -> Vec<MockDevice> {
		let specs: Vec<_> = self
			.state
			.lock()
			.devices
			.iter()
			.map(|(_, s)| Arc::clone(s))
			.collect();
		specs.into_iter().map(|s| self.new_device(s)).collect()
	}

	fn clone_device(&self, device: &MockDevice) -> MockDevice {
		self.new_device(Arc::clone(&device.spec))
	}

	fn release_device(&self, device: MockDevice) {
		let mut state = self.state.lock();
		if !state.live_devices.remove(&device.id) {
			panic!("device handle {} released twice", device.id);
		}
		state.device_releases += 1;
	}

	fn device_uid(&self, device: &MockDevice) -> String {
		device.spec.uid.clone()
	}

	fn device_os_version(&self, device: &MockDevice) -> String {
		device.spec.os_version.clone()
	}

	fn device_brand(&self, device: &MockDevice) -> String {
		device.spec.brand.clone()
	}

	fn device_name(&self, device: &MockDevice) -> String {
		device.spec.name.clone()
	}

	fn device_model(&self, device: &MockDevice) -> String {
		device.spec.model.clone()
	}

	fn device_platform(&self, device: &MockDevice) -> Platform {
		device.spec.platform
	}

	fn device_supports_abi(&self, device: &MockDevice, abi: Abi) -> bool {
		device.spec.abis.contains(abi)
	}

	fn device_features(&self, device: &MockDevice) -> Features {
		device.spec.features
	}

	fn create_session(&self, _device: &MockDevice, endpoint: &str) -> Result<MockSession, Status> {
		let mut state = self.state.lock();
		state.endpoints.push(endpoint.to_string());
		if let Some(status) = state.session_failure.clone() {
			return Err(status);
		}

		let pipe = Arc::new(MockPipe::default());
		pipe.state.lock().connected = true;
		let id = self.next_id();
		state.live_sessions.insert(id);
		state.pipes.push(Arc::clone(&pipe));
		Ok(MockSession { id, pipe })
	}

	fn session_is_connected(&self, session: &MockSession) -> bool {
		let pipe = session.pipe.state.lock();
		pipe.connected && !pipe.lost
	}

	fn session_read(&self, session: &MockSession, buf: &mut [u8], timeout_us: u64) -> (usize, Status) {
		self.state.lock().read_timeouts.push(timeout_us);

		let deadline = (timeout_us != INFINITE_TIMEOUT_US)
			.then(|| Instant::now() + Duration::from_micros(timeout_us));
		let pipe = &session.pipe;
		let mut state = pipe.state.lock();

		loop {
			if state.interrupted {
				state.interrupted = false;
				return (0, Status::interrupted());
			}
			if state.lost {
				return (
					0,
					Status::new(ConnectionStatus::LostConnection, Some("peer vanished".into())),
				);
			}
			if !state.inbound.is_empty() {
				let n = buf.len().min(state.inbound.len());
				for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
					*slot = byte;
				}
				return (n, Status::success());
			}
			if state.eof {
				return (0, Status::from(ConnectionStatus::EndOfFile));
			}

			state.blocked_readers += 1;
			let timed_out = match deadline {
				Some(deadline) => pipe.cond.wait_until(&mut state, deadline).timed_out(),
				None => {
					pipe.cond.wait(&mut state);
					false
				}
			};
			state.blocked_readers -= 1;

			if timed_out && state.inbound.is_empty() && !state.interrupted && !state.lost {
				return (0, Status::timed_out());
			}
		}
	}

	fn session_write(&self, session: &MockSession, buf: &[u8]) -> (usize, Status) {
		let mut state = session.pipe.state.lock();
		if state.lost {
			return (0, Status::from(ConnectionStatus::LostConnection));
		}
		state.outbound.extend_from_slice(buf);
		(buf.len(), Status::success())
	}

	fn session_disconnect(&self, session: &MockSession) -> Status {
		session.pipe.state.lock().connected = false;
		session.pipe.cond.notify_all();
		self.state
			.lock()
			.disconnect_status
			.clone()
			.unwrap_or_else(Status::success)
	}

	fn session_interrupt(&self, session: &MockSession) -> bool {
		let mode = *self.interrupt_mode.lock();
		let mut state = session.pipe.state.lock();
		match mode {
			InterruptMode::Unsupported => return false,
			InterruptMode::WakeOnly if state.blocked_readers == 0 => return true,
			InterruptMode::Latching | InterruptMode::WakeOnly => state.interrupted = true,
		}
		drop(state);
		session.pipe.cond.notify_all();
		true
	}

	fn release_session(&self, session: MockSession) {
		let mut state = self.state.lock();
		if !state.live_sessions.remove(&session.id) {
			panic!("session handle {} released twice", session.id);
		}
		state.session_releases += 1;
	}

	fn resolve_executable(&self, _device: &MockDevice, host_path: &str) -> Result<ResolvedExecutable, String> {
		let mut state = self.state.lock();
		state.resolve_calls += 1;
		state
			.resolutions
			.get(host_path)
			.cloned()
			.unwrap_or_else(|| Err(format!("no installed app matches '{host_path}'")))
	}

	fn create_tracker(&self, sink: DeviceEventSink<MockDevice>) -> MockTracker {
		let id = self.next_id();
		self.state
			.lock()
			.trackers
			.insert(id, TrackerEntry { sink, running: false });
		MockTracker { id }
	}

	fn tracker_start(&self, tracker: &MockTracker) {
		if let Some(entry) = self.state.lock().trackers.get_mut(&tracker.id) {
			entry.running = true;
		}
	}

	fn tracker_stop(&self, tracker: &MockTracker) {
		if let Some(entry) = self.state.lock().trackers.get_mut(&tracker.id) {
			entry.running = false;
		}
	}

	fn release_tracker(&self, tracker: MockTracker) {
		if self.state.lock().trackers.remove(&tracker.id).is_none() {
			panic!("tracker handle {} released twice", tracker.id);
		}
	}
}

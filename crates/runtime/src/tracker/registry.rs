//! Concurrent subscriber registry for device events.
//!
//! Uses [`DashMap`] so subscribers can be added and removed from any thread,
//! including the delivery thread. Each subscriber carries a re-entrant gate:
//! delivery holds it while the callback runs, and removal closes it under the
//! same gate. Removal therefore waits for an in-flight delivery to that key,
//! while a callback removing its own key re-enters the gate instead of
//! deadlocking.

use std::cell::Cell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use devlink_protocol::DeviceEvent;
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::handle::DeviceRef;
use crate::transport::Transport;

/// Opaque key identifying one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberKey(pub u64);

impl SubscriberKey {
	/// Mints a key unique within this process.
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for SubscriberKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "subscriber#{}", self.0)
	}
}

/// Subscriber callback. The device reference is valid only during the call.
pub type SubscriberCallback<T> =
	Box<dyn Fn(DeviceEvent, DeviceRef<'_, T>, SubscriberKey) + Send + Sync>;

struct Subscriber<T: Transport> {
	callback: SubscriberCallback<T>,
	gate: ReentrantMutex<Cell<bool>>,
}

impl<T: Transport> Subscriber<T> {
	fn close(&self) {
		self.gate.lock().set(false);
	}
}

pub(crate) struct SubscriberRegistry<T: Transport> {
	subscribers: DashMap<SubscriberKey, Arc<Subscriber<T>>>,
}

impl<T: Transport> SubscriberRegistry<T> {
	pub(crate) fn new() -> Self {
		Self {
			subscribers: DashMap::new(),
		}
	}

	/// Inserts a subscriber, closing any previous one with the same key.
	/// Returns `true` if one was replaced.
	pub(crate) fn insert(&self, key: SubscriberKey, callback: SubscriberCallback<T>) -> bool {
		let subscriber = Arc::new(Subscriber {
			callback,
			gate: ReentrantMutex::new(Cell::new(true)),
		});
		match self.subscribers.insert(key, subscriber) {
			Some(previous) => {
				previous.close();
				true
			}
			None => false,
		}
	}

	/// Removes and closes a subscriber. After this returns the subscriber's
	/// callback is not running on another thread and will not run again.
	pub(crate) fn remove(&self, key: SubscriberKey) -> bool {
		match self.subscribers.remove(&key) {
			Some((_, subscriber)) => {
				subscriber.close();
				true
			}
			None => false,
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.subscribers.len()
	}

	/// Delivers one event to every open subscriber. Returns how many ran.
	pub(crate) fn dispatch(&self, event: DeviceEvent, device: DeviceRef<'_, T>) -> usize {
		let snapshot: Vec<(SubscriberKey, Arc<Subscriber<T>>)> = self
			.subscribers
			.iter()
			.map(|entry| (*entry.key(), Arc::clone(entry.value())))
			.collect();

		let mut delivered = 0;
		for (key, subscriber) in snapshot {
			let gate = subscriber.gate.lock();
			if !gate.get() {
				continue;
			}

			let outcome = catch_unwind(AssertUnwindSafe(|| {
				(subscriber.callback)(event, device, key);
			}));
			drop(gate);

			match outcome {
				Ok(()) => delivered += 1,
				Err(_) => warn!(target = "devlink", %key, ?event, "device event subscriber panicked"),
			}
		}
		delivered
	}
}

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use devlink_protocol::{DeviceEvent, Platform};

use super::*;
use crate::testing::{MockDeviceSpec, MockTransport};

const URL: &str = "android://R58M12345";

fn create_test_tracker() -> (Arc<MockTransport>, DeviceTracker<MockTransport>) {
	let transport = Arc::new(MockTransport::new());
	transport.add_device(URL, MockDeviceSpec::android("R58M12345"));
	let tracker = DeviceTracker::new(Arc::clone(&transport));
	(transport, tracker)
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(DeviceEvent, DeviceRef<'_, MockTransport>, SubscriberKey) + Send + Sync + 'static) {
	let hits = Arc::new(AtomicUsize::new(0));
	let seen = Arc::clone(&hits);
	(hits, move |_: DeviceEvent, _: DeviceRef<'_, MockTransport>, _: SubscriberKey| {
		seen.fetch_add(1, Ordering::SeqCst);
	})
}

#[test]
fn test_events_flow_only_while_running() {
	let (transport, tracker) = create_test_tracker();
	let (hits, callback) = counter();
	tracker.add_subscriber(SubscriberKey::next(), callback);

	assert_eq!(transport.emit(DeviceEvent::Online, URL), 0);
	tracker.start();
	assert!(tracker.is_running());
	assert_eq!(transport.emit(DeviceEvent::Online, URL), 1);
	tracker.stop();
	assert_eq!(transport.emit(DeviceEvent::Offline, URL), 0);

	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_sees_event_device_and_key() {
	let (transport, tracker) = create_test_tracker();
	let key = SubscriberKey(42);
	let seen = Arc::new(Mutex::new(Vec::new()));

	let sink = Arc::clone(&seen);
	tracker.add_subscriber(key, move |event, device, key| {
		sink.lock().unwrap().push((event, device.uid(), device.platform(), key));
	});
	tracker.start();
	transport.emit(DeviceEvent::Online, URL);
	transport.emit(DeviceEvent::Offline, URL);

	assert_eq!(
		*seen.lock().unwrap(),
		vec![
			(DeviceEvent::Online, "R58M12345".to_string(), Platform::Android, key),
			(DeviceEvent::Offline, "R58M12345".to_string(), Platform::Android, key),
		]
	);
}

#[test]
fn test_promoted_device_outlives_callback() {
	let (transport, tracker) = create_test_tracker();
	let kept = Arc::new(Mutex::new(Vec::new()));

	let store = Arc::clone(&kept);
	tracker.add_subscriber(SubscriberKey::next(), move |_, device, _| {
		store.lock().unwrap().push(device.promote());
	});
	tracker.start();
	transport.emit(DeviceEvent::Online, URL);

	assert_eq!(transport.live_devices(), 1);
	let device = kept.lock().unwrap().pop().unwrap();
	assert_eq!(device.view().uid(), "R58M12345");
	drop(device);
	assert_eq!(transport.live_devices(), 0);
}

#[test]
fn test_remove_subscriber_stops_delivery() {
	let (transport, tracker) = create_test_tracker();
	let key = SubscriberKey::next();
	let (hits, callback) = counter();
	tracker.add_subscriber(key, callback);
	tracker.start();

	transport.emit(DeviceEvent::Online, URL);
	assert!(tracker.remove_subscriber(key));
	assert!(!tracker.remove_subscriber(key));
	transport.emit(DeviceEvent::Online, URL);

	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(tracker.subscriber_count(), 0);
}

#[test]
fn test_same_key_replaces_subscriber() {
	let (transport, tracker) = create_test_tracker();
	let key = SubscriberKey(7);
	let (first, first_cb) = counter();
	let (second, second_cb) = counter();

	assert!(!tracker.add_subscriber(key, first_cb));
	assert!(tracker.add_subscriber(key, second_cb));
	tracker.start();
	transport.emit(DeviceEvent::Online, URL);

	assert_eq!(first.load(Ordering::SeqCst), 0);
	assert_eq!(second.load(Ordering::SeqCst), 1);
	assert_eq!(tracker.subscriber_count(), 1);
}

#[test]
fn test_remove_inside_own_callback() {
	let (transport, tracker) = create_test_tracker();
	let tracker = Arc::new(tracker);
	let key = SubscriberKey::next();
	let hits = Arc::new(AtomicUsize::new(0));

	let weak = Arc::downgrade(&tracker);
	let seen = Arc::clone(&hits);
	tracker.add_subscriber(key, move |_, _, key| {
		seen.fetch_add(1, Ordering::SeqCst);
		if let Some(tracker) = weak.upgrade() {
			assert!(tracker.remove_subscriber(key));
		}
	});
	tracker.start();

	let emitter = Arc::clone(&transport);
	let handle = thread::spawn(move || {
		emitter.emit(DeviceEvent::Online, URL);
		emitter.emit(DeviceEvent::Online, URL);
	});
	handle.join().unwrap();

	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(tracker.subscriber_count(), 0);
}

#[test]
fn test_add_inside_callback() {
	let (transport, tracker) = create_test_tracker();
	let tracker = Arc::new(tracker);
	let (late_hits, late_cb) = counter();
	let late_cb = Mutex::new(Some(late_cb));

	let weak = Arc::downgrade(&tracker);
	tracker.add_subscriber(SubscriberKey::next(), move |_, _, _| {
		if let (Some(tracker), Some(cb)) = (weak.upgrade(), late_cb.lock().unwrap().take()) {
			tracker.add_subscriber(SubscriberKey::next(), cb);
		}
	});
	tracker.start();

	transport.emit(DeviceEvent::Online, URL);
	transport.emit(DeviceEvent::Online, URL);

	assert_eq!(tracker.subscriber_count(), 2);
	assert_eq!(late_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_subscriber_does_not_stop_others() {
	let (transport, tracker) = create_test_tracker();
	let (hits, callback) = counter();
	tracker.add_subscriber(SubscriberKey(1), |_, _, _| panic!("subscriber bug"));
	tracker.add_subscriber(SubscriberKey(2), callback);
	tracker.start();

	assert_eq!(transport.emit(DeviceEvent::Online, URL), 1);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(tracker.subscriber_count(), 2);
}

#[test]
fn test_rapid_add_remove_during_delivery() {
	let (transport, tracker) = create_test_tracker();
	let tracker = Arc::new(tracker);
	tracker.start();

	let stop = Arc::new(AtomicBool::new(false));
	let emitter = {
		let transport = Arc::clone(&transport);
		let stop = Arc::clone(&stop);
		thread::spawn(move || {
			let mut rounds = 0usize;
			while !stop.load(Ordering::SeqCst) {
				transport.emit(DeviceEvent::Online, URL);
				rounds += 1;
			}
			rounds
		})
	};

	let key = SubscriberKey::next();
	let violations = Arc::new(AtomicUsize::new(0));
	for _ in 0..2_000 {
		let closed = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&closed);
		let violations_cb = Arc::clone(&violations);
		tracker.add_subscriber(key, move |_, _, _| {
			if flag.load(Ordering::SeqCst) {
				violations_cb.fetch_add(1, Ordering::SeqCst);
			}
		});
		tracker.remove_subscriber(key);
		closed.store(true, Ordering::SeqCst);
	}

	thread::sleep(Duration::from_millis(10));
	stop.store(true, Ordering::SeqCst);
	let rounds = emitter.join().unwrap();

	assert!(rounds > 0);
	assert_eq!(violations.load(Ordering::SeqCst), 0);
	assert_eq!(tracker.subscriber_count(), 0);
}

#[test]
fn test_drop_releases_transport_tracker() {
	let (transport, tracker) = create_test_tracker();
	tracker.start();
	assert_eq!(transport.tracker_count(), 1);

	drop(tracker);
	assert_eq!(transport.tracker_count(), 0);
	assert_eq!(transport.emit(DeviceEvent::Online, URL), 0);
}

#[test]
fn test_list_devices_returns_owned_handles() {
	let transport = Arc::new(MockTransport::new());
	transport.add_device("ios://a", MockDeviceSpec::ios("a"));
	transport.add_device("android://b", MockDeviceSpec::android("b"));

	let devices = list_devices(&transport);
	let uids: Vec<String> = devices.iter().map(|d| d.view().uid()).collect();
	assert_eq!(uids, vec!["a".to_string(), "b".to_string()]);
	assert_eq!(transport.live_devices(), 2);

	drop(devices);
	assert_eq!(transport.live_devices(), 0);
}

#[test]
fn test_open_device_normalizes_url() {
	let (transport, _tracker) = create_test_tracker();

	let device = open_device(&transport, "android://R58M12345:5555/debug?x=1").unwrap();
	assert_eq!(device.view().platform(), Platform::Android);
	assert_eq!(transport.live_devices(), 1);
}

#[test]
fn test_open_device_errors_are_classified() {
	let (transport, _tracker) = create_test_tracker();

	let err = open_device(&transport, "usb://R58M12345").unwrap_err();
	assert!(matches!(err, Error::InvalidUrl(_)));

	transport.fail_connect(URL, "adb: device unauthorized");
	let err = open_device(&transport, URL).unwrap_err();
	assert_eq!(err.transport_message(), Some("adb: device unauthorized"));
	assert_eq!(err.to_string(), "adb: device unauthorized");
	assert_eq!(transport.live_devices(), 0);
}

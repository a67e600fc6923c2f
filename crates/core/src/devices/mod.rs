//! Typed device drivers behind the peripheral seam.
//!
//! The factory owns the kind-to-driver table; every device kind this
//! crate understands is constructed here when the hub announces it.
//! Drivers keep their latest readings in atomics and feed pending value
//! watches as updates arrive, so callers never block the receive loop.

mod color;
mod distance;
mod motor;

pub use color::ColorSensor;
pub use distance::DistanceSensor;
pub use motor::Motor;

use brickline_protocol::{DeviceKind, Port};
use brickline_runtime::{DeviceFactory, Metric, Peripheral, Session, ValueWatcher, WatchPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Builds the drivers this crate ships.
pub struct HubDeviceFactory;

impl DeviceFactory for HubDeviceFactory {
	fn create_device(
		&self,
		session: &Arc<Session>,
		port: Port,
		kind: DeviceKind,
	) -> Option<Arc<dyn Peripheral>> {
		match kind {
			DeviceKind::Motor => Some(Arc::new(Motor::new(session, port))),
			DeviceKind::DistanceSensor => Some(Arc::new(DistanceSensor::new(session, port))),
			DeviceKind::ColorSensor => Some(Arc::new(ColorSensor::new(session, port))),
			DeviceKind::None | DeviceKind::Unknown(_) => None,
		}
	}
}

/// Latest value of one device metric plus its pending watches.
pub(crate) struct Reading {
	value: AtomicI32,
	watches: Arc<WatchPool>,
}

impl Reading {
	pub(crate) fn new(initial: i32) -> Reading {
		Reading { value: AtomicI32::new(initial), watches: Arc::new(WatchPool::new()) }
	}

	pub(crate) fn get(&self) -> i32 {
		self.value.load(Ordering::SeqCst)
	}

	/// Stores `next`; on change, records the metric and feeds the watches.
	pub(crate) fn apply(&self, metric: Metric, next: i32, changed: &mut Vec<Metric>) {
		let previous = self.value.swap(next, Ordering::SeqCst);
		if previous != next {
			changed.push(metric);
			self.watches.publish(next);
		}
	}

	pub(crate) fn watch(&self, target: i32, tolerance: i32) -> ValueWatcher {
		self.watches.watch(target, tolerance)
	}

	pub(crate) fn watches(&self) -> Arc<WatchPool> {
		Arc::clone(&self.watches)
	}

	/// Settles pending watches with a closed-channel failure.
	pub(crate) fn close(&self) {
		self.watches.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use brickline_runtime::mock::MockTransport;
	use std::time::Duration;

	fn test_session() -> Arc<Session> {
		let (transport, _wire) = MockTransport::create();
		Arc::new(Session::new("hub-0", Box::new(transport)))
	}

	#[test]
	fn test_factory_builds_drivers_for_known_kinds() {
		let factory = HubDeviceFactory;
		let session = test_session();

		let motor = factory.create_device(&session, Port::A, DeviceKind::Motor).unwrap();
		assert_eq!(motor.kind(), DeviceKind::Motor);
		assert_eq!(motor.port(), Port::A);

		let distance =
			factory.create_device(&session, Port::B, DeviceKind::DistanceSensor).unwrap();
		assert_eq!(distance.kind(), DeviceKind::DistanceSensor);

		let color = factory.create_device(&session, Port::C, DeviceKind::ColorSensor).unwrap();
		assert_eq!(color.kind(), DeviceKind::ColorSensor);
	}

	#[test]
	fn test_factory_skips_empty_and_unknown_kinds() {
		let factory = HubDeviceFactory;
		let session = test_session();

		assert!(factory.create_device(&session, Port::D, DeviceKind::None).is_none());
		assert!(factory.create_device(&session, Port::D, DeviceKind::Unknown(34)).is_none());
	}

	#[test]
	fn test_reading_records_changes_only() {
		let reading = Reading::new(0);
		let mut changed = Vec::new();

		reading.apply(Metric::Speed, 10, &mut changed);
		reading.apply(Metric::Speed, 10, &mut changed);
		reading.apply(Metric::Speed, 12, &mut changed);

		assert_eq!(changed, vec![Metric::Speed, Metric::Speed]);
		assert_eq!(reading.get(), 12);
	}

	#[tokio::test]
	async fn test_reading_feeds_watches_on_change() {
		let reading = Reading::new(0);
		let watcher = reading.watch(50, 5);
		let mut changed = Vec::new();

		reading.apply(Metric::Distance, 48, &mut changed);

		let value = watcher.wait(Duration::from_secs(1)).await.unwrap();
		assert_eq!(value, 53);
	}
}

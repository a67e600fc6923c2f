//! Ultrasonic distance sensor driver.

use crate::command::Command;
use crate::devices::Reading;
use brickline_protocol::telemetry::{self, DISTANCE_OUT_OF_RANGE};
use brickline_protocol::{DeviceKind, Port};
use brickline_runtime::{Error, Metric, Peripheral, Result, Session, ValueWatcher};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Ultrasonic ranger. Reports centimeters, or [`DISTANCE_OUT_OF_RANGE`]
/// when nothing reflects.
pub struct DistanceSensor {
	session: Weak<Session>,
	port: Port,
	detached: AtomicBool,
	distance: Reading,
}

impl DistanceSensor {
	pub(crate) fn new(session: &Arc<Session>, port: Port) -> DistanceSensor {
		DistanceSensor {
			session: Arc::downgrade(session),
			port,
			detached: AtomicBool::new(false),
			distance: Reading::new(DISTANCE_OUT_OF_RANGE as i32),
		}
	}

	pub fn port(&self) -> Port {
		self.port
	}

	/// Latest distance in centimeters, [`DISTANCE_OUT_OF_RANGE`] when no
	/// echo came back.
	pub fn distance(&self) -> i32 {
		self.distance.get()
	}

	/// True while something sits in front of the sensor.
	pub fn in_range(&self) -> bool {
		i64::from(self.distance.get()) != DISTANCE_OUT_OF_RANGE
	}

	/// Resolves once the distance lands within `tolerance` of `target`.
	pub fn watch_distance(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.distance.watch(target, tolerance))
	}

	/// Sets the four corner lights, brightness 0 to 100 each.
	pub fn light_up(&self, lights: [u8; 4]) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.ultrasonic_light_up",
			json!({ "port": self.port, "lights": lights }),
		))
	}

	/// Turns all four corner lights off.
	pub fn lights_off(&self) -> Result<Command> {
		self.light_up([0, 0, 0, 0])
	}

	fn guard(&self) -> Result<Arc<Session>> {
		if self.detached.load(Ordering::SeqCst) {
			return Err(Error::StaleDevice { port: self.port, kind: DeviceKind::DistanceSensor });
		}
		self.session.upgrade().ok_or(Error::NotActive)
	}
}

impl Peripheral for DistanceSensor {
	fn port(&self) -> Port {
		self.port
	}

	fn kind(&self) -> DeviceKind {
		DeviceKind::DistanceSensor
	}

	fn apply_update(&self, payload: &Value) -> Vec<Metric> {
		let mut changed = Vec::new();
		self.distance.apply(
			Metric::Distance,
			telemetry::int_at_or(payload, 0, DISTANCE_OUT_OF_RANGE) as i32,
			&mut changed,
		);
		changed
	}

	fn detach(&self) {
		self.detached.store(true, Ordering::SeqCst);
		self.distance.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use brickline_runtime::mock::MockTransport;

	fn sensor_on_b() -> (Arc<Session>, DistanceSensor) {
		let (transport, _wire) = MockTransport::create();
		let session = Arc::new(Session::new("hub-0", Box::new(transport)));
		let sensor = DistanceSensor::new(&session, Port::B);
		(session, sensor)
	}

	#[test]
	fn test_starts_out_of_range() {
		let (_session, sensor) = sensor_on_b();
		assert_eq!(sensor.distance(), 201);
		assert!(!sensor.in_range());
	}

	#[test]
	fn test_update_tracks_range_state() {
		let (_session, sensor) = sensor_on_b();

		sensor.apply_update(&json!([42]));
		assert_eq!(sensor.distance(), 42);
		assert!(sensor.in_range());

		// A null slot means the echo was lost.
		sensor.apply_update(&json!([null]));
		assert!(!sensor.in_range());
	}

	#[test]
	fn test_stale_sensor_refuses_commands() {
		let (_session, sensor) = sensor_on_b();
		sensor.detach();

		let error = sensor.light_up([100, 0, 0, 100]).unwrap_err();
		assert!(error.is_stale_device());
	}
}

//! Color and reflectivity sensor driver.

use crate::command::Command;
use crate::devices::Reading;
use brickline_protocol::telemetry::{self, COLOR_NO_READING};
use brickline_protocol::{ColorSensorMode, DeviceKind, Port};
use brickline_runtime::{Error, Metric, Peripheral, Result, Session, ValueWatcher};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Update slot layout: `[reflection, color, red, green, blue]`.
const REFLECTION: usize = 0;
const COLOR: usize = 1;
const RED: usize = 2;
const GREEN: usize = 3;
const BLUE: usize = 4;

/// Combined color and reflected-light sensor. Every metric reads
/// [`COLOR_NO_READING`] until the sensor has seen something.
pub struct ColorSensor {
	session: Weak<Session>,
	port: Port,
	detached: AtomicBool,
	reflection: Reading,
	color: Reading,
	red: Reading,
	green: Reading,
	blue: Reading,
}

impl ColorSensor {
	pub(crate) fn new(session: &Arc<Session>, port: Port) -> ColorSensor {
		ColorSensor {
			session: Arc::downgrade(session),
			port,
			detached: AtomicBool::new(false),
			reflection: Reading::new(COLOR_NO_READING as i32),
			color: Reading::new(COLOR_NO_READING as i32),
			red: Reading::new(COLOR_NO_READING as i32),
			green: Reading::new(COLOR_NO_READING as i32),
			blue: Reading::new(COLOR_NO_READING as i32),
		}
	}

	pub fn port(&self) -> Port {
		self.port
	}

	/// Reflected light, percent.
	pub fn reflection(&self) -> i32 {
		self.reflection.get()
	}

	/// Index of the recognized color, [`COLOR_NO_READING`] when none.
	pub fn color(&self) -> i32 {
		self.color.get()
	}

	pub fn red(&self) -> i32 {
		self.red.get()
	}

	pub fn green(&self) -> i32 {
		self.green.get()
	}

	pub fn blue(&self) -> i32 {
		self.blue.get()
	}

	/// Resolves once reflection lands within `tolerance` of `target`.
	pub fn watch_reflection(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.reflection.watch(target, tolerance))
	}

	/// Resolves once the recognized color index lands within `tolerance`
	/// of `target`. Pass zero tolerance to wait for an exact color.
	pub fn watch_color(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.color.watch(target, tolerance))
	}

	/// Switches the sensor's reporting mode.
	pub fn set_mode(&self, mode: ColorSensorMode) -> Result<Command> {
		let session = self.guard()?;
		let mut params = json!({ "port": self.port, "modetype": mode.name() });
		if let (Value::Object(target), Value::Object(extra)) = (&mut params, mode.params()) {
			target.extend(extra);
		}
		Ok(Command::new(session, "scratch.set_device_mode", params))
	}

	fn guard(&self) -> Result<Arc<Session>> {
		if self.detached.load(Ordering::SeqCst) {
			return Err(Error::StaleDevice { port: self.port, kind: DeviceKind::ColorSensor });
		}
		self.session.upgrade().ok_or(Error::NotActive)
	}
}

impl Peripheral for ColorSensor {
	fn port(&self) -> Port {
		self.port
	}

	fn kind(&self) -> DeviceKind {
		DeviceKind::ColorSensor
	}

	fn apply_update(&self, payload: &Value) -> Vec<Metric> {
		let mut changed = Vec::new();
		let slot = |index| telemetry::int_at_or(payload, index, COLOR_NO_READING) as i32;
		self.reflection.apply(Metric::Reflection, slot(REFLECTION), &mut changed);
		self.color.apply(Metric::Color, slot(COLOR), &mut changed);
		self.red.apply(Metric::Red, slot(RED), &mut changed);
		self.green.apply(Metric::Green, slot(GREEN), &mut changed);
		self.blue.apply(Metric::Blue, slot(BLUE), &mut changed);
		changed
	}

	fn detach(&self) {
		self.detached.store(true, Ordering::SeqCst);
		self.reflection.close();
		self.color.close();
		self.red.close();
		self.green.close();
		self.blue.close();
	}
}

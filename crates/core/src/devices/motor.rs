//! Encoder motor driver.

use crate::command::{Command, TrackedMotorCommand};
use crate::devices::Reading;
use brickline_protocol::{DeviceKind, PathDirection, Port, StopType, telemetry};
use brickline_runtime::{Error, Metric, Peripheral, Result, Session, ValueWatcher, WatchPool};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Update slot layout: `[speed, relative, absolute, power]`.
const SPEED: usize = 0;
const RELATIVE_POSITION: usize = 1;
const ABSOLUTE_POSITION: usize = 2;
const POWER: usize = 3;

/// One encoder motor.
///
/// Handles go stale when the hub reports a different device on the same
/// port; a stale handle refuses to build commands with
/// [`Error::StaleDevice`]. Speeds are percent of maximum, positions are
/// degrees, acceleration and deceleration are ramp times in milliseconds.
pub struct Motor {
	session: Weak<Session>,
	port: Port,
	detached: AtomicBool,
	speed: Reading,
	relative_position: Reading,
	absolute_position: Reading,
	power: Reading,
}

impl Motor {
	pub(crate) fn new(session: &Arc<Session>, port: Port) -> Motor {
		Motor {
			session: Arc::downgrade(session),
			port,
			detached: AtomicBool::new(false),
			speed: Reading::new(0),
			relative_position: Reading::new(0),
			absolute_position: Reading::new(0),
			power: Reading::new(0),
		}
	}

	pub fn port(&self) -> Port {
		self.port
	}

	/// Latest speed, percent of maximum.
	pub fn speed(&self) -> i32 {
		self.speed.get()
	}

	/// Degrees turned since the counter was last set.
	pub fn relative_position(&self) -> i32 {
		self.relative_position.get()
	}

	/// Absolute axle position in degrees.
	pub fn absolute_position(&self) -> i32 {
		self.absolute_position.get()
	}

	/// Latest drawn power, percent.
	pub fn power(&self) -> i32 {
		self.power.get()
	}

	/// Resolves once the speed lands within `tolerance` of `target`.
	pub fn watch_speed(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.speed.watch(target, tolerance))
	}

	/// Resolves once the relative counter lands within `tolerance` of
	/// `target`.
	pub fn watch_relative_position(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.relative_position.watch(target, tolerance))
	}

	/// Resolves once the absolute position lands within `tolerance` of
	/// `target`.
	pub fn watch_absolute_position(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.absolute_position.watch(target, tolerance))
	}

	/// Resolves once the drawn power lands within `tolerance` of `target`.
	pub fn watch_power(&self, target: i32, tolerance: i32) -> Result<ValueWatcher> {
		self.guard()?;
		Ok(self.power.watch(target, tolerance))
	}

	/// Turns the motor `degrees` at `speed`, sign giving direction.
	pub fn run_for_degrees(
		&self,
		speed: i32,
		degrees: i32,
		stall: bool,
		stop: StopType,
		acceleration: i32,
		deceleration: i32,
	) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.motor_run_for_degrees",
			json!({
				"port": self.port,
				"speed": speed,
				"degrees": degrees,
				"stall": stall,
				"stop": stop.code(),
				"acceleration": acceleration,
				"deceleration": deceleration,
			}),
		))
	}

	/// Runs the motor at `speed` for `time_ms` milliseconds.
	pub fn run_timed(
		&self,
		speed: i32,
		time_ms: u64,
		stall: bool,
		stop: StopType,
		acceleration: i32,
		deceleration: i32,
	) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.motor_run_timed",
			json!({
				"port": self.port,
				"speed": speed,
				"time": time_ms,
				"stall": stall,
				"stop": stop.code(),
				"acceleration": acceleration,
				"deceleration": deceleration,
			}),
		))
	}

	/// Starts the motor at `speed` until something stops it.
	pub fn start(&self, speed: i32, stall: bool, acceleration: i32) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.motor_start",
			json!({
				"port": self.port,
				"speed": speed,
				"stall": stall,
				"acceleration": acceleration,
			}),
		))
	}

	/// Stops the motor with the given hold behavior.
	pub fn stop(&self, stop: StopType, deceleration: i32) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.motor_stop",
			json!({
				"port": self.port,
				"stop": stop.code(),
				"deceleration": deceleration,
			}),
		))
	}

	/// Drives the motor by raw PWM `power` instead of regulated speed.
	pub fn pwm(&self, power: i32, stall: bool, acceleration: i32) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.motor_pwm",
			json!({
				"port": self.port,
				"power": power,
				"stall": stall,
				"acceleration": acceleration,
			}),
		))
	}

	/// Sets the relative counter to `offset` without moving the axle.
	pub fn set_position(&self, offset: i32) -> Result<Command> {
		let session = self.guard()?;
		Ok(Command::new(
			session,
			"scratch.motor_set_position",
			json!({ "port": self.port, "offset": offset }),
		))
	}

	/// Drives to `position` on the relative counter. Awaiting the
	/// returned command settles on the hub's answer or on the counter
	/// reaching the target, whichever lands first.
	pub fn go_to_relative_position(
		&self,
		position: i32,
		speed: i32,
		stall: bool,
		stop: StopType,
		acceleration: i32,
		deceleration: i32,
	) -> Result<TrackedMotorCommand> {
		let session = self.guard()?;
		Ok(TrackedMotorCommand::new(
			session,
			"scratch.motor_go_to_relative_position",
			json!({
				"port": self.port,
				"position": position,
				"speed": speed,
				"stall": stall,
				"stop": stop.code(),
				"acceleration": acceleration,
				"deceleration": deceleration,
			}),
			self.relative_position.watches(),
			position,
		))
	}

	/// Drives to the absolute `position`, approaching it along
	/// `direction`. Tracked like
	/// [`go_to_relative_position`](Motor::go_to_relative_position).
	#[allow(clippy::too_many_arguments)]
	pub fn go_to_absolute_position(
		&self,
		position: i32,
		speed: i32,
		direction: PathDirection,
		stall: bool,
		stop: StopType,
		acceleration: i32,
		deceleration: i32,
	) -> Result<TrackedMotorCommand> {
		let session = self.guard()?;
		Ok(TrackedMotorCommand::new(
			session,
			"scratch.motor_go_direction_to_position",
			json!({
				"port": self.port,
				"position": position,
				"speed": speed,
				"direction": direction.name(),
				"stall": stall,
				"stop": stop.code(),
				"acceleration": acceleration,
				"deceleration": deceleration,
			}),
			self.absolute_position.watches(),
			position,
		))
	}

	pub(crate) fn ensure_attached(&self) -> Result<()> {
		self.guard().map(drop)
	}

	pub(crate) fn relative_watches(&self) -> Arc<WatchPool> {
		self.relative_position.watches()
	}

	fn guard(&self) -> Result<Arc<Session>> {
		if self.detached.load(Ordering::SeqCst) {
			return Err(Error::StaleDevice { port: self.port, kind: DeviceKind::Motor });
		}
		self.session.upgrade().ok_or(Error::NotActive)
	}
}

impl Peripheral for Motor {
	fn port(&self) -> Port {
		self.port
	}

	fn kind(&self) -> DeviceKind {
		DeviceKind::Motor
	}

	fn apply_update(&self, payload: &Value) -> Vec<Metric> {
		let mut changed = Vec::new();
		self.speed.apply(Metric::Speed, telemetry::int_at_or(payload, SPEED, 0) as i32, &mut changed);
		self.relative_position.apply(
			Metric::RelativePosition,
			telemetry::int_at_or(payload, RELATIVE_POSITION, 0) as i32,
			&mut changed,
		);
		self.absolute_position.apply(
			Metric::AbsolutePosition,
			telemetry::int_at_or(payload, ABSOLUTE_POSITION, 0) as i32,
			&mut changed,
		);
		self.power.apply(Metric::Power, telemetry::int_at_or(payload, POWER, 0) as i32, &mut changed);
		changed
	}

	fn detach(&self) {
		self.detached.store(true, Ordering::SeqCst);
		self.speed.close();
		self.relative_position.close();
		self.absolute_position.close();
		self.power.close();
	}
}

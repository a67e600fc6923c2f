//! Correlated commands and their tracked motion variants.
//!
//! A [`Command`] pairs a wire method with its parameters; consuming it
//! puts it on the wire under a fresh task id and the hub's answer
//! resolves the await. The tracked variants additionally register a
//! position watch before the command goes out and race it against the
//! acknowledgement, so motion calls settle as soon as the axle arrives
//! even when the answer is late or lost.

use brickline_runtime::{Error, Result, ResultWaiter, Session, ValueWatcher, WatchPool};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Answer deadline applied by the plain `send` methods.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// One correlated command, built but not yet sent.
///
/// Building a command never touches the session, so an unused builder
/// costs nothing.
#[derive(Debug)]
pub struct Command {
	session: Arc<Session>,
	method: &'static str,
	params: Value,
}

impl Command {
	pub(crate) fn new(session: Arc<Session>, method: &'static str, params: Value) -> Command {
		Command { session, method, params }
	}

	/// Wire method this command will carry.
	pub fn method(&self) -> &'static str {
		self.method
	}

	/// Sends and waits for the hub's answer, up to
	/// [`DEFAULT_COMMAND_TIMEOUT`].
	pub async fn send(self) -> Result<Value> {
		self.send_with_timeout(DEFAULT_COMMAND_TIMEOUT).await
	}

	/// Sends and waits for the hub's answer, up to `timeout`.
	pub async fn send_with_timeout(self, timeout: Duration) -> Result<Value> {
		self.session.submit(self.method, self.params)?.wait(timeout).await
	}

	/// Sends without waiting. The answer is discarded when it arrives.
	pub fn send_detached(self) -> Result<()> {
		self.session.submit_detached(self.method, self.params)
	}
}

/// How a tracked motion command settled.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionOutcome<R> {
	/// Telemetry put the watched counter on target before the hub
	/// answered. Carries the tolerance-corrected reading.
	Reached(R),
	/// The hub's acknowledgement landed first. Carries the raw answer.
	Acknowledged(Value),
}

impl<R> MotionOutcome<R> {
	pub fn is_reached(&self) -> bool {
		matches!(self, MotionOutcome::Reached(_))
	}
}

/// Motion command for a single motor, tracked against one of its
/// position counters.
///
/// The watch is registered before the command is submitted, so an update
/// that lands between the send and the first poll still counts. Whichever
/// side loses the race is withdrawn on every exit path, timeouts included.
pub struct TrackedMotorCommand {
	session: Arc<Session>,
	method: &'static str,
	params: Value,
	watches: Arc<WatchPool>,
	target: i32,
	tolerance: i32,
}

impl TrackedMotorCommand {
	pub(crate) fn new(
		session: Arc<Session>,
		method: &'static str,
		params: Value,
		watches: Arc<WatchPool>,
		target: i32,
	) -> TrackedMotorCommand {
		TrackedMotorCommand {
			session,
			method,
			params,
			watches,
			target,
			tolerance: brickline_runtime::DEFAULT_TOLERANCE,
		}
	}

	/// Overrides the position window, default
	/// [`DEFAULT_TOLERANCE`](brickline_runtime::DEFAULT_TOLERANCE) degrees.
	pub fn tolerance(mut self, tolerance: i32) -> TrackedMotorCommand {
		self.tolerance = tolerance;
		self
	}

	/// Sends and settles on whichever lands first, the hub's answer or
	/// the position watch. Deadline [`DEFAULT_COMMAND_TIMEOUT`].
	pub async fn send(self) -> Result<MotionOutcome<i32>> {
		self.send_with_timeout(DEFAULT_COMMAND_TIMEOUT).await
	}

	/// Sends and settles on answer or position, up to `timeout`.
	pub async fn send_with_timeout(self, timeout: Duration) -> Result<MotionOutcome<i32>> {
		let watcher = self.watches.watch(self.target, self.tolerance);
		let waiter = self.session.submit(self.method, self.params)?;
		match tokio::time::timeout(timeout, race(watcher, waiter)).await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::Timeout(format!(
				"No answer and no position {} within {timeout:?}",
				self.target
			))),
		}
	}
}

impl fmt::Debug for TrackedMotorCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackedMotorCommand")
			.field("method", &self.method)
			.field("target", &self.target)
			.field("tolerance", &self.tolerance)
			.finish()
	}
}

async fn race(watcher: ValueWatcher, waiter: ResultWaiter) -> Result<MotionOutcome<i32>> {
	tokio::select! {
		position = watcher => position.map(MotionOutcome::Reached),
		answer = waiter => answer.map(MotionOutcome::Acknowledged),
	}
}

/// Motion command for a motor pair, tracked against both position
/// counters. The watch side only wins once both counters arrive.
pub struct TrackedMoveCommand {
	session: Arc<Session>,
	method: &'static str,
	params: Value,
	left: (Arc<WatchPool>, i32),
	right: (Arc<WatchPool>, i32),
	tolerance: i32,
}

impl TrackedMoveCommand {
	pub(crate) fn new(
		session: Arc<Session>,
		method: &'static str,
		params: Value,
		left: (Arc<WatchPool>, i32),
		right: (Arc<WatchPool>, i32),
	) -> TrackedMoveCommand {
		TrackedMoveCommand {
			session,
			method,
			params,
			left,
			right,
			tolerance: brickline_runtime::DEFAULT_TOLERANCE,
		}
	}

	/// Overrides the position window applied to both counters.
	pub fn tolerance(mut self, tolerance: i32) -> TrackedMoveCommand {
		self.tolerance = tolerance;
		self
	}

	/// Sends and settles on the hub's answer or on both counters
	/// arriving. Deadline [`DEFAULT_COMMAND_TIMEOUT`].
	pub async fn send(self) -> Result<MotionOutcome<(i32, i32)>> {
		self.send_with_timeout(DEFAULT_COMMAND_TIMEOUT).await
	}

	/// Sends and settles on answer or positions, up to `timeout`.
	pub async fn send_with_timeout(self, timeout: Duration) -> Result<MotionOutcome<(i32, i32)>> {
		let left = self.left.0.watch(self.left.1, self.tolerance);
		let right = self.right.0.watch(self.right.1, self.tolerance);
		let waiter = self.session.submit(self.method, self.params)?;
		match tokio::time::timeout(timeout, race_pair(left, right, waiter)).await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::Timeout(format!(
				"No answer and no position pair within {timeout:?}"
			))),
		}
	}
}

impl fmt::Debug for TrackedMoveCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackedMoveCommand")
			.field("method", &self.method)
			.field("left_target", &self.left.1)
			.field("right_target", &self.right.1)
			.field("tolerance", &self.tolerance)
			.finish()
	}
}

async fn race_pair(
	left: ValueWatcher,
	right: ValueWatcher,
	waiter: ResultWaiter,
) -> Result<MotionOutcome<(i32, i32)>> {
	tokio::select! {
		positions = async { tokio::try_join!(left, right) } => {
			positions.map(MotionOutcome::Reached)
		}
		answer = waiter => answer.map(MotionOutcome::Acknowledged),
	}
}

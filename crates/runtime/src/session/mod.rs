//! One live hub link: state machine, receive loop, packet dispatch.
//!
//! A session owns the transport, the task registry, the device table, and
//! the event bus for one hub. The receive loop consumes framed packets in
//! arrival order, so device reconciliation and telemetry decode never race
//! themselves; framing stays responsive on its own reader task.

use crate::device::{DeviceFactory, DeviceStore, Peripheral};
use crate::error::{Error, Result};
use crate::events::{EventBus, EventStream, EventWaiter};
use crate::tasks::{ResultWaiter, TaskRegistry};
use crate::transport::{SharedTransport, Transport, run_reader};
use base64::{Engine as _, prelude::BASE64_STANDARD};
use brickline_protocol::{
	Command, DeviceKind, EventFrame, FRAME_DELIMITER, HubButton, HubState, Inbound, MessageKind,
	Port, telemetry,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

/// Silence on the wire longer than this tears the session down.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Framed packets buffered between the reader task and the run loop.
const PACKET_QUEUE: usize = 64;

/// Event bus depth per session.
const EVENT_CAPACITY: usize = 64;

/// Lifecycle of one hub link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
	/// Transport opened, run loop not yet consuming.
	Connecting = 0,
	/// Commands flow.
	Active = 1,
	/// Teardown requested or in progress.
	Disconnecting = 2,
	/// Fully torn down. Terminal.
	Closed = 3,
}

impl SessionState {
	fn from_u8(raw: u8) -> SessionState {
		match raw {
			0 => SessionState::Connecting,
			1 => SessionState::Active,
			2 => SessionState::Disconnecting,
			_ => SessionState::Closed,
		}
	}
}

/// Things a hub announces outside command results.
#[derive(Clone)]
pub enum HubEvent {
	/// A device appeared in the device table.
	DeviceAttached(Arc<dyn Peripheral>),
	/// A device left the table or changed kind.
	DeviceDetached(Arc<dyn Peripheral>),
	ButtonPressed(HubButton),
	ButtonReleased { button: HubButton, held_ms: i64 },
	/// The hub was physically tapped.
	Knocked,
	StateChanged(HubState),
	/// Message from a user program on the hub.
	Broadcast { channel: i64, message: String },
	/// Stack trace from a crashed hub program.
	RuntimeError(String),
	/// The session left the active state. Final event.
	Disconnected,
}

impl fmt::Debug for HubEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HubEvent::DeviceAttached(device) => f
				.debug_struct("DeviceAttached")
				.field("port", &device.port())
				.field("kind", &device.kind())
				.finish(),
			HubEvent::DeviceDetached(device) => f
				.debug_struct("DeviceDetached")
				.field("port", &device.port())
				.field("kind", &device.kind())
				.finish(),
			HubEvent::ButtonPressed(button) => f.debug_tuple("ButtonPressed").field(button).finish(),
			HubEvent::ButtonReleased { button, held_ms } => f
				.debug_struct("ButtonReleased")
				.field("button", button)
				.field("held_ms", held_ms)
				.finish(),
			HubEvent::Knocked => f.write_str("Knocked"),
			HubEvent::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
			HubEvent::Broadcast { channel, message } => f
				.debug_struct("Broadcast")
				.field("channel", channel)
				.field("message", message)
				.finish(),
			HubEvent::RuntimeError(trace) => f.debug_tuple("RuntimeError").field(trace).finish(),
			HubEvent::Disconnected => f.write_str("Disconnected"),
		}
	}
}

/// Latest hub-level telemetry, readable from any thread.
#[derive(Default)]
pub struct HubTelemetry {
	acceleration: [AtomicI32; 3],
	rotation: [AtomicI32; 3],
	orientation: [AtomicI32; 3],
	battery_voltage_bits: AtomicU64,
	battery_percent: AtomicI32,
	plugged_in: AtomicBool,
	runtime_ms: AtomicI64,
	state: AtomicU8,
	status_text: Mutex<String>,
}

impl HubTelemetry {
	/// `[x, y, z]` acceleration.
	pub fn acceleration(&self) -> [i32; 3] {
		self.acceleration.each_ref().map(|axis| axis.load(Ordering::SeqCst))
	}

	/// `[x, y, z]` rotation.
	pub fn rotation(&self) -> [i32; 3] {
		self.rotation.each_ref().map(|axis| axis.load(Ordering::SeqCst))
	}

	/// `[yaw, pitch, roll]`. Stays zero on firmware that omits the slot.
	pub fn orientation(&self) -> [i32; 3] {
		self.orientation.each_ref().map(|axis| axis.load(Ordering::SeqCst))
	}

	pub fn battery_voltage(&self) -> f64 {
		f64::from_bits(self.battery_voltage_bits.load(Ordering::SeqCst))
	}

	pub fn battery_percent(&self) -> i32 {
		self.battery_percent.load(Ordering::SeqCst)
	}

	pub fn is_plugged_in(&self) -> bool {
		self.plugged_in.load(Ordering::SeqCst)
	}

	/// Milliseconds the current hub program has been running.
	pub fn runtime_ms(&self) -> i64 {
		self.runtime_ms.load(Ordering::SeqCst)
	}

	/// Physical orientation, [`HubState::Laying`] until told otherwise.
	pub fn hub_state(&self) -> HubState {
		HubState::from_ordinal(i64::from(self.state.load(Ordering::SeqCst))).unwrap_or_default()
	}

	/// Free-form status text from the telemetry frame.
	pub fn status_text(&self) -> String {
		self.status_text.lock().clone()
	}

	fn store_triple(slot: &[AtomicI32; 3], values: [i64; 3]) {
		for (axis, value) in slot.iter().zip(values) {
			axis.store(value as i32, Ordering::SeqCst);
		}
	}
}

/// One live link to a hub.
pub struct Session {
	address: Arc<str>,
	state: AtomicU8,
	transport: SharedTransport,
	tasks: Arc<TaskRegistry>,
	devices: DeviceStore,
	telemetry: HubTelemetry,
	events: EventBus<HubEvent>,
	factory: Mutex<Option<Arc<dyn DeviceFactory>>>,
	packet_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
	packet_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
	closing: Notify,
	liveness: Duration,
}

impl Session {
	pub fn new(address: &str, transport: Box<dyn Transport>) -> Session {
		Session::with_liveness(address, transport, LIVENESS_TIMEOUT)
	}

	fn with_liveness(address: &str, transport: Box<dyn Transport>, liveness: Duration) -> Session {
		let (packet_tx, packet_rx) = mpsc::channel(PACKET_QUEUE);
		Session {
			address: Arc::from(address),
			state: AtomicU8::new(SessionState::Connecting as u8),
			transport: Arc::new(Mutex::new(transport)),
			tasks: Arc::new(TaskRegistry::new()),
			devices: DeviceStore::new(),
			telemetry: HubTelemetry::default(),
			events: EventBus::new(EVENT_CAPACITY),
			factory: Mutex::new(None),
			packet_tx: Mutex::new(Some(packet_tx)),
			packet_rx: Mutex::new(Some(packet_rx)),
			closing: Notify::new(),
			liveness,
		}
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn state(&self) -> SessionState {
		SessionState::from_u8(self.state.load(Ordering::SeqCst))
	}

	pub fn is_active(&self) -> bool {
		self.state() == SessionState::Active
	}

	/// Injects the device factory. Must happen before the run loop starts
	/// or newly announced devices are left untracked.
	pub fn set_factory(&self, factory: Arc<dyn DeviceFactory>) {
		*self.factory.lock() = Some(factory);
	}

	/// Moves `Connecting` to `Active`. False if the session already left
	/// `Connecting`.
	pub fn mark_active(&self) -> bool {
		self.state
			.compare_exchange(
				SessionState::Connecting as u8,
				SessionState::Active as u8,
				Ordering::SeqCst,
				Ordering::SeqCst,
			)
			.is_ok()
	}

	pub fn telemetry(&self) -> &HubTelemetry {
		&self.telemetry
	}

	pub fn devices(&self) -> &DeviceStore {
		&self.devices
	}

	/// Stream over everything the hub announces from now on.
	pub fn subscribe(&self) -> EventStream<HubEvent> {
		self.events.subscribe()
	}

	/// One-shot wait for the first event matching `predicate`.
	pub fn wait_for_event(
		&self,
		predicate: impl Fn(&HubEvent) -> bool + Send + Sync + 'static,
		timeout: Duration,
	) -> EventWaiter<HubEvent> {
		self.events.waiter(predicate, timeout)
	}

	/// Sends a correlated command. The returned waiter resolves with the
	/// hub's answer; dropping it abandons the answer.
	///
	/// Fails fast with [`Error::NotActive`] outside the active state.
	pub fn submit(&self, method: &str, params: Value) -> Result<ResultWaiter> {
		if !self.is_active() {
			return Err(Error::NotActive);
		}
		let id = self.tasks.new_id();
		let command = Command::new(id.as_ref(), method, params);
		let waiter = self.tasks.wait_for(Arc::clone(&id));
		match self.send_frame(&command) {
			Ok(()) => Ok(waiter),
			Err(error) => {
				drop(waiter);
				self.tasks.release(&id);
				Err(error)
			}
		}
	}

	/// Sends a correlated command and discards the answer.
	pub fn submit_detached(&self, method: &str, params: Value) -> Result<()> {
		self.submit(method, params).map(drop)
	}

	fn send_frame(&self, command: &Command) -> Result<()> {
		let mut frame = serde_json::to_vec(command)?;
		frame.push(FRAME_DELIMITER);
		self.transport.lock().send(&frame)
	}

	/// Begins an orderly shutdown. Idempotent; the run loop performs the
	/// actual teardown and emits [`HubEvent::Disconnected`] exactly once.
	pub fn disconnect(&self) {
		let to = SessionState::Disconnecting as u8;
		let from_active = self.state.compare_exchange(
			SessionState::Active as u8,
			to,
			Ordering::SeqCst,
			Ordering::SeqCst,
		);
		let began = from_active.is_ok()
			|| self
				.state
				.compare_exchange(SessionState::Connecting as u8, to, Ordering::SeqCst, Ordering::SeqCst)
				.is_ok();
		if began {
			self.closing.notify_one();
		}
	}

	/// Drives the session: spawns the reader, dispatches packets in
	/// arrival order, enforces the liveness window, and performs the
	/// one-and-only teardown on exit.
	pub async fn run(self: &Arc<Self>) {
		let packet_tx = self
			.packet_tx
			.lock()
			.take()
			.expect("run() can only be called once - reader already started");
		let mut packets = self
			.packet_rx
			.lock()
			.take()
			.expect("run() can only be called once - packet receiver already taken");
		let reader = tokio::spawn(run_reader(Arc::clone(&self.transport), packet_tx));

		let mut deadline = tokio::time::Instant::now() + self.liveness;
		loop {
			tokio::select! {
				inbound = packets.recv() => match inbound {
					Some(packet) => {
						deadline = tokio::time::Instant::now() + self.liveness;
						self.dispatch_packet(&packet);
					}
					None => {
						tracing::debug!(address = %self.address, "Transport reader ended");
						break;
					}
				},
				_ = tokio::time::sleep_until(deadline) => {
					tracing::warn!(
						address = %self.address,
						"No data from hub within liveness window, disconnecting"
					);
					break;
				}
				_ = self.closing.notified() => break,
			}
		}
		reader.abort();
		self.finish_disconnect();
	}

	fn finish_disconnect(&self) {
		self.state.store(SessionState::Disconnecting as u8, Ordering::SeqCst);
		self.transport.lock().disconnect();
		self.tasks.fail_pending();
		for device in self.devices.drain() {
			device.detach();
		}
		self.events.emit(HubEvent::Disconnected);
		self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
		tracing::info!(address = %self.address, "Session closed");
	}

	fn dispatch_packet(self: &Arc<Self>, packet: &[u8]) {
		let body = packet.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(packet);
		let text = String::from_utf8_lossy(body);
		let text = text.trim();
		if !text.starts_with('{') {
			tracing::debug!("Dropping non-object packet");
			return;
		}
		match serde_json::from_str::<Inbound>(text) {
			Ok(Inbound::Result(result)) => self.tasks.deliver(&result.i, result.r),
			Ok(Inbound::Event(frame)) => self.dispatch_event(&frame),
			Ok(Inbound::Unknown(value)) => {
				tracing::debug!(%value, "Unrecognized packet shape");
			}
			Err(error) => tracing::debug!("Undecodable packet: {error}"),
		}
	}

	fn dispatch_event(self: &Arc<Self>, frame: &EventFrame) {
		match frame.kind() {
			MessageKind::Telemetry => self.apply_telemetry_frame(&frame.p),
			MessageKind::Power => self.apply_power(&frame.p),
			MessageKind::Button => self.apply_button(&frame.p),
			MessageKind::Knock => self.events.emit(HubEvent::Knocked),
			MessageKind::StateChange => self.apply_state_change(&frame.p),
			MessageKind::Broadcast => self.apply_broadcast(&frame.p),
			MessageKind::RuntimeError => self.apply_runtime_error(&frame.p),
			MessageKind::Other => {
				tracing::debug!(kind = ?frame.m, "Unknown event kind (forward-compatible)");
			}
		}
	}

	/// Kind 0: six device slots, then hub motion and status fields. Every
	/// slot decodes independently; a bad slot never aborts the rest.
	fn apply_telemetry_frame(self: &Arc<Self>, frame: &Value) {
		if !frame.is_array() {
			tracing::debug!("Telemetry frame is not an array");
			return;
		}
		self.reconcile_devices(frame);
		self.apply_motion(frame);
	}

	fn apply_motion(&self, frame: &Value) {
		if let Some(triple) = telemetry::triple_at(frame, telemetry::ACCELERATION) {
			HubTelemetry::store_triple(&self.telemetry.acceleration, triple);
		}
		if let Some(triple) = telemetry::triple_at(frame, telemetry::ROTATION) {
			HubTelemetry::store_triple(&self.telemetry.rotation, triple);
		}
		if let Some(triple) = telemetry::triple_at(frame, telemetry::ORIENTATION) {
			HubTelemetry::store_triple(&self.telemetry.orientation, triple);
		}
		if let Some(text) = telemetry::text_at(frame, telemetry::STATUS_TEXT) {
			*self.telemetry.status_text.lock() = text.to_string();
		}
		if let Some(ms) = telemetry::int_at(frame, telemetry::RUNTIME_MS) {
			self.telemetry.runtime_ms.store(ms, Ordering::SeqCst);
		}
	}

	/// Walks the six device slots and brings the registry in line: update
	/// on same kind, detach on empty or changed kind, attach through the
	/// factory on new kinds.
	fn reconcile_devices(self: &Arc<Self>, frame: &Value) {
		let factory = self.factory.lock().clone();
		for port in Port::ALL {
			let Some(slot) = frame.get(port.index()).filter(|slot| slot.is_array()) else {
				continue;
			};
			let kind = DeviceKind::from_code(telemetry::int_at_or(slot, 0, 0));
			let payload = slot.get(1).unwrap_or(&Value::Null);

			if let Some(existing) = self.devices.get(port) {
				if existing.kind() == kind {
					existing.apply_update(payload);
					continue;
				}
				self.devices.remove(port);
				existing.detach();
				self.events.emit(HubEvent::DeviceDetached(existing));
			}
			if kind == DeviceKind::None {
				continue;
			}
			let Some(factory) = factory.as_ref() else {
				continue;
			};
			match factory.create_device(self, port, kind) {
				Some(device) => {
					device.apply_update(payload);
					self.devices.insert(Arc::clone(&device));
					self.events.emit(HubEvent::DeviceAttached(device));
				}
				None => {
					tracing::debug!(%port, %kind, "No driver for device kind (forward-compatible)");
				}
			}
		}
	}

	/// Kind 2: `[voltage, percent, plugged_in]`.
	fn apply_power(&self, payload: &Value) {
		if let Some(voltage) = telemetry::float_at(payload, 0) {
			self.telemetry.battery_voltage_bits.store(voltage.to_bits(), Ordering::SeqCst);
		}
		if let Some(percent) = telemetry::int_at(payload, 1) {
			self.telemetry.battery_percent.store(percent as i32, Ordering::SeqCst);
		}
		if let Some(plugged) = telemetry::bool_at(payload, 2) {
			self.telemetry.plugged_in.store(plugged, Ordering::SeqCst);
		}
	}

	/// Kind 3: `[name, held_ms]`. Zero duration is a press, anything
	/// longer a release.
	fn apply_button(&self, payload: &Value) {
		let Some(name) = telemetry::text_at(payload, 0) else {
			tracing::debug!("Button event without a name");
			return;
		};
		let Some(button) = HubButton::from_name(name) else {
			tracing::debug!(name, "Unknown hub button");
			return;
		};
		let held_ms = telemetry::int_at_or(payload, 1, 0);
		if held_ms > 0 {
			self.events.emit(HubEvent::ButtonReleased { button, held_ms });
		} else {
			self.events.emit(HubEvent::ButtonPressed(button));
		}
	}

	/// Kind 14: bare state ordinal.
	fn apply_state_change(&self, payload: &Value) {
		let ordinal = payload.as_i64().or_else(|| payload.as_f64().map(|f| f as i64));
		let Some(state) = ordinal.and_then(HubState::from_ordinal) else {
			tracing::debug!(?payload, "Unmapped hub state ordinal");
			return;
		};
		self.telemetry.state.store(state.ordinal(), Ordering::SeqCst);
		self.events.emit(HubEvent::StateChanged(state));
	}

	/// Kind 15: `[channel, message]`.
	fn apply_broadcast(&self, payload: &Value) {
		let Some(channel) = telemetry::int_at(payload, 0) else {
			tracing::debug!("Broadcast without a channel");
			return;
		};
		let Some(message) = telemetry::text_at(payload, 1) else {
			tracing::debug!("Broadcast without a message");
			return;
		};
		self.events.emit(HubEvent::Broadcast { channel, message: message.to_string() });
	}

	/// Named kind `runtime_error`: slot 3 holds a base64 stack trace.
	fn apply_runtime_error(&self, payload: &Value) {
		let Some(encoded) = telemetry::text_at(payload, 3) else {
			tracing::debug!("Runtime error event without a trace payload");
			return;
		};
		match BASE64_STANDARD.decode(encoded) {
			Ok(bytes) => {
				let trace = String::from_utf8_lossy(&bytes).into_owned();
				tracing::warn!(address = %self.address, "Hub program error: {trace}");
				self.events.emit(HubEvent::RuntimeError(trace));
			}
			Err(error) => tracing::debug!("Undecodable runtime error payload: {error}"),
		}
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("address", &self.address)
			.field("state", &self.state())
			.field("devices", &self.devices.len())
			.finish()
	}
}

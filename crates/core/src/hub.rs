//! The hub facade: telemetry, devices, events, and command builders.

use crate::command::{Command, TrackedMoveCommand};
use crate::devices::{ColorSensor, DistanceSensor, Motor};
use brickline_protocol::{
	Animation, DisplayOrientation, DisplayRotation, Glyph, HubButton, HubState, Port, StopType,
};
use brickline_runtime::{
	EventStream, HubEvent, HubTelemetry, Peripheral, Result, Session, SessionState, Subscription,
};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Handle on one connected hub.
///
/// Cheap to clone; every clone drives the same session. Dropping the
/// last clone does not disconnect, call [`Hub::disconnect`] or shut the
/// manager down for that.
#[derive(Clone)]
pub struct Hub {
	session: Arc<Session>,
}

impl Hub {
	pub(crate) fn new(session: Arc<Session>) -> Hub {
		Hub { session }
	}

	/// Address this hub was connected through.
	pub fn address(&self) -> &str {
		self.session.address()
	}

	pub fn state(&self) -> SessionState {
		self.session.state()
	}

	pub fn is_active(&self) -> bool {
		self.session.is_active()
	}

	/// Latest hub-level readings: motion, battery, state, status text.
	pub fn telemetry(&self) -> &HubTelemetry {
		self.session.telemetry()
	}

	/// Every device currently attached, in port order.
	pub fn devices(&self) -> Vec<Arc<dyn Peripheral>> {
		self.session.devices().all()
	}

	/// The motor on `port`, if one is attached.
	pub fn motor(&self, port: Port) -> Option<Arc<Motor>> {
		self.session.devices().get_as::<Motor>(port)
	}

	/// The distance sensor on `port`, if one is attached.
	pub fn distance_sensor(&self, port: Port) -> Option<Arc<DistanceSensor>> {
		self.session.devices().get_as::<DistanceSensor>(port)
	}

	/// The color sensor on `port`, if one is attached.
	pub fn color_sensor(&self, port: Port) -> Option<Arc<ColorSensor>> {
		self.session.devices().get_as::<ColorSensor>(port)
	}

	/// Stream over everything this hub announces from now on.
	pub fn events(&self) -> EventStream<HubEvent> {
		self.session.subscribe()
	}

	/// First event matching `predicate`, up to `timeout`.
	pub async fn wait_for_event(
		&self,
		predicate: impl Fn(&HubEvent) -> bool + Send + Sync + 'static,
		timeout: Duration,
	) -> Result<HubEvent> {
		self.session.wait_for_event(predicate, timeout).wait().await
	}

	/// Runs `callback` for every device that appears. Dropping the
	/// returned handle stops the callbacks.
	pub fn on_device_attached(
		&self,
		mut callback: impl FnMut(Arc<dyn Peripheral>) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::DeviceAttached(device) = event {
				callback(device);
			}
		})
	}

	/// Runs `callback` for every device that disappears or changes kind.
	pub fn on_device_detached(
		&self,
		mut callback: impl FnMut(Arc<dyn Peripheral>) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::DeviceDetached(device) = event {
				callback(device);
			}
		})
	}

	pub fn on_button_pressed(
		&self,
		mut callback: impl FnMut(HubButton) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::ButtonPressed(button) = event {
				callback(button);
			}
		})
	}

	/// `callback` gets the button and how long it was held, in
	/// milliseconds.
	pub fn on_button_released(
		&self,
		mut callback: impl FnMut(HubButton, i64) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::ButtonReleased { button, held_ms } = event {
				callback(button, held_ms);
			}
		})
	}

	/// Runs `callback` whenever the hub registers a physical tap.
	pub fn on_knock(&self, mut callback: impl FnMut() + Send + 'static) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::Knocked = event {
				callback();
			}
		})
	}

	/// Runs `callback` whenever the hub changes pose or charger state.
	pub fn on_state_changed(
		&self,
		mut callback: impl FnMut(HubState) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::StateChanged(state) = event {
				callback(state);
			}
		})
	}

	/// `callback` gets the broadcast channel hash and the message text.
	pub fn on_broadcast(
		&self,
		mut callback: impl FnMut(i64, String) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::Broadcast { channel, message } = event {
				callback(channel, message);
			}
		})
	}

	/// `callback` gets the decoded trace of a program fault on the hub.
	pub fn on_runtime_error(
		&self,
		mut callback: impl FnMut(String) + Send + 'static,
	) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::RuntimeError(trace) = event {
				callback(trace);
			}
		})
	}

	/// Runs `callback` once when the session ends, by request or by
	/// liveness timeout.
	pub fn on_disconnected(&self, mut callback: impl FnMut() + Send + 'static) -> Subscription {
		self.observe(move |event| {
			if let HubEvent::Disconnected = event {
				callback();
			}
		})
	}

	/// Display command builders.
	pub fn display(&self) -> Display {
		Display { session: Arc::clone(&self.session) }
	}

	/// Speaker command builders.
	pub fn sound(&self) -> Sound {
		Sound { session: Arc::clone(&self.session) }
	}

	/// Coordinated two-motor command builders.
	pub fn motion(&self) -> Motion {
		Motion { session: Arc::clone(&self.session) }
	}

	/// Broadcast channel command builders.
	pub fn broadcast(&self) -> Broadcast {
		Broadcast { session: Arc::clone(&self.session) }
	}

	/// Begins an orderly disconnect. Idempotent.
	pub fn disconnect(&self) {
		self.session.disconnect();
	}

	/// Asks the hub to forward program broadcasts over the wire. Sent
	/// fire-and-forget right after connecting.
	pub(crate) fn enable_broadcasts(&self) {
		if let Err(error) = self.broadcast().listen(true).send_detached() {
			tracing::debug!(
				address = %self.session.address(),
				"Could not enable broadcast listening: {error}"
			);
		}
	}

	fn observe(&self, callback: impl FnMut(HubEvent) + Send + 'static) -> Subscription {
		Subscription::spawn(self.session.subscribe(), callback)
	}
}

impl fmt::Debug for Hub {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Hub")
			.field("address", &self.address())
			.field("state", &self.state())
			.finish()
	}
}

/// Playback options for [`Display::animation`].
#[derive(Debug, Clone, Copy)]
pub struct AnimationOptions {
	/// Return immediately instead of holding the hub on playback.
	pub background: bool,
	/// Time each frame stays up, in milliseconds.
	pub frame_ms: u64,
	/// Fade style between frames.
	pub fade: u8,
	/// Start over after the last frame.
	pub repeat: bool,
}

impl Default for AnimationOptions {
	fn default() -> AnimationOptions {
		AnimationOptions { background: false, frame_ms: 100, fade: 0, repeat: false }
	}
}

/// Builders for the 5x5 LED display.
pub struct Display {
	session: Arc<Session>,
}

impl Display {
	/// Scrolls `text` across the display.
	pub fn text(&self, text: &str) -> Command {
		self.command("scratch.display_text", json!({ "text": text }))
	}

	/// Shows `glyph` until something replaces it.
	pub fn image(&self, glyph: &Glyph) -> Command {
		self.command("scratch.display_image", json!({ "image": glyph.encode() }))
	}

	/// Shows `glyph` for `duration_ms` milliseconds, then clears.
	pub fn image_for(&self, glyph: &Glyph, duration_ms: u64) -> Command {
		self.command(
			"scratch.display_image_for",
			json!({ "image": glyph.encode(), "duration": duration_ms }),
		)
	}

	/// Plays `animation` frame by frame.
	pub fn animation(&self, animation: &Animation, options: AnimationOptions) -> Command {
		self.command(
			"scratch.display_animation",
			json!({
				"frames": animation.encode_frames(),
				"async": options.background,
				"delay": options.frame_ms,
				"fade": options.fade,
				"loop": options.repeat,
			}),
		)
	}

	pub fn clear(&self) -> Command {
		self.command("scratch.display_clear", json!({}))
	}

	/// Lights one pixel, `brightness` 0 to 9.
	pub fn set_pixel(&self, x: u8, y: u8, brightness: u8) -> Command {
		self.command(
			"scratch.display_set_pixel",
			json!({ "brightness": brightness, "x": x, "y": y }),
		)
	}

	/// Rotates the display a quarter turn.
	pub fn rotate(&self, direction: DisplayRotation) -> Command {
		self.command(
			"scratch.display_rotate_direction",
			json!({ "direction": direction.name() }),
		)
	}

	/// Points the top of the display at one edge of the hub.
	pub fn orient(&self, orientation: DisplayOrientation) -> Command {
		self.command(
			"scratch.display_rotate_orientation",
			json!({ "orientation": orientation.code() }),
		)
	}

	/// Sets the center button LED to a color index.
	pub fn center_button_light(&self, color: i32) -> Command {
		self.command("scratch.center_button_lights", json!({ "color": color }))
	}

	fn command(&self, method: &'static str, params: Value) -> Command {
		Command::new(Arc::clone(&self.session), method, params)
	}
}

/// Builders for the hub speaker.
pub struct Sound {
	session: Arc<Session>,
}

impl Sound {
	/// Plays MIDI `note` at `volume` until stopped.
	pub fn beep(&self, note: i32, volume: i32) -> Command {
		self.command("scratch.sound_beep", json!({ "note": note, "volume": volume }))
	}

	/// Plays MIDI `note` at `volume` for `duration_ms` milliseconds.
	pub fn beep_for(&self, note: i32, volume: i32, duration_ms: u64) -> Command {
		self.command(
			"scratch.sound_beep_for_time",
			json!({ "duration": duration_ms, "note": note, "volume": volume }),
		)
	}

	/// Cuts whatever is playing.
	pub fn off(&self) -> Command {
		self.command("scratch.sound_off", json!({}))
	}

	fn command(&self, method: &'static str, params: Value) -> Command {
		Command::new(Arc::clone(&self.session), method, params)
	}
}

/// Builders for coordinated two-motor movement.
///
/// Every builder checks both motor handles against the live device table
/// and refuses with [`Error::StaleDevice`](brickline_runtime::Error) when
/// either is out of date.
pub struct Motion {
	session: Arc<Session>,
}

impl Motion {
	/// Drives both motors `degrees`. Awaiting the returned command
	/// settles on the hub's answer or on both relative counters reaching
	/// their targets, whichever lands first.
	#[allow(clippy::too_many_arguments)]
	pub fn tank_degrees(
		&self,
		left: &Motor,
		right: &Motor,
		lspeed: i32,
		rspeed: i32,
		degrees: i32,
		stop: StopType,
		acceleration: i32,
		deceleration: i32,
	) -> Result<TrackedMoveCommand> {
		left.ensure_attached()?;
		right.ensure_attached()?;
		let left_target = travel_target(left.relative_position(), lspeed, degrees);
		let right_target = travel_target(right.relative_position(), rspeed, degrees);
		Ok(TrackedMoveCommand::new(
			Arc::clone(&self.session),
			"scratch.move_tank_degrees",
			json!({
				"lmotor": left.port(),
				"rmotor": right.port(),
				"lspeed": lspeed,
				"rspeed": rspeed,
				"degrees": degrees,
				"stop": stop.code(),
				"acceleration": acceleration,
				"deceleration": deceleration,
			}),
			(left.relative_watches(), left_target),
			(right.relative_watches(), right_target),
		))
	}

	/// Starts both motors at regulated speeds until stopped.
	pub fn start_speeds(
		&self,
		left: &Motor,
		right: &Motor,
		lspeed: i32,
		rspeed: i32,
		acceleration: i32,
	) -> Result<Command> {
		left.ensure_attached()?;
		right.ensure_attached()?;
		Ok(Command::new(
			Arc::clone(&self.session),
			"scratch.move_start_speeds",
			json!({
				"lmotor": left.port(),
				"rmotor": right.port(),
				"lspeed": lspeed,
				"rspeed": rspeed,
				"acceleration": acceleration,
			}),
		))
	}

	/// Starts both motors at raw power levels until stopped.
	pub fn start_powers(
		&self,
		left: &Motor,
		right: &Motor,
		lpower: i32,
		rpower: i32,
		acceleration: i32,
	) -> Result<Command> {
		left.ensure_attached()?;
		right.ensure_attached()?;
		Ok(Command::new(
			Arc::clone(&self.session),
			"scratch.move_start_powers",
			json!({
				"lmotor": left.port(),
				"rmotor": right.port(),
				"lpower": lpower,
				"rpower": rpower,
				"acceleration": acceleration,
			}),
		))
	}

	/// Stops both motors with the given hold behavior.
	pub fn stop(&self, left: &Motor, right: &Motor, stop: StopType) -> Result<Command> {
		left.ensure_attached()?;
		right.ensure_attached()?;
		Ok(Command::new(
			Arc::clone(&self.session),
			"scratch.move_stop",
			json!({
				"lmotor": left.port(),
				"rmotor": right.port(),
				"stop": stop.code(),
			}),
		))
	}
}

/// Builders for the hub's broadcast channel.
pub struct Broadcast {
	session: Arc<Session>,
}

impl Broadcast {
	/// Sends `value` on broadcast channel `hash`.
	pub fn signal(&self, hash: i64, value: &str) -> Command {
		Command::new(
			Arc::clone(&self.session),
			"scratch.broadcast_signal",
			json!({ "hash": hash, "value": value }),
		)
	}

	/// Turns hub-to-client broadcast forwarding on or off. The manager
	/// turns it on right after connecting.
	pub fn listen(&self, enable: bool) -> Command {
		Command::new(
			Arc::clone(&self.session),
			"scratch.broadcast_listen",
			json!({ "enable": enable }),
		)
	}
}

/// Where the relative counter lands after `degrees` of travel, the sign
/// of `speed` giving the direction.
fn travel_target(current: i32, speed: i32, degrees: i32) -> i32 {
	if speed < 0 { current.saturating_sub(degrees) } else { current.saturating_add(degrees) }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_travel_target_follows_the_speed_sign() {
		assert_eq!(travel_target(100, 50, 90), 190);
		assert_eq!(travel_target(100, -50, 90), 10);
		assert_eq!(travel_target(100, 0, 90), 190);
		assert_eq!(travel_target(i32::MAX - 10, 50, 90), i32::MAX);
	}
}

//! Hub-facing enums and identifiers.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Physical connector on the hub.
///
/// Ports double as indices into the telemetry device table, slot 0 being
/// port A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
	A,
	B,
	C,
	D,
	E,
	F,
}

impl Port {
	/// All ports in telemetry-slot order.
	pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

	/// Port for a telemetry slot index.
	pub fn from_index(index: usize) -> Option<Port> {
		Self::ALL.get(index).copied()
	}

	/// Telemetry slot this port occupies.
	pub fn index(self) -> usize {
		self as usize
	}

	/// Name used in command payloads.
	pub fn name(self) -> &'static str {
		match self {
			Port::A => "A",
			Port::B => "B",
			Port::C => "C",
			Port::D => "D",
			Port::E => "E",
			Port::F => "F",
		}
	}
}

impl fmt::Display for Port {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// What the hub reports plugged into a port.
///
/// Codes come from the device table; anything unrecognized is carried as
/// [`DeviceKind::Unknown`] so newer firmware cannot break decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
	/// Empty port.
	None,
	/// Color and reflectivity sensor.
	ColorSensor,
	/// Ultrasonic ranging sensor.
	DistanceSensor,
	/// Encoder motor.
	Motor,
	/// Device code this client does not know.
	Unknown(i64),
}

impl DeviceKind {
	pub fn from_code(code: i64) -> DeviceKind {
		match code {
			0 => DeviceKind::None,
			61 => DeviceKind::ColorSensor,
			62 => DeviceKind::DistanceSensor,
			75 => DeviceKind::Motor,
			other => DeviceKind::Unknown(other),
		}
	}

	pub fn code(self) -> i64 {
		match self {
			DeviceKind::None => 0,
			DeviceKind::ColorSensor => 61,
			DeviceKind::DistanceSensor => 62,
			DeviceKind::Motor => 75,
			DeviceKind::Unknown(code) => code,
		}
	}
}

impl fmt::Display for DeviceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeviceKind::None => f.write_str("none"),
			DeviceKind::ColorSensor => f.write_str("color sensor"),
			DeviceKind::DistanceSensor => f.write_str("distance sensor"),
			DeviceKind::Motor => f.write_str("motor"),
			DeviceKind::Unknown(code) => write!(f, "unknown({code})"),
		}
	}
}

/// Physical orientation of the hub, pushed as kind-14 events.
///
/// Ordinals are the wire values. A hub at rest on a table reports
/// [`HubState::Laying`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HubState {
	/// Flat with the display up. Initial state.
	#[default]
	Laying,
	/// Flat with the display down.
	UpsideDown,
	/// Upright on its bottom edge.
	Standing,
	/// Upright on its top edge.
	StandingOnTop,
	/// Resting on its left edge.
	LeftSide,
	/// Resting on its right edge.
	RightSide,
}

impl HubState {
	const ALL: [HubState; 6] = [
		HubState::Laying,
		HubState::UpsideDown,
		HubState::Standing,
		HubState::StandingOnTop,
		HubState::LeftSide,
		HubState::RightSide,
	];

	/// State for a wire ordinal; `None` for ordinals this client does not
	/// know.
	pub fn from_ordinal(ordinal: i64) -> Option<HubState> {
		usize::try_from(ordinal).ok().and_then(|i| Self::ALL.get(i).copied())
	}

	pub fn ordinal(self) -> u8 {
		self as u8
	}
}

/// Face button on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubButton {
	Left,
	Right,
	Center,
}

impl HubButton {
	/// Button for a wire name. Unknown names are dropped by the caller.
	pub fn from_name(name: &str) -> Option<HubButton> {
		match name {
			"left" => Some(HubButton::Left),
			"right" => Some(HubButton::Right),
			"center" => Some(HubButton::Center),
			_ => None,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			HubButton::Left => "left",
			HubButton::Right => "right",
			HubButton::Center => "center",
		}
	}
}

/// How a motor holds its axle once a command ends.
///
/// Serialized by position, not by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopType {
	/// Cut power and let the axle spin freely.
	Coast,
	/// Short the windings to resist motion.
	Brake,
	/// Actively servo back to the stop position.
	Hold,
}

impl StopType {
	/// Wire value.
	pub fn code(self) -> u8 {
		self as u8
	}
}

/// Which way around a motor travels to an absolute position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDirection {
	/// Whichever way is fewer degrees.
	Shortest,
	Clockwise,
	Counterclockwise,
}

impl PathDirection {
	/// Wire value.
	pub fn name(self) -> &'static str {
		match self {
			PathDirection::Shortest => "shortest",
			PathDirection::Clockwise => "clockwise",
			PathDirection::Counterclockwise => "counterclockwise",
		}
	}
}

/// Reporting mode of the color sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSensorMode {
	/// Reflection, color index, and raw RGB in one five-value tuple.
	Tuples,
	/// Unprocessed sensor output.
	Raw,
}

impl ColorSensorMode {
	/// Wire value for the `modetype` field.
	pub fn name(self) -> &'static str {
		match self {
			ColorSensorMode::Tuples => "tuples",
			ColorSensorMode::Raw => "raw",
		}
	}

	/// Mode parameters merged into the `set_device_mode` payload.
	pub fn params(self) -> Value {
		match self {
			ColorSensorMode::Tuples => json!({ "mode": [1, 0, 0, 0, 5, 0, 5, 1, 5, 2] }),
			ColorSensorMode::Raw => json!({ "mode": 2 }),
		}
	}
}

/// Direction the display rotates by 90 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRotation {
	Clockwise,
	Counterclockwise,
}

impl DisplayRotation {
	/// Wire value.
	pub fn name(self) -> &'static str {
		match self {
			DisplayRotation::Clockwise => "clockwise",
			DisplayRotation::Counterclockwise => "counterclockwise",
		}
	}
}

/// Edge of the hub the display treats as up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOrientation {
	Top,
	Right,
	Bottom,
	Left,
}

impl DisplayOrientation {
	/// Wire value. One-based.
	pub fn code(self) -> u8 {
		self as u8 + 1
	}
}

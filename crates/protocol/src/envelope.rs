//! Command and event envelopes.
//!
//! Packets are framed by [`FRAME_DELIMITER`]. Inbound packets are classified
//! by shape rather than by a type tag: anything carrying `"i"` answers a
//! command, anything else carrying `"m"` is a pushed event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminator appended to every packet in both directions.
pub const FRAME_DELIMITER: u8 = 0x0D;

/// Outbound correlated command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
	/// Correlation id, echoed back in the matching [`TaskResult`].
	pub i: String,
	/// Method name, e.g. `scratch.motor_start`.
	pub m: String,
	/// Method parameters; `{}` for methods that take none.
	pub p: Value,
}

impl Command {
	pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
		Self {
			i: id.into(),
			m: method.into(),
			p: params,
		}
	}
}

/// Inbound answer to a [`Command`], matched by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
	/// Correlation id of the command this answers.
	pub i: String,
	/// Result payload; null on bare acknowledgements.
	#[serde(default)]
	pub r: Value,
}

/// Pushed event frame.
///
/// The kind selects the payload layout: kind 0 carries the full telemetry
/// frame, the other numeric kinds carry small tuples, and a few late
/// additions to the firmware arrive with a string kind instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
	/// Event kind, numeric or named on the wire.
	pub m: EventKind,
	/// Kind-specific payload.
	#[serde(default)]
	pub p: Value,
}

impl EventFrame {
	/// Classifies the frame for dispatch.
	pub fn kind(&self) -> MessageKind {
		match &self.m {
			EventKind::Code(0) => MessageKind::Telemetry,
			EventKind::Code(2) => MessageKind::Power,
			EventKind::Code(3) => MessageKind::Button,
			EventKind::Code(4) => MessageKind::Knock,
			EventKind::Code(14) => MessageKind::StateChange,
			EventKind::Code(15) => MessageKind::Broadcast,
			EventKind::Name(name) if name == "runtime_error" => MessageKind::RuntimeError,
			_ => MessageKind::Other,
		}
	}
}

/// Raw discriminant of an [`EventFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventKind {
	Code(i64),
	Name(String),
}

/// Decoded event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
	/// Kind 0: device table plus hub motion and status slots.
	Telemetry,
	/// Kind 2: battery voltage, charge percentage, charger state.
	Power,
	/// Kind 3: hub face button press or release.
	Button,
	/// Kind 4: the hub was physically tapped.
	Knock,
	/// Kind 14: the hub changed orientation.
	StateChange,
	/// Kind 15: user program broadcast message.
	Broadcast,
	/// Named kind `runtime_error`: base64 stack trace from the hub program.
	RuntimeError,
	/// Anything this client does not know. Ignored.
	Other,
}

/// Any packet the hub can push, classified by shape.
///
/// An object carrying both `"i"` and `"m"` is a task result; the result
/// check wins, matching the hub's own precedence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
	Result(TaskResult),
	Event(EventFrame),
	Unknown(Value),
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn command_serializes_with_id_first() {
		let cmd = Command::new("9ab1", "scratch.display_text", json!({ "text": "hi" }));
		let wire = serde_json::to_string(&cmd).unwrap();
		assert_eq!(wire, r#"{"i":"9ab1","m":"scratch.display_text","p":{"text":"hi"}}"#);
	}

	#[test]
	fn packet_with_id_classifies_as_result() {
		let inbound: Inbound = serde_json::from_str(r#"{"i":"7x2K","r":0}"#).unwrap();
		match inbound {
			Inbound::Result(result) => {
				assert_eq!(result.i, "7x2K");
				assert_eq!(result.r, json!(0));
			}
			other => panic!("expected result, got {other:?}"),
		}
	}

	#[test]
	fn result_wins_over_event_when_both_keys_present() {
		let inbound: Inbound = serde_json::from_str(r#"{"i":"9ab1","m":0,"r":7}"#).unwrap();
		assert!(matches!(inbound, Inbound::Result(_)));
	}

	#[test]
	fn result_payload_defaults_to_null() {
		let inbound: Inbound = serde_json::from_str(r#"{"i":"aa00"}"#).unwrap();
		match inbound {
			Inbound::Result(result) => assert!(result.r.is_null()),
			other => panic!("expected result, got {other:?}"),
		}
	}

	#[test]
	fn numeric_event_kinds_decode() {
		let cases = [
			(0, MessageKind::Telemetry),
			(2, MessageKind::Power),
			(3, MessageKind::Button),
			(4, MessageKind::Knock),
			(14, MessageKind::StateChange),
			(15, MessageKind::Broadcast),
			(99, MessageKind::Other),
		];
		for (code, expected) in cases {
			let raw = format!(r#"{{"m":{code},"p":[]}}"#);
			let inbound: Inbound = serde_json::from_str(&raw).unwrap();
			match inbound {
				Inbound::Event(frame) => assert_eq!(frame.kind(), expected),
				other => panic!("expected event, got {other:?}"),
			}
		}
	}

	#[test]
	fn named_event_kind_decodes() {
		let inbound: Inbound =
			serde_json::from_str(r#"{"m":"runtime_error","p":[0,0,0,"dHJhY2U="]}"#).unwrap();
		match inbound {
			Inbound::Event(frame) => assert_eq!(frame.kind(), MessageKind::RuntimeError),
			other => panic!("expected event, got {other:?}"),
		}
	}

	#[test]
	fn unrecognized_shape_is_preserved() {
		let inbound: Inbound = serde_json::from_str(r#"{"banner":"boot ok"}"#).unwrap();
		assert!(matches!(inbound, Inbound::Unknown(_)));
	}
}

//! Telemetry frame layout and tolerant field extraction.
//!
//! A kind-0 event frame carries one array: slots 0 through 5 hold the
//! per-port device table, the remaining slots hold hub motion and status
//! fields. Every slot decodes independently; a missing or malformed slot
//! never aborts the rest of the frame.

use serde_json::Value;

/// Number of leading slots holding per-port device entries.
pub const DEVICE_SLOTS: usize = 6;

/// Acceleration triple `[x, y, z]`.
pub const ACCELERATION: usize = 7;

/// Rotation triple `[x, y, z]`.
pub const ROTATION: usize = 8;

/// Orientation triple `[yaw, pitch, roll]`. Not sent by every firmware.
pub const ORIENTATION: usize = 9;

/// Free-form status text.
pub const STATUS_TEXT: usize = 10;

/// Milliseconds the current hub program has been running.
pub const RUNTIME_MS: usize = 11;

/// Distance the ranging sensor reports when nothing is in range.
pub const DISTANCE_OUT_OF_RANGE: i64 = 201;

/// Placeholder the color sensor reports when a metric has no reading.
pub const COLOR_NO_READING: i64 = -1;

/// Integer at `index`, tolerating wire floats by truncation.
pub fn int_at(slots: &Value, index: usize) -> Option<i64> {
	let value = slots.get(index)?;
	value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// Integer at `index`, falling back to `default` when absent or malformed.
pub fn int_at_or(slots: &Value, index: usize, default: i64) -> i64 {
	int_at(slots, index).unwrap_or(default)
}

/// Float at `index`.
pub fn float_at(slots: &Value, index: usize) -> Option<f64> {
	slots.get(index)?.as_f64()
}

/// Boolean at `index`.
pub fn bool_at(slots: &Value, index: usize) -> Option<bool> {
	slots.get(index)?.as_bool()
}

/// String at `index`.
pub fn text_at(slots: &Value, index: usize) -> Option<&str> {
	slots.get(index)?.as_str()
}

/// Integer triple at `index`, e.g. an `[x, y, z]` motion slot.
pub fn triple_at(slots: &Value, index: usize) -> Option<[i64; 3]> {
	let inner = slots.get(index)?;
	Some([int_at(inner, 0)?, int_at(inner, 1)?, int_at(inner, 2)?])
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn int_extraction_truncates_floats() {
		let slots = json!([10, 3.9, "x"]);
		assert_eq!(int_at(&slots, 0), Some(10));
		assert_eq!(int_at(&slots, 1), Some(3));
		assert_eq!(int_at(&slots, 2), None);
		assert_eq!(int_at(&slots, 9), None);
		assert_eq!(int_at_or(&slots, 9, 201), 201);
	}

	#[test]
	fn triples_require_all_three_members() {
		let slots = json!([[1, 2, 3], [4, 5]]);
		assert_eq!(triple_at(&slots, 0), Some([1, 2, 3]));
		assert_eq!(triple_at(&slots, 1), None);
		assert_eq!(triple_at(&slots, 2), None);
	}

	#[test]
	fn typed_extractors_reject_other_shapes() {
		let slots = json!([true, "ready", 1]);
		assert_eq!(bool_at(&slots, 0), Some(true));
		assert_eq!(text_at(&slots, 1), Some("ready"));
		assert_eq!(bool_at(&slots, 2), None);
		assert_eq!(text_at(&slots, 0), None);
		assert_eq!(float_at(&slots, 2), Some(1.0));
	}
}

//! Device registry and the peripheral seam.
//!
//! The session tracks what the hub says is plugged in; the typed device
//! implementations live in the API crate and reach the registry through
//! the [`Peripheral`] and [`DeviceFactory`] traits.

use crate::session::Session;
use brickline_protocol::{DeviceKind, Port};
use dashmap::DashMap;
use downcast_rs::{DowncastSync, impl_downcast};
use serde_json::Value;
use std::sync::Arc;

/// Metric a telemetry update changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
	Speed,
	RelativePosition,
	AbsolutePosition,
	Power,
	Distance,
	Reflection,
	Color,
	Red,
	Green,
	Blue,
}

/// A typed device attached to a hub port.
///
/// The session only needs identity and telemetry entry points; everything
/// device-specific stays behind the trait.
pub trait Peripheral: DowncastSync {
	fn port(&self) -> Port;

	fn kind(&self) -> DeviceKind;

	/// Applies one device-table payload, returning the metrics that
	/// changed. A null payload changes nothing.
	fn apply_update(&self, payload: &Value) -> Vec<Metric>;

	/// Called once when the device leaves the table or the session closes.
	fn detach(&self) {}
}
impl_downcast!(sync Peripheral);

/// Builds typed peripherals when the device table announces them.
///
/// Implemented by the API crate and injected into the session before its
/// run loop starts. Returning `None` declines the kind; the port is left
/// untracked until the table changes.
pub trait DeviceFactory: Send + Sync {
	fn create_device(
		&self,
		session: &Arc<Session>,
		port: Port,
		kind: DeviceKind,
	) -> Option<Arc<dyn Peripheral>>;
}

/// Live device table, keyed by port.
#[derive(Default)]
pub struct DeviceStore {
	devices: DashMap<Port, Arc<dyn Peripheral>>,
}

impl DeviceStore {
	pub fn new() -> DeviceStore {
		DeviceStore::default()
	}

	pub fn insert(&self, device: Arc<dyn Peripheral>) {
		self.devices.insert(device.port(), device);
	}

	pub fn remove(&self, port: Port) -> Option<Arc<dyn Peripheral>> {
		self.devices.remove(&port).map(|(_, device)| device)
	}

	pub fn get(&self, port: Port) -> Option<Arc<dyn Peripheral>> {
		self.devices.get(&port).map(|entry| Arc::clone(entry.value()))
	}

	/// Device at `port` downcast to its concrete type.
	pub fn get_as<T: Peripheral>(&self, port: Port) -> Option<Arc<T>> {
		self.get(port).and_then(|device| device.downcast_arc::<T>().ok())
	}

	/// Snapshot of every attached device, in port order.
	pub fn all(&self) -> Vec<Arc<dyn Peripheral>> {
		Port::ALL.iter().filter_map(|port| self.get(*port)).collect()
	}

	/// True while a device of `kind` is attached at `port`. Handles older
	/// than the current table entry fail this check.
	pub fn is_attached(&self, port: Port, kind: DeviceKind) -> bool {
		self.get(port).is_some_and(|device| device.kind() == kind)
	}

	/// Removes every device, returning them in port order.
	pub fn drain(&self) -> Vec<Arc<dyn Peripheral>> {
		Port::ALL.iter().filter_map(|port| self.remove(*port)).collect()
	}

	pub fn len(&self) -> usize {
		self.devices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.devices.is_empty()
	}
}

//! Scripted in-memory transport for hardware-free tests.
//!
//! A [`MockWire`] is the test's handle on one fake link: push inbound
//! bytes, inspect outbound frames, inject read failures. The paired
//! [`MockTransport`] is what the session drives.

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportProvider};
use brickline_protocol::FRAME_DELIMITER;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared state behind one mock link.
#[derive(Default)]
pub struct MockWire {
	inbound: Mutex<VecDeque<u8>>,
	sent: Mutex<Vec<Vec<u8>>>,
	read_error: AtomicBool,
	disconnected: AtomicBool,
}

impl MockWire {
	/// Queues one packet for the session to read, delimiter included.
	pub fn push_packet(&self, json: &str) {
		let mut inbound = self.inbound.lock();
		inbound.extend(json.as_bytes());
		inbound.push_back(FRAME_DELIMITER);
	}

	/// Queues raw bytes without framing them.
	pub fn push_bytes(&self, bytes: &[u8]) {
		self.inbound.lock().extend(bytes);
	}

	/// Every frame the session sent so far, delimiters included.
	pub fn sent_packets(&self) -> Vec<Vec<u8>> {
		self.sent.lock().clone()
	}

	pub fn sent_count(&self) -> usize {
		self.sent.lock().len()
	}

	/// Sent frames decoded as JSON, skipping any that do not parse.
	pub fn sent_commands(&self) -> Vec<Value> {
		self.sent
			.lock()
			.iter()
			.filter_map(|frame| {
				let body = frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(frame);
				serde_json::from_slice(body).ok()
			})
			.collect()
	}

	/// Makes every subsequent read fail, as a dropped link would.
	pub fn fail_reads(&self) {
		self.read_error.store(true, Ordering::SeqCst);
	}

	pub fn is_disconnected(&self) -> bool {
		self.disconnected.load(Ordering::SeqCst)
	}
}

/// Transport half of a mock link.
pub struct MockTransport {
	wire: Arc<MockWire>,
}

impl MockTransport {
	/// A fresh link plus the test-side handle on it.
	pub fn create() -> (MockTransport, Arc<MockWire>) {
		let wire = Arc::new(MockWire::default());
		(MockTransport { wire: Arc::clone(&wire) }, wire)
	}

	fn over(wire: Arc<MockWire>) -> MockTransport {
		MockTransport { wire }
	}
}

impl Transport for MockTransport {
	fn send(&mut self, frame: &[u8]) -> Result<()> {
		if self.wire.is_disconnected() {
			return Err(Error::NotActive);
		}
		self.wire.sent.lock().push(frame.to_vec());
		Ok(())
	}

	fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
		if self.wire.read_error.load(Ordering::SeqCst) {
			return Err(Error::Transport(std::io::Error::new(
				std::io::ErrorKind::ConnectionReset,
				"mock read failure",
			)));
		}
		let mut inbound = self.wire.inbound.lock();
		let mut count = 0;
		while count < buf.len() {
			match inbound.pop_front() {
				Some(byte) => {
					buf[count] = byte;
					count += 1;
				}
				None => break,
			}
		}
		Ok(count)
	}

	fn disconnect(&mut self) {
		self.wire.disconnected.store(true, Ordering::SeqCst);
	}
}

/// Hands out mock links keyed by address.
#[derive(Default)]
pub struct MockProvider {
	wires: DashMap<String, Arc<MockWire>>,
	refused: DashSet<String>,
}

impl MockProvider {
	pub fn new() -> MockProvider {
		MockProvider::default()
	}

	/// The wire `connect` will use for `address`, created on first use.
	pub fn wire(&self, address: &str) -> Arc<MockWire> {
		Arc::clone(
			&self
				.wires
				.entry(address.to_string())
				.or_insert_with(|| Arc::new(MockWire::default())),
		)
	}

	/// Makes `connect` fail for `address`.
	pub fn refuse(&self, address: &str) {
		self.refused.insert(address.to_string());
	}
}

impl TransportProvider for MockProvider {
	fn connect(&self, address: &str) -> Result<Box<dyn Transport>> {
		if self.refused.contains(address) {
			return Err(Error::ConnectFailed(format!("{address} refused the link")));
		}
		Ok(Box::new(MockTransport::over(self.wire(address))))
	}
}

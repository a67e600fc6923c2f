//! Transport boundary and packet framing.
//!
//! A [`Transport`] is a connected byte stream with poll-style reads: a read
//! with nothing pending returns zero bytes and the reader backs off briefly
//! instead of blocking. The reader task owns framing, so everything
//! downstream of it sees whole packets only.

use crate::error::Result;
use brickline_protocol::FRAME_DELIMITER;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Connected byte stream to one hub.
pub trait Transport: Send {
	/// Writes one delimited frame.
	fn send(&mut self, frame: &[u8]) -> Result<()>;

	/// Reads whatever bytes are pending into `buf`, returning the count.
	/// Zero means nothing was pending; it is not end-of-stream.
	fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;

	/// Tears the link down. Later reads and writes fail.
	fn disconnect(&mut self);
}

/// Opens [`Transport`]s from addresses.
pub trait TransportProvider: Send + Sync {
	fn connect(&self, address: &str) -> Result<Box<dyn Transport>>;
}

/// Transport shared between the reader task and command senders.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Bytes requested per poll.
pub(crate) const READ_CHUNK: usize = 4096;

/// Pause after a poll that returned no data.
pub(crate) const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Splits a byte stream into delimiter-terminated packets.
///
/// Packets keep their trailing delimiter. Bytes after the last delimiter
/// stay buffered until the rest of their packet arrives, so the packet
/// sequence does not depend on how the stream was chunked.
#[derive(Debug, Default)]
pub struct PacketFramer {
	buf: Vec<u8>,
}

impl PacketFramer {
	pub fn new() -> PacketFramer {
		PacketFramer::default()
	}

	/// Appends raw bytes from the stream.
	pub fn push(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	/// Next complete packet, delimiter included.
	pub fn next_packet(&mut self) -> Option<Vec<u8>> {
		let end = self.buf.iter().position(|&b| b == FRAME_DELIMITER)?;
		let rest = self.buf.split_off(end + 1);
		Some(std::mem::replace(&mut self.buf, rest))
	}

	/// Bytes buffered without a terminator yet.
	pub fn pending(&self) -> usize {
		self.buf.len()
	}
}

/// Reader task: polls the transport, frames packets, forwards them.
///
/// Exits when the transport errors or the session side hangs up. Empty
/// reads back off for [`IDLE_BACKOFF`] so an idle link does not spin.
pub(crate) async fn run_reader(transport: SharedTransport, packets: mpsc::Sender<Vec<u8>>) {
	let mut framer = PacketFramer::new();
	let mut buf = vec![0u8; READ_CHUNK];
	loop {
		let read = { transport.lock().read_chunk(&mut buf) };
		match read {
			Ok(0) => tokio::time::sleep(IDLE_BACKOFF).await,
			Ok(count) => {
				framer.push(&buf[..count]);
				while let Some(packet) = framer.next_packet() {
					if packets.send(packet).await.is_err() {
						return;
					}
				}
			}
			Err(error) => {
				tracing::debug!("Transport read failed: {error}");
				return;
			}
		}
	}
}

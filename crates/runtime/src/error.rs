//! Error types for hub communication.

use brickline_protocol::{DeviceKind, Port};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while talking to a hub.
#[derive(Debug, Error)]
pub enum Error {
	/// The transport provider could not open a link to the hub.
	#[error("Failed to connect to hub: {0}")]
	ConnectFailed(String),

	/// The underlying byte stream failed.
	#[error("Transport error: {0}")]
	Transport(#[from] std::io::Error),

	/// The session is not active; nothing can be sent.
	#[error("Session is not active")]
	NotActive,

	/// An await ran out of time.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// A channel endpoint disappeared mid-operation.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// An outbound payload could not be serialized.
	#[error("Encode error: {0}")]
	Encode(#[from] serde_json::Error),

	/// The hub answered with something this client cannot make sense of.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// A device handle outlived its device-table entry.
	#[error("No {kind} attached on port {port}")]
	StaleDevice { port: Port, kind: DeviceKind },
}

impl Error {
	/// True for timeout-flavored failures.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// True when a device handle no longer matches the device table.
	pub fn is_stale_device(&self) -> bool {
		matches!(self, Error::StaleDevice { .. })
	}
}

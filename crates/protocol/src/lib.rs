//! Wire types for the hub stream protocol.
//!
//! Everything the hub sends or accepts is one JSON object terminated by a
//! carriage return. Outbound traffic is a correlated command envelope;
//! inbound traffic is either a task result (carries `"i"`) or a pushed
//! event frame (carries `"m"`). These types are pure data: no IO, no
//! runtime, no retry logic.
//!
//! The session machinery that moves these types over a transport lives in
//! `brickline-runtime`; the typed device API lives in `brickline`.

pub mod display;
pub mod envelope;
pub mod telemetry;
pub mod types;

pub use display::*;
pub use envelope::*;
pub use types::*;

//! Hub link runtime - framing, task correlation, and session machinery
//!
//! This crate provides the low-level infrastructure for talking to a hub
//! over a delimited byte stream:
//!
//! - **Transport**: Poll-style byte source/sink plus packet framing
//! - **Tasks**: Correlation ids and out-of-order result delivery
//! - **Session**: Per-hub state machine, dispatch loop, and liveness
//! - **Devices**: Port-keyed registry behind the [`DeviceFactory`] seam
//! - **Events**: Broadcast bus with one-shot waiters and value watches
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  brickline   │  Hub facade and device drivers
//! └──────┬───────┘
//!        │ implements DeviceFactory
//! ┌──────▼───────────┐
//! │ brickline-runtime│  This crate
//! │  ┌────────────┐  │
//! │  │ Session    │  │  dispatch, liveness, teardown
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Tasks      │  │  id reservation, result parking
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Transport  │  │  framing over the raw byte link
//! │  └────────────┘  │
//! └──────────────────┘
//! ```
//!
//! # Decoupling via DeviceFactory
//!
//! The session builds device drivers through the [`DeviceFactory`] trait
//! rather than concrete types, so the runtime stays independent of the
//! binding layer above it and tests can substitute their own devices.

pub mod device;
pub mod error;
pub mod events;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod session;
pub mod tasks;
pub mod transport;
pub mod watch;

// Re-export key types at crate root
pub use device::{DeviceFactory, DeviceStore, Metric, Peripheral};
pub use error::{Error, Result};
pub use events::{EventBus, EventStream, EventWaiter, Subscription};
pub use session::{HubEvent, HubTelemetry, Session, SessionState};
pub use tasks::{ResultWaiter, TaskRegistry};
pub use transport::{PacketFramer, Transport, TransportProvider};
pub use watch::{DEFAULT_TOLERANCE, ValueWatcher, WatchPool};

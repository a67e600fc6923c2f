//! Client bindings for a LEGO-style robotics hub over a byte-stream link.
//!
//! The hub speaks JSON packets, one object per carriage-return-delimited
//! frame. This crate layers a typed API over that stream: a [`HubManager`]
//! opens sessions through a caller-supplied [`TransportProvider`], each
//! [`Hub`] exposes telemetry, events, and command builders, and devices
//! appear as typed drivers as the hub announces them on its ports.
//!
//! ```rust
//! use brickline::{HubManager, Port, StopType};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo(provider: Arc<dyn brickline::TransportProvider>) -> brickline::Result<()> {
//! let manager = HubManager::new(provider);
//! let hub = manager.connect("A8:E2:C1:9C:91:02").await?;
//!
//! hub.display().text("hi").send().await?;
//!
//! if let Some(motor) = hub.motor(Port::A) {
//!     let outcome = motor
//!         .go_to_relative_position(180, 50, true, StopType::Brake, 80, 80)?
//!         .send_with_timeout(Duration::from_secs(2))
//!         .await?;
//!     println!("arrived: {outcome:?}");
//! }
//!
//! let _buttons = hub.on_button_pressed(|button| println!("pressed {button:?}"));
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! Device handles go stale once the hub reports a different device on
//! their port; a stale handle refuses to build commands with
//! [`Error::StaleDevice`]. Sessions end on explicit disconnect or after
//! five seconds of wire silence, and every observer sees the disconnect
//! exactly once.

pub mod command;
pub mod devices;
pub mod hub;
pub mod manager;

pub use brickline_protocol::{
	Animation, ColorSensorMode, DeviceKind, DisplayOrientation, DisplayRotation, Glyph, HubButton,
	HubState, PathDirection, Port, StopType,
};
pub use brickline_runtime::{
	DEFAULT_TOLERANCE, Error, EventStream, HubEvent, HubTelemetry, Metric, Peripheral, Result,
	SessionState, Subscription, Transport, TransportProvider, ValueWatcher,
};
pub use command::{Command, DEFAULT_COMMAND_TIMEOUT, MotionOutcome, TrackedMotorCommand, TrackedMoveCommand};
pub use devices::{ColorSensor, DistanceSensor, HubDeviceFactory, Motor};
pub use hub::{AnimationOptions, Broadcast, Display, Hub, Motion, Sound};
pub use manager::{HubManager, ManagerEvent};

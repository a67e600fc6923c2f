//! Device table behavior through the public API: attach, detach, typed
//! accessors, and handle staleness.

use brickline::{DeviceKind, Error, EventStream, Hub, HubEvent, HubManager, Port, StopType};
use brickline_runtime::mock::{MockProvider, MockWire};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const HUB_ADDRESS: &str = "A8:E2:C1:9C:91:02";

async fn connect_hub() -> (HubManager, Hub, Arc<MockWire>) {
	let provider = Arc::new(MockProvider::new());
	let wire = provider.wire(HUB_ADDRESS);
	let manager = HubManager::new(provider);
	let hub = manager.connect(HUB_ADDRESS).await.expect("mock connect failed");
	(manager, hub, wire)
}

fn telemetry_frame(devices: &[(Port, i64, Value)]) -> String {
	let mut slots: Vec<String> = Port::ALL.iter().map(|_| "[0,null]".to_string()).collect();
	for (port, kind, data) in devices {
		slots[port.index()] = format!("[{kind},{data}]");
	}
	format!(r#"{{"m":0,"p":[{},0,[0,0,0],[0,0,0],[0,0,0],"",0]}}"#, slots.join(","))
}

async fn next_event(events: &mut EventStream<HubEvent>) -> HubEvent {
	tokio::time::timeout(Duration::from_secs(1), events.recv())
		.await
		.expect("no event within a second")
		.expect("event stream closed")
}

#[tokio::test]
async fn test_telemetry_attaches_typed_drivers() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();

	wire.push_packet(&telemetry_frame(&[(Port::A, 75, json!([10, 360, 5, 100]))]));

	match next_event(&mut events).await {
		HubEvent::DeviceAttached(device) => {
			assert_eq!(device.port(), Port::A);
			assert_eq!(device.kind(), DeviceKind::Motor);
		}
		other => panic!("expected an attach, got {other:?}"),
	}

	let motor = hub.motor(Port::A).expect("typed motor accessor");
	assert_eq!(motor.speed(), 10);
	assert_eq!(motor.relative_position(), 360);
	assert_eq!(motor.absolute_position(), 5);
	assert_eq!(motor.power(), 100);

	// The same port through the wrong accessor is nothing.
	assert!(hub.color_sensor(Port::A).is_none());
	assert!(hub.motor(Port::B).is_none());
	assert_eq!(hub.devices().len(), 1);

	manager.shutdown().await;
}

#[tokio::test]
async fn test_kind_change_detaches_and_marks_the_old_handle_stale() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();

	wire.push_packet(&telemetry_frame(&[(Port::B, 75, json!([0, 0, 0, 0]))]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceAttached(_)));
	let motor = hub.motor(Port::B).unwrap();
	assert!(motor.start(50, true, 100).is_ok());

	// The same port now reports a distance sensor.
	wire.push_packet(&telemetry_frame(&[(Port::B, 62, json!([40]))]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceDetached(_)));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceAttached(_)));

	let error = motor.start(50, true, 100).unwrap_err();
	assert!(error.is_stale_device());
	assert!(hub.motor(Port::B).is_none());
	assert_eq!(hub.distance_sensor(Port::B).unwrap().distance(), 40);

	manager.shutdown().await;
}

#[tokio::test]
async fn test_device_removal_detaches() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();

	wire.push_packet(&telemetry_frame(&[(Port::F, 61, json!([50, 0, 0, 0, 0]))]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceAttached(_)));
	let sensor = hub.color_sensor(Port::F).unwrap();

	// An empty slot where the sensor was.
	wire.push_packet(&telemetry_frame(&[]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceDetached(_)));

	assert!(hub.color_sensor(Port::F).is_none());
	assert!(sensor.set_mode(brickline::ColorSensorMode::Raw).unwrap_err().is_stale_device());

	manager.shutdown().await;
}

#[tokio::test]
async fn test_sensor_snapshots_and_watches() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();

	wire.push_packet(&telemetry_frame(&[(Port::C, 61, json!([55, 3, 120, 80, 33]))]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceAttached(_)));
	let color = hub.color_sensor(Port::C).unwrap();
	assert_eq!(color.reflection(), 55);
	assert_eq!(color.color(), 3);
	assert_eq!((color.red(), color.green(), color.blue()), (120, 80, 33));

	wire.push_packet(&telemetry_frame(&[
		(Port::C, 61, json!([55, 3, 120, 80, 33])),
		(Port::D, 62, json!([201])),
	]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceAttached(_)));
	let distance = hub.distance_sensor(Port::D).unwrap();
	assert_eq!(distance.distance(), 201);
	assert!(!distance.in_range());

	let watcher = distance.watch_distance(40, 5).unwrap();
	wire.push_packet(&telemetry_frame(&[
		(Port::C, 61, json!([55, 3, 120, 80, 33])),
		(Port::D, 62, json!([38])),
	]));

	let value = watcher.wait(Duration::from_secs(1)).await.unwrap();
	assert_eq!(value, 43);
	assert_eq!(distance.distance(), 38);
	assert!(distance.in_range());

	manager.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_detaches_devices_and_settles_pending_watches() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();

	wire.push_packet(&telemetry_frame(&[(Port::A, 75, json!([0, 0, 0, 0]))]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceAttached(_)));
	let motor = hub.motor(Port::A).unwrap();
	let watcher = motor.watch_relative_position(90, 5).unwrap();

	manager.shutdown().await;

	let error = watcher.wait(Duration::from_secs(1)).await.unwrap_err();
	assert!(matches!(error, Error::ChannelClosed));

	let error = motor.run_for_degrees(50, 360, true, StopType::Brake, 80, 80).unwrap_err();
	assert!(error.is_stale_device());
	assert!(hub.devices().is_empty());
}

//! Motor command wire shapes and the answer-versus-position races.

use brickline::{
	EventStream, Hub, HubEvent, HubManager, MotionOutcome, Motor, PathDirection, Port, StopType,
};
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

async fn wait_for_commands(wire: &MockWire, count: usize) -> Vec<Value> {
	for _ in 0..100 {
		if wire.sent_count() >= count {
			return wire.sent_commands();
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("hub never sent {count} commands, saw {}", wire.sent_count());
}

/// Connected hub with a motor already attached on port A.
async fn motor_hub() -> (HubManager, Hub, Arc<MockWire>, Arc<Motor>) {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();
	wire.push_packet(&telemetry_frame(&[(Port::A, 75, json!([0, 0, 0, 0]))]));
	next_event(&mut events).await;
	let motor = hub.motor(Port::A).expect("motor on port A");
	(manager, hub, wire, motor)
}

#[tokio::test]
async fn test_run_for_degrees_wire_shape() {
	let (manager, _hub, wire, motor) = motor_hub().await;

	motor.run_for_degrees(50, 360, true, StopType::Brake, 80, 70).unwrap().send_detached().unwrap();

	let commands = wait_for_commands(&wire, 2).await;
	let command = &commands[1];
	assert_eq!(command["m"], "scratch.motor_run_for_degrees");
	assert_eq!(command["p"]["port"], "A");
	assert_eq!(command["p"]["speed"], 50);
	assert_eq!(command["p"]["degrees"], 360);
	assert_eq!(command["p"]["stall"], true);
	assert_eq!(command["p"]["stop"], 1);
	assert_eq!(command["p"]["acceleration"], 80);
	assert_eq!(command["p"]["deceleration"], 70);

	manager.shutdown().await;
}

#[tokio::test]
async fn test_plain_motor_wire_shapes() {
	let (manager, _hub, wire, motor) = motor_hub().await;

	motor.start(75, false, 100).unwrap().send_detached().unwrap();
	motor.run_timed(30, 1500, true, StopType::Coast, 90, 90).unwrap().send_detached().unwrap();
	motor.pwm(40, true, 90).unwrap().send_detached().unwrap();
	motor.set_position(0).unwrap().send_detached().unwrap();
	motor.stop(StopType::Hold, 60).unwrap().send_detached().unwrap();

	let commands = wait_for_commands(&wire, 6).await;

	assert_eq!(commands[1]["m"], "scratch.motor_start");
	assert_eq!(commands[1]["p"]["speed"], 75);
	assert_eq!(commands[1]["p"]["stall"], false);

	assert_eq!(commands[2]["m"], "scratch.motor_run_timed");
	assert_eq!(commands[2]["p"]["time"], 1500);
	assert_eq!(commands[2]["p"]["stop"], 0);

	assert_eq!(commands[3]["m"], "scratch.motor_pwm");
	assert_eq!(commands[3]["p"]["power"], 40);

	assert_eq!(commands[4]["m"], "scratch.motor_set_position");
	assert_eq!(commands[4]["p"]["offset"], 0);

	assert_eq!(commands[5]["m"], "scratch.motor_stop");
	assert_eq!(commands[5]["p"]["stop"], 2);
	assert_eq!(commands[5]["p"]["deceleration"], 60);

	manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_tracked_command_settles_when_the_position_arrives_first() {
	let (manager, _hub, wire, motor) = motor_hub().await;

	let tracked = motor.go_to_relative_position(100, 50, true, StopType::Brake, 80, 80).unwrap();
	let send = tokio::spawn(tracked.send_with_timeout(Duration::from_secs(3)));

	// Let the command land on the wire before any telemetry moves.
	let commands = wait_for_commands(&wire, 2).await;
	assert_eq!(commands[1]["m"], "scratch.motor_go_to_relative_position");
	assert_eq!(commands[1]["p"]["position"], 100);

	for position in [40, 80, 96] {
		wire.push_packet(&telemetry_frame(&[(Port::A, 75, json!([0, position, 0, 0]))]));
	}

	let outcome = send.await.unwrap().unwrap();
	assert_eq!(outcome, MotionOutcome::Reached(101));
	assert!(outcome.is_reached());

	manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_tracked_command_settles_on_the_ack_when_the_motor_never_arrives() {
	let (manager, _hub, wire, motor) = motor_hub().await;

	let tracked = motor
		.go_to_absolute_position(180, 50, PathDirection::Shortest, true, StopType::Hold, 80, 80)
		.unwrap();
	let send = tokio::spawn(tracked.send_with_timeout(Duration::from_secs(3)));

	let commands = wait_for_commands(&wire, 2).await;
	let command = &commands[1];
	assert_eq!(command["m"], "scratch.motor_go_direction_to_position");
	assert_eq!(command["p"]["direction"], "shortest");
	let id = command["i"].as_str().unwrap();

	// A position nowhere near the target, then the acknowledgement.
	wire.push_packet(&telemetry_frame(&[(Port::A, 75, json!([0, 0, 20, 0]))]));
	wire.push_packet(&format!(r#"{{"i":"{id}","r":"done"}}"#));

	let outcome = send.await.unwrap().unwrap();
	assert_eq!(outcome, MotionOutcome::Acknowledged(json!("done")));
	assert!(!outcome.is_reached());

	manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_tracked_command_times_out_when_nothing_settles_it() {
	let (manager, _hub, wire, motor) = motor_hub().await;

	let tracked = motor.go_to_relative_position(500, 50, true, StopType::Brake, 80, 80).unwrap();
	let send = tokio::spawn(tracked.send_with_timeout(Duration::from_millis(200)));

	wait_for_commands(&wire, 2).await;
	wire.push_packet(&telemetry_frame(&[(Port::A, 75, json!([0, 10, 0, 0]))]));

	let error = send.await.unwrap().unwrap_err();
	assert!(error.is_timeout());

	manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_tank_degrees_needs_both_counters_before_the_watch_side_wins() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();
	wire.push_packet(&telemetry_frame(&[
		(Port::A, 75, json!([0, 0, 0, 0])),
		(Port::B, 75, json!([0, 0, 0, 0])),
	]));
	next_event(&mut events).await;
	next_event(&mut events).await;
	let left = hub.motor(Port::A).unwrap();
	let right = hub.motor(Port::B).unwrap();

	let tracked = hub
		.motion()
		.tank_degrees(&left, &right, 50, -50, 90, StopType::Brake, 80, 80)
		.unwrap();
	let send = tokio::spawn(tracked.send_with_timeout(Duration::from_secs(3)));

	let commands = wait_for_commands(&wire, 2).await;
	assert_eq!(commands[1]["m"], "scratch.move_tank_degrees");
	assert_eq!(commands[1]["p"]["lmotor"], "A");
	assert_eq!(commands[1]["p"]["rmotor"], "B");
	assert_eq!(commands[1]["p"]["degrees"], 90);

	// Left arrives; the race stays open until right lands near -90.
	wire.push_packet(&telemetry_frame(&[
		(Port::A, 75, json!([0, 88, 0, 0])),
		(Port::B, 75, json!([0, -30, 0, 0])),
	]));
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(!send.is_finished());

	wire.push_packet(&telemetry_frame(&[
		(Port::A, 75, json!([0, 88, 0, 0])),
		(Port::B, 75, json!([0, -93, 0, 0])),
	]));

	let outcome = send.await.unwrap().unwrap();
	assert_eq!(outcome, MotionOutcome::Reached((93, -88)));

	manager.shutdown().await;
}

#[tokio::test]
async fn test_motion_builders_refuse_stale_motors() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();
	wire.push_packet(&telemetry_frame(&[
		(Port::A, 75, json!([0, 0, 0, 0])),
		(Port::B, 75, json!([0, 0, 0, 0])),
	]));
	next_event(&mut events).await;
	next_event(&mut events).await;
	let left = hub.motor(Port::A).unwrap();
	let right = hub.motor(Port::B).unwrap();

	// Port B flips to a distance sensor; the right handle goes stale.
	wire.push_packet(&telemetry_frame(&[
		(Port::A, 75, json!([0, 0, 0, 0])),
		(Port::B, 62, json!([30])),
	]));
	assert!(matches!(next_event(&mut events).await, HubEvent::DeviceDetached(_)));

	let error = hub.motion().stop(&left, &right, StopType::Brake).unwrap_err();
	assert!(error.is_stale_device());
	let error = hub
		.motion()
		.tank_degrees(&left, &right, 50, 50, 90, StopType::Brake, 80, 80)
		.unwrap_err();
	assert!(error.is_stale_device());

	// The surviving motor still builds single-motor commands.
	assert!(left.start(30, true, 100).is_ok());

	manager.shutdown().await;
}

#[tokio::test]
async fn test_move_wire_shapes() {
	let (manager, hub, wire) = connect_hub().await;
	let mut events = hub.events();
	wire.push_packet(&telemetry_frame(&[
		(Port::E, 75, json!([0, 0, 0, 0])),
		(Port::F, 75, json!([0, 0, 0, 0])),
	]));
	next_event(&mut events).await;
	next_event(&mut events).await;
	let left = hub.motor(Port::E).unwrap();
	let right = hub.motor(Port::F).unwrap();

	hub.motion().start_speeds(&left, &right, 60, 60, 100).unwrap().send_detached().unwrap();
	hub.motion().start_powers(&left, &right, -40, 40, 80).unwrap().send_detached().unwrap();
	hub.motion().stop(&left, &right, StopType::Coast).unwrap().send_detached().unwrap();

	let commands = wait_for_commands(&wire, 4).await;

	assert_eq!(commands[1]["m"], "scratch.move_start_speeds");
	assert_eq!(commands[1]["p"]["lmotor"], "E");
	assert_eq!(commands[1]["p"]["rmotor"], "F");
	assert_eq!(commands[1]["p"]["lspeed"], 60);

	assert_eq!(commands[2]["m"], "scratch.move_start_powers");
	assert_eq!(commands[2]["p"]["lpower"], -40);
	assert_eq!(commands[2]["p"]["rpower"], 40);

	assert_eq!(commands[3]["m"], "scratch.move_stop");
	assert_eq!(commands[3]["p"]["stop"], 0);

	manager.shutdown().await;
}

//! End-to-end command scenarios against virtual devices

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use nom_command::Controller;
use nom_config::{Config, ConfigError};
use nom_core::{Clock, CommandOptions, Context, ManualClock, Response, Status};
use nom_devices::DriverRegistry;
use nom_gateway::CapabilityGateway;
use serde_json::{json, Value};

const CONFIG: &str = r#"
location:
  lat: 48.78
  lng: 9.18
devices:
  - id: d-ceiling
    type: virtual
    getters: [state, brightness, power]
    setters: [on, off, flip, brightness, color]
    values: { state: false, brightness: 0, power: 10 }
  - id: d-reading
    type: virtual
    getters: [brightness, power]
    setters: [on, off, brightness]
    values: { power: 20 }
  - id: d-corner
    type: virtual
    getters: [state, power]
    setters: [on, off]
  - id: d-lamp
    type: virtual
    getters: [state]
    setters: [on, off, flip]
    values: { state: false }
  - id: d-bed
    type: virtual
    getters: [brightness]
    setters: [on, off, brightness]
  - id: d-dead
    type: virtual
    getters: [power]
    offline: true
nodes:
  - id: ceiling
    device: d-ceiling
  - id: reading
    device: d-reading
  - id: corner
    device: d-corner
    thresh: 40
  - id: lamp
    device: d-lamp
  - id: bedroom
    device: d-bed
  - id: ghost
    device: d-dead
groups:
  - id: living
    nodes: [ceiling, reading, corner]
actions:
  - id: evening
    do: ["set living 30%", "set lamp on"]
  - event: lamp.state
    value: true
    do: set ceiling on
colors:
  - id: red
    rgb: [255, 0, 0]
"#;

fn controller() -> (Arc<Controller>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Local.with_ymd_and_hms(2024, 6, 15, 21, 0, 0).unwrap(),
    ));
    let config = Config::from_yaml_str(CONFIG).unwrap();
    let controller =
        Controller::with_clock(&config, &DriverRegistry::with_builtin(), clock.clone()).unwrap();
    (Arc::new(controller), clock)
}

async fn run(controller: &Controller, command: &str) -> Response {
    controller
        .execute(command, CommandOptions::default(), Context::new())
        .await
}

fn cached(controller: &Controller, node: &str, attr: &str) -> Option<Value> {
    controller.gateway().current_value(node, attr)
}

#[tokio::test]
async fn test_set_group_percent_with_threshold_node() {
    let (controller, _clock) = controller();

    let response = run(&controller, "set living 50%").await;
    assert_eq!(response.status, Status::Success, "{:?}", response.errors);

    assert_eq!(cached(&controller, "ceiling", "brightness"), Some(json!(50)));
    assert_eq!(cached(&controller, "reading", "brightness"), Some(json!(50)));
    assert_eq!(cached(&controller, "corner", "state"), Some(json!(true)));
}

#[tokio::test]
async fn test_fade_is_monotonic_and_ends_exactly() {
    let (controller, clock) = controller();

    let response = run(&controller, "fade bedroom brightness 0 to 100 for 10s").await;
    assert!(response.is_success(), "{:?}", response.errors);
    assert_eq!(controller.scheduler().faders().len(), 1);

    let mut applied = Vec::new();
    for _ in 0..6 {
        controller.scheduler().tick_faders().await;
        if let Some(value) = cached(&controller, "bedroom", "brightness") {
            applied.push(value.as_u64().unwrap());
        }
        clock.advance_secs(3);
    }

    assert!(applied.windows(2).all(|w| w[0] <= w[1]), "{:?}", applied);
    assert_eq!(applied.last(), Some(&100));
    assert!(controller.scheduler().faders().is_empty());
}

#[tokio::test]
async fn test_explicit_set_cancels_fade() {
    let (controller, _clock) = controller();

    run(&controller, "fade bedroom 0 to 100 over 10m").await;
    assert_eq!(controller.scheduler().faders().len(), 1);

    let response = run(&controller, "set bedroom 20").await;
    assert!(response.is_success());
    assert!(controller.scheduler().faders().is_empty());
}

#[tokio::test]
async fn test_set_until_restores_previous_state() {
    let (controller, clock) = controller();
    run(&controller, "get lamp state").await;
    let start = clock.now_ms();

    let response = run(&controller, "set lamp on until 22:00").await;
    assert!(response.is_success(), "{:?}", response.errors);
    assert_eq!(cached(&controller, "lamp", "state"), Some(json!(true)));

    let singles = controller.scheduler().singles();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].at_ms, start + 3_600_000);
    assert_eq!(singles[0].setter.value, Some(json!(false)));

    clock.advance_secs(3600);
    controller
        .scheduler()
        .tick_singles(controller.as_ref())
        .await;
    assert_eq!(cached(&controller, "lamp", "state"), Some(json!(false)));
    assert!(controller.scheduler().singles().is_empty());
}

#[tokio::test]
async fn test_avg_skips_null_reading() {
    let (controller, _clock) = controller();

    let response = run(&controller, "get avg living power").await;
    assert!(response.is_success(), "{:?}", response.errors);
    assert_eq!(response.results, Some(json!({ "power_avg": 15 })));
}

#[tokio::test]
async fn test_out_of_range_durations_and_offsets_are_reported() {
    let (controller, _clock) = controller();

    for (command, error) in [
        ("set lamp on in 1e20", "Invalid duration \"1e20\""),
        ("set lamp on for 99999999999999999999d", "Invalid duration \"99999999999999999999d\""),
        ("set bedroom 50 over 1e20", "Invalid duration \"1e20\""),
        ("fade bedroom 0 to 100 for 1e20", "Invalid duration \"1e20\""),
        ("fade bedroom 0 to 100 for 0", "Missing duration"),
    ] {
        let response = run(&controller, command).await;
        assert_eq!(response.status, Status::Error, "{}", command);
        assert_eq!(response.errors, vec![error], "{}", command);
    }

    let response = run(&controller, "set lamp on at sunset+1000000000d").await;
    assert_eq!(response.status, Status::Error);
    assert!(response.errors[0].starts_with("Invalid time"), "{:?}", response.errors);

    assert!(controller.scheduler().singles().is_empty());
    assert!(controller.scheduler().faders().is_empty());
    assert_eq!(cached(&controller, "lamp", "state"), None);

    let response = run(&controller, "set lamp on at sunset+1h").await;
    assert!(response.is_success(), "{:?}", response.errors);
    assert_eq!(controller.scheduler().singles().len(), 1);
}

#[tokio::test]
async fn test_getters_dedup_on_node_and_attr() {
    let (controller, _clock) = controller();

    let response = run(&controller, "get ceiling power; get ceiling state; get ceiling power").await;
    let results = response.results.unwrap();
    assert_eq!(results["ceiling"], json!({ "power": 10, "state": false }));
}

#[tokio::test]
async fn test_later_trigger_overrides_earlier() {
    let (controller, _clock) = controller();
    run(&controller, "set lamp on").await;

    // only the flip runs: on → off
    let response = run(&controller, "set lamp on; set lamp flip").await;
    assert!(response.is_success());
    assert_eq!(cached(&controller, "lamp", "state"), Some(json!(false)));
}

#[tokio::test]
async fn test_capability_errors_only_for_single_node() {
    let (controller, _clock) = controller();

    let response = run(&controller, "set living red").await;
    assert!(response.is_success(), "{:?}", response.errors);
    assert_eq!(cached(&controller, "ceiling", "color"), Some(json!([255, 0, 0])));

    let response = run(&controller, "set corner red").await;
    assert_eq!(
        response.errors,
        vec!["Device d-corner type virtual of node corner does not support color."]
    );
}

#[tokio::test]
async fn test_device_error_does_not_abort_siblings() {
    let (controller, _clock) = controller();

    let response = run(&controller, "get ceiling power; get ghost power").await;
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.results.unwrap()["ceiling"]["power"], json!(10));
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].starts_with("Node \"ghost\""));
    assert!(!controller.topology().node("ghost").unwrap().is_online());
}

#[tokio::test]
async fn test_actions_and_unknown_action() {
    let (controller, _clock) = controller();

    let response = controller
        .run_actions(&["evening", "dinner"], Context::new())
        .await;
    assert_eq!(response.errors, vec!["Action \"dinner\" not found."]);
    assert_eq!(cached(&controller, "lamp", "state"), Some(json!(true)));
    assert_eq!(cached(&controller, "reading", "brightness"), Some(json!(30)));
}

#[tokio::test]
async fn test_nothing_to_do_and_json_shape() {
    let (controller, _clock) = controller();

    let response = run(&controller, "get living nosuchattr").await;
    assert_eq!(
        response.to_json(),
        json!({ "status": "error", "errors": ["Nothing to do"] })
    );
}

#[tokio::test]
async fn test_value_change_triggers_action() {
    let (controller, _clock) = controller();
    controller.start().unwrap();

    run(&controller, "set lamp on").await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while cached(&controller, "ceiling", "state") != Some(json!(true)) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("action did not run");
    controller.stop();
}

#[test]
fn test_cyclic_groups_refuse_to_start() {
    let yaml = r#"
devices:
  - id: d-lamp
    type: virtual
    setters: [on, off]
nodes:
  - id: lamp
    device: d-lamp
groups:
  - id: a
    nodes: [lamp]
    groups: [b]
  - id: b
    groups: [a]
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    let err = Controller::from_config(&config, &DriverRegistry::with_builtin())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ConfigError::CyclicGroup(_) | ConfigError::Multiple(_)
    ));
}

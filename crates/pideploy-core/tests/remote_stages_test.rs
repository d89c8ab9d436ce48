//! Device-side stages run individually against a fake device

mod support;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use pideploy_core::deploy::{
    BootstrapOutcome, ConfigDocument, ServiceUnitDescriptor, bootstrap_config, synthesize,
};
use pideploy_core::remote::{Endpoint, StopOutcome, probe, stop_existing};
use pideploy_core::Error;

use support::FakeDevice;

const CONFIG_PATH: &str = "/home/pi/door-monitor/config.json";

fn endpoint() -> Endpoint {
    Endpoint::parse("pi", "pi.local").unwrap()
}

fn descriptor(description: &str) -> ServiceUnitDescriptor {
    ServiceUnitDescriptor {
        name: "door-monitor".to_string(),
        description: description.to_string(),
        user: "pi".to_string(),
        working_directory: Utf8PathBuf::from("/home/pi/door-monitor"),
        exec_path: Utf8PathBuf::from("/home/pi/door-monitor/door-monitor"),
        restart_sec: 10,
    }
}

#[test]
fn test_config_bootstrap_is_write_once() {
    let device = FakeDevice::new();
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();
    let path = Utf8Path::new(CONFIG_PATH);

    let first = bootstrap_config(&session, path, &ConfigDocument::default()).unwrap();
    assert_eq!(first, BootstrapOutcome::Created(path.to_path_buf()));

    // Operator edits the file between deploys
    let edited = "{\"door_url\": \"http://10.0.0.5/rpc\"}\n";
    device
        .state_mut()
        .files
        .insert(path.to_path_buf(), edited.as_bytes().to_vec());

    let second = bootstrap_config(&session, path, &ConfigDocument::default()).unwrap();
    assert_eq!(second, BootstrapOutcome::AlreadyPresent(path.to_path_buf()));
    assert_eq!(device.state().file_text(CONFIG_PATH).unwrap(), edited);
}

#[test]
fn test_unit_is_overwritten_and_enabled() {
    let device = FakeDevice::new().with_file(
        "/etc/systemd/system/door-monitor.service",
        "[Unit]\nDescription=stale\n",
    );
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();
    let unit = descriptor("Door Monitor Service");

    let registered = synthesize(&session, &unit, Utf8Path::new("/etc/systemd/system")).unwrap();

    let state = device.state();
    assert_eq!(
        state.file_text(registered.unit_path.as_str()).unwrap(),
        unit.render()
    );
    assert!(state.daemon_reloads >= 1);
    assert!(state.enabled_units.contains("door-monitor.service"));
    assert!(state.started_units.is_empty());
}

#[test]
fn test_unit_rewritten_with_latest_inputs() {
    let device = FakeDevice::new();
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();
    let unit_dir = Utf8Path::new("/etc/systemd/system");

    let first = descriptor("Door Monitor Service");
    synthesize(&session, &first, unit_dir).unwrap();

    let second = ServiceUnitDescriptor {
        user: "admin".to_string(),
        working_directory: Utf8PathBuf::from("/opt/door-monitor"),
        exec_path: Utf8PathBuf::from("/opt/door-monitor/door-monitor"),
        ..descriptor("Front Door Monitor")
    };
    let registered = synthesize(&session, &second, unit_dir).unwrap();

    let state = device.state();
    let text = state.file_text(registered.unit_path.as_str()).unwrap();
    assert_eq!(text, second.render());
    assert!(text.contains("User=admin\n"));
    assert!(text.contains("ExecStart=/opt/door-monitor/door-monitor\n"));
    assert!(!text.contains("User=pi"));
    assert!(!text.contains("/home/pi"));
    assert_eq!(
        state
            .files
            .keys()
            .filter(|path| path.starts_with(unit_dir))
            .count(),
        1
    );
    assert_eq!(state.daemon_reloads, 2);
    assert!(state.enabled_units.contains("door-monitor.service"));
    assert!(state.started_units.is_empty());
}

#[test]
fn test_stop_sends_no_signal_when_nothing_runs() {
    let device = FakeDevice::new();
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();

    let outcome = stop_existing(&session, "door-monitor", Duration::ZERO).unwrap();

    assert!(matches!(outcome, StopOutcome::NoneRunning));
    assert!(device.state().signals_sent().is_empty());
}

#[test]
fn test_stop_escalates_to_kill() {
    let device = FakeDevice::new()
        .with_running("door-monitor")
        .ignoring_term("door-monitor");
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();

    let outcome = stop_existing(&session, "door-monitor", Duration::ZERO).unwrap();

    match outcome {
        StopOutcome::Stopped { forced, tolerated } => {
            assert!(forced);
            assert!(tolerated.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let state = device.state();
    assert_eq!(state.signals_sent(), vec!["-TERM", "-KILL"]);
    assert!(!state.running.contains("door-monitor"));
}

#[test]
fn test_stop_fails_when_process_survives_kill() {
    let device = FakeDevice::new()
        .with_running("door-monitor")
        .unkillable("door-monitor");
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();

    let result = stop_existing(&session, "door-monitor", Duration::ZERO);

    assert!(matches!(result, Err(Error::RemoteOperation { .. })));
    assert_eq!(device.state().signals_sent(), vec!["-TERM", "-KILL"]);
}

#[test]
fn test_failed_kill_is_tolerated_when_process_exits() {
    let device = FakeDevice::new()
        .with_running("door-monitor")
        .ignoring_term("door-monitor")
        .exiting_before_kill("door-monitor");
    let session = probe(&device, &endpoint(), Duration::from_secs(1)).unwrap();

    let outcome = stop_existing(&session, "door-monitor", Duration::ZERO).unwrap();

    match outcome {
        StopOutcome::Stopped { forced, tolerated } => {
            assert!(forced);
            assert_eq!(tolerated.len(), 1);
            assert!(matches!(tolerated[0], Error::RemoteOperation { .. }));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!device.state().running.contains("door-monitor"));
}

#[test]
fn test_unreachable_device_reports_guidance() {
    let device = FakeDevice::unreachable();

    let error = probe(&device, &endpoint(), Duration::from_secs(3)).unwrap_err();

    match error {
        Error::Unreachable {
            destination,
            message,
            help,
        } => {
            assert_eq!(destination, "pi@pi.local");
            assert!(message.contains("Connection timed out"));
            assert!(help.contains("ssh-copy-id pi@pi.local"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

use std::{fs, thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn writes_log_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ting.log");

    ting_sdk::logging::init(true, Some(path.clone()));
    tracing::info!("button poll started");
    // A second init is ignored rather than panicking.
    ting_sdk::logging::init(false, None);
    tracing::info!("still logging");

    sleep(Duration::from_millis(200));

    assert!(path.exists(), "log file was not created");
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("button poll started"));
    assert!(contents.contains("still logging"));
}

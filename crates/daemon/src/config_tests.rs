use serial_test::serial;

use super::*;

fn clear_env() {
    for var in [
        "DATA_DIR",
        "OJ_POLL_INTERVAL_MS",
        "OJ_IDLE_WAIT_MS",
        "OJ_GLOBAL_SLOTS",
        "OJ_APPROVAL_POLL_INTERVAL_MS",
    ] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn load_falls_back_to_worker_config_defaults_when_unset() {
    clear_env();
    let config = Config::load();
    assert_eq!(config.worker.poll_interval_ms, 200);
    assert_eq!(config.worker.idle_wait_ms, 500);
    assert_eq!(config.worker.global_slots, 10);
    assert_eq!(config.approval_poll_interval_ms, 1_000);
}

#[test]
#[serial]
fn load_honors_overrides() {
    clear_env();
    std::env::set_var("DATA_DIR", "/tmp/oj-config-test");
    std::env::set_var("OJ_POLL_INTERVAL_MS", "50");
    std::env::set_var("OJ_IDLE_WAIT_MS", "25");
    std::env::set_var("OJ_GLOBAL_SLOTS", "4");
    std::env::set_var("OJ_APPROVAL_POLL_INTERVAL_MS", "333");

    let config = Config::load();
    assert_eq!(config.data_dir, PathBuf::from("/tmp/oj-config-test"));
    assert_eq!(config.worker.poll_interval_ms, 50);
    assert_eq!(config.worker.idle_wait_ms, 25);
    assert_eq!(config.worker.global_slots, 4);
    assert_eq!(config.approval_poll_interval_ms, 333);

    clear_env();
}

#[test]
#[serial]
fn data_root_uses_the_configured_directory() {
    clear_env();
    std::env::set_var("DATA_DIR", "/tmp/oj-config-test-root");
    let config = Config::load();
    assert_eq!(config.data_root().root(), std::path::Path::new("/tmp/oj-config-test-root"));
    clear_env();
}

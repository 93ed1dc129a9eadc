use std::fs;

use readagent::client_state::{ClientState, LayoutConfig};
use readagent::settings::{self, Settings};
use readagent::viewer::ViewerConfig;
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn settings_file_drives_the_viewer_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(
        &path,
        "version: 1\nbackend_url: \"http://reader.local:9000\"\ndefault_zoom: 2.0\n\
         container_poll_retries: 3\ncontainer_poll_interval_ms: 50\n",
    )
    .unwrap();

    settings::load_settings_from_path(&path);

    assert_eq!(settings::get_backend_url(), "http://reader.local:9000");
    let config = ViewerConfig::from_settings();
    assert_eq!(config.default_zoom, 2.0);
    assert_eq!(config.zoom_step, 1.2);
    assert_eq!(config.poll_retries, 3);
    assert_eq!(config.poll_interval.as_millis(), 50);

    settings::replace(Settings::default());
}

#[test]
#[serial]
fn old_settings_are_migrated_and_rewritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "backend_url: \"http://host:5000/api\"\n").unwrap();

    settings::load_settings_from_path(&path);

    assert_eq!(settings::get_backend_url(), "http://host:5000");
    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("version: 1"));
    assert!(rewritten.contains("backend_url: \"http://host:5000\""));

    settings::replace(Settings::default());
}

#[test]
#[serial]
fn broken_settings_keep_the_current_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "default_zoom: [not a number\n").unwrap();
    settings::replace(Settings::default());

    settings::load_settings_from_path(&path);

    assert_eq!(settings::current(), Settings::default());
    assert_eq!(settings::get_log_level(), log::LevelFilter::Info);
}

#[test]
fn client_state_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let user_id = {
        let mut state = ClientState::load_from_file(&path).unwrap();
        assert!(state.user_id().starts_with("user_"));
        let mut layout = state.layout();
        layout.resize_left(10.0);
        layout.right_panel_collapsed = true;
        state.set_layout(layout);
        state.user_id().to_string()
    };

    let state = ClientState::load_from_file(&path).unwrap();
    assert_eq!(state.user_id(), user_id);
    assert_eq!(state.layout().left_panel_width, 35.0);
    assert!(state.layout().right_panel_collapsed);
    assert_eq!(state.layout().center_width(), 65.0);
}

#[test]
fn explicit_user_id_is_stored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let mut state = ClientState::load_or_ephemeral(Some(&path));
    state.set_user_id("  user_alice  ");
    state.set_user_id("   ");

    let reloaded = ClientState::load_or_ephemeral(Some(&path));
    assert_eq!(reloaded.user_id(), "user_alice");
}

#[test]
fn corrupt_state_file_is_replaced_on_next_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    fs::write(&path, "{ not json").unwrap();

    let mut state = ClientState::load_or_ephemeral(Some(&path));
    state.set_layout(LayoutConfig::default());

    let reloaded = ClientState::load_from_file(&path).unwrap();
    assert_eq!(reloaded.user_id(), state.user_id());
}

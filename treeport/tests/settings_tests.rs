//! Settings resolution once logging is running

mod helpers;

use helpers::*;
use serial_test::serial;
use std::path::Path;
use tracing::Level;
use treeport::config::Settings;
use treeport_common::config::TomlConfig;

#[test]
#[serial]
fn test_missing_template_metadata_warning_is_logged() {
    let capture = init_test_logging();
    capture.clear();

    let settings = Settings::from_toml(&TomlConfig::default(), Some(Path::new("/tmp/content.db"))).unwrap();

    assert!(settings.templates.is_empty());
    assert!(capture.contains_at(Level::WARN, "No template field metadata configured"));
}

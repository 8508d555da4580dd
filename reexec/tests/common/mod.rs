pub mod fixtures;
pub mod logging;

pub use fixtures::{SettingsFile, reexec};
pub use logging::init_test_logging;

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}

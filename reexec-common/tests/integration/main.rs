#[path = "../common/mod.rs"]
mod common;

#[cfg(unix)]
mod pipeline_tests;
mod settings_tests;

#[ctor::ctor]
fn setup() {
    common::init_test_logging();
}

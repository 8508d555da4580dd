#[path = "../common/mod.rs"]
mod common;

mod command_tests;

#[ctor::ctor]
fn setup() {
    common::init_test_logging();
}

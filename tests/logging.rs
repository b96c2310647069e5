//! Logger setup. Lives in its own test binary, since the logger is process-global.

use log::Level;

#[test]
fn init_logger_logs_at_debug() {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }

    epog::init_logger!();
    // a second call is a no-op
    epog::init_logger!();

    assert_eq!(log::max_level(), log::LevelFilter::Debug);
    assert!(log::log_enabled!(target: "epog", Level::Debug));
    assert!(!log::log_enabled!(target: "epog", Level::Trace));
    assert!(log::log_enabled!(target: "logging", Level::Debug));
    assert!(!log::log_enabled!(target: "some_other_crate", Level::Info));
}

pub use log::Level;
use simple_logger::SimpleLogger;

/// Registers a [`SimpleLogger`] backend for the standard `log` facade, which
/// `shared::net` and `shared::thread_pool` emit through. Panics if called
/// more than once.
pub fn init_log() {
    SimpleLogger::new().with_level(Level::Debug.to_level_filter()).init().unwrap()
}

/// Adjusts the level filter of the already-registered backend.
#[inline]
pub fn set_max_level(lvl: Level) {
    log::set_max_level(lvl.to_level_filter())
}

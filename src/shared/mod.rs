pub mod buffer;
pub mod dns;
#[macro_use]
pub mod log;
pub mod logs;
pub mod net;
pub mod thread_pool;

pub mod command;
pub mod fs_atomic;
pub mod http;
pub mod ids;
pub mod logging;
pub mod time;

//! Process utilities shared by the daemon and tools.

mod signal;

pub use signal::setup_ctrl_c_handler;

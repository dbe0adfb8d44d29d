//! admute-host: native messaging host for system audio mute.
//! Speaks the length-prefixed JSON protocol on stdin/stdout and drives the
//! platform mixer through a subprocess. No arbitration logic lives here.

pub mod controller;
pub mod error;
pub mod host;
pub mod runner;

pub use controller::{AudioController, Backend, OsascriptController, PactlController, controller_for};
pub use error::HostError;
pub use host::{process_message, run_host};
pub use runner::{COMMAND_TIMEOUT, CommandRunner, SystemRunner};

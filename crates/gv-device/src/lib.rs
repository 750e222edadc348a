//! Top-level facade: brings up one device-state's worth of validation
//! machinery behind a single `install()` call, and tears it down again via
//! `DeviceState::uninstall` or plain `Drop`.

mod error;
mod state;

pub use error::FatalInstallError;
pub use state::{install, DeviceState};

pub use gv_core::ValidationConfig;
pub use gv_scheduler::HeartbeatConfig;

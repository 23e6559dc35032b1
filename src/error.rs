//! Error types for the auto-disconnect service.
//!
//! This module defines all error types that can occur while scheduling and
//! performing disconnects, including Bluetooth, D-Bus, I/O and configuration
//! errors.

use bluer::Address;
use thiserror::Error;

use crate::bluetooth::AudioProfile;

/// Main error type for the auto-disconnect service.
#[derive(Error, Debug)]
pub enum BtCloseError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("D-Bus connection error: {0}")]
   DBusConnection(#[from] zbus::fdo::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("permission denied")]
   PermissionDenied,

   #[error("no connected device")]
   NoConnectedDevices,

   #[error("Device not connected: {0}")]
   DeviceNotConnected(Address),

   #[error("Device does not offer the {0} profile")]
   ProfileNotSupported(AudioProfile),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Scheduler has been shut down")]
   SchedulerShutdown,
}

/// Convenience type alias for Results with `BtCloseError`.
pub type Result<T> = std::result::Result<T, BtCloseError>;

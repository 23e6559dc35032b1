//! Configuration management for the auto-disconnect service.
//!
//! This module handles loading and saving configuration from disk. The
//! `[settings]` table holds the configured delay (`HOUR`, `MINUTE`) that the
//! control surface writes and the scheduler reads on every (re)start.

use std::{
   env, fs,
   path::{Path, PathBuf},
};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
   error::{BtCloseError, Result},
   scheduler::delay::Delay,
};

/// Main configuration structure for the service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// BlueZ adapter to use, the system default adapter when unset.
   #[serde(default)]
   pub adapter: Option<String>,

   #[serde(default = "default_status_indicator")]
   pub status_indicator: bool,

   #[serde(default)]
   pub settings: Delay,
}

const fn default_status_indicator() -> bool {
   true
}

impl Default for Config {
   fn default() -> Self {
      Self {
         adapter: None,
         status_indicator: default_status_indicator(),
         settings: Delay::default(),
      }
   }
}

impl Config {
   /// Loads configuration from `path` or creates a default one if missing.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   /// Saves the configuration to `path`.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BTCLOSE_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else {
         dirs::config_dir().ok_or(BtCloseError::ConfigDirNotFound)?
      };

      Ok(config_dir.join("btclosed").join("config.toml"))
   }
}

/// Persisted settings shared by the control surface and the scheduler.
#[derive(Debug)]
pub struct SettingsStore {
   path: PathBuf,
   config: Mutex<Config>,
}

impl SettingsStore {
   /// Opens the settings at the default location.
   pub fn load() -> Result<Self> {
      Self::open(Config::config_path()?)
   }

   /// Opens the settings stored at `path`, creating defaults if missing.
   pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
      let path = path.into();
      let config = Config::load_from(&path)?;
      debug!("Loaded settings from {}", path.display());
      Ok(Self {
         path,
         config: Mutex::new(config),
      })
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   pub fn delay(&self) -> Delay {
      self.config.lock().settings
   }

   /// Replaces the configured delay and writes it to disk.
   pub fn set_delay(&self, delay: Delay) -> Result<()> {
      let mut config = self.config.lock();
      let mut updated = config.clone();
      updated.settings = delay;
      updated.save_to(&self.path)?;
      *config = updated;
      Ok(())
   }

   pub fn adapter(&self) -> Option<String> {
      self.config.lock().adapter.clone()
   }

   pub fn status_indicator(&self) -> bool {
      self.config.lock().status_indicator
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn test_missing_file_gets_defaults() -> Result<()> {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("btclosed").join("config.toml");

      let store = SettingsStore::open(&path)?;
      assert_eq!(store.delay(), Delay::new(0, 30));
      assert!(store.status_indicator());
      assert!(store.adapter().is_none());
      assert!(path.exists());

      Ok(())
   }

   #[test]
   fn test_set_delay_persists() -> Result<()> {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("config.toml");

      let store = SettingsStore::open(&path)?;
      store.set_delay(Delay::new(1, 15))?;
      assert_eq!(store.delay(), Delay::new(1, 15));

      let reopened = SettingsStore::open(&path)?;
      assert_eq!(reopened.delay(), Delay::new(1, 15));

      let raw = fs::read_to_string(&path)?;
      assert!(raw.contains("HOUR = 1"), "config was: {raw}");
      assert!(raw.contains("MINUTE = 15"), "config was: {raw}");

      Ok(())
   }

   #[test]
   fn test_partial_settings_fall_back_to_defaults() -> Result<()> {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("config.toml");
      fs::write(&path, "adapter = \"hci1\"\n\n[settings]\nHOUR = 2\n")?;

      let store = SettingsStore::open(&path)?;
      assert_eq!(store.delay(), Delay::new(2, 30));
      assert_eq!(store.adapter().as_deref(), Some("hci1"));
      assert!(store.status_indicator());

      Ok(())
   }

   #[test]
   fn test_large_minutes_are_kept() -> Result<()> {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("config.toml");
      fs::write(&path, "[settings]\nHOUR = 0\nMINUTE = 90\n")?;

      let store = SettingsStore::open(&path)?;
      assert_eq!(store.delay().as_millis(), 90 * 60 * 1000);

      Ok(())
   }
}

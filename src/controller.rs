//! User-facing operations: setting the delay and picking the target device.

use std::sync::Arc;

use bluer::Address;
use log::info;

use crate::{
   bluetooth::{BluetoothBackend, DeviceInfo},
   config::SettingsStore,
   error::{BtCloseError, Result},
   scheduler::{Scheduler, SchedulerStatus, StartOutcome, delay::Delay},
   selection::DeviceSelection,
};

/// Result of picking a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
   /// The device was already selected; nothing changed.
   Cancelled,
   /// The device is now selected and the scheduler was restarted.
   Selected(StartOutcome),
}

impl Selection {
   pub fn to_str(&self) -> &'static str {
      match self {
         Self::Cancelled => "cancelled",
         Self::Selected(outcome) => outcome.to_str(),
      }
   }
}

/// Owns the selection and drives the scheduler on behalf of the user.
pub struct Controller {
   settings: Arc<SettingsStore>,
   selection: DeviceSelection,
   scheduler: Scheduler,
   backend: Arc<dyn BluetoothBackend>,
}

impl Controller {
   pub fn new(
      settings: Arc<SettingsStore>,
      selection: DeviceSelection,
      scheduler: Scheduler,
      backend: Arc<dyn BluetoothBackend>,
   ) -> Self {
      Self {
         settings,
         selection,
         scheduler,
         backend,
      }
   }

   pub fn delay(&self) -> Delay {
      self.settings.delay()
   }

   pub fn selected_device(&self) -> Option<Address> {
      self.selection.current()
   }

   /// Persists a new delay.
   ///
   /// When a device is selected the scheduler is restarted so the new delay
   /// counts from now, and its outcome is returned.
   pub async fn set_time(&self, delay: Delay) -> Result<Option<StartOutcome>> {
      self.settings.set_delay(delay)?;
      info!("Delay set to {delay}");

      if self.selection.current().is_none() {
         return Ok(None);
      }
      Ok(Some(self.scheduler.restart().await?))
   }

   /// Lists bonded devices that are connected right now.
   pub async fn connected_devices(&self) -> Result<Vec<DeviceInfo>> {
      if !self.backend.has_access().await {
         return Err(BtCloseError::PermissionDenied);
      }

      let devices = self.backend.connected_devices().await?;
      if devices.is_empty() {
         return Err(BtCloseError::NoConnectedDevices);
      }
      Ok(devices)
   }

   /// Picks `address` as the auto-disconnect target.
   ///
   /// Picking the device that is already selected is a cancel and leaves the
   /// pending timer alone.
   pub async fn select_device(&self, address: Address) -> Result<Selection> {
      let devices = self.connected_devices().await?;
      if !devices.iter().any(|d| d.address == address) {
         return Err(BtCloseError::DeviceNotConnected(address));
      }

      if self.selection.is_selected(address) {
         return Ok(Selection::Cancelled);
      }

      if let Some(previous) = self.selection.set(address) {
         info!("Switching auto-disconnect target from {previous} to {address}");
      } else {
         info!("Auto-disconnect target set to {address}");
      }
      Ok(Selection::Selected(self.scheduler.restart().await?))
   }

   /// Clears the selection and cancels any pending timer.
   pub async fn forget_device(&self) -> Result<bool> {
      let Some(previous) = self.selection.clear() else {
         return Ok(false);
      };
      info!("Forgot auto-disconnect target {previous}");
      self.scheduler.stop().await?;
      Ok(true)
   }

   pub async fn stop(&self) -> Result<bool> {
      self.scheduler.stop().await
   }

   pub async fn status(&self) -> Result<SchedulerStatus> {
      self.scheduler.status().await
   }
}

//! Forcing the selected device off its audio profiles.
//!
//! Every profile is handled by its own task: request a proxy, disconnect,
//! close. The tasks are independent of each other and a failure in one never
//! affects the other. Nothing is retried.

use std::sync::Arc;

use bluer::Address;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use strum::IntoEnumIterator;
use tokio::task::JoinHandle;

use crate::{
   bluetooth::{AudioProfile, BluetoothBackend, ProxyEvent},
   selection::DeviceSelection,
};

/// What happened to a single profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProfileOutcome {
   Disconnected,
   Unavailable { reason: String },
   Failed { reason: String },
}

/// Per-profile outcomes of one disconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReport {
   pub device: Address,
   pub outcomes: Vec<(AudioProfile, ProfileOutcome)>,
}

impl DisconnectReport {
   /// Number of profiles the device was actually taken off.
   pub fn disconnected(&self) -> usize {
      self
         .outcomes
         .iter()
         .filter(|(_, outcome)| *outcome == ProfileOutcome::Disconnected)
         .count()
   }

   pub fn to_json(&self) -> serde_json::Value {
      let profiles: serde_json::Map<_, _> = self
         .outcomes
         .iter()
         .map(|(profile, outcome)| (profile.to_str().to_owned(), json!(outcome)))
         .collect();
      json!({
         "address": self.device.to_string(),
         "profiles": profiles,
      })
   }
}

/// A disconnect in flight.
///
/// Dropping it leaves the profile tasks running.
#[derive(Debug)]
pub struct DisconnectAttempt {
   device: Address,
   tasks: Vec<(AudioProfile, JoinHandle<ProfileOutcome>)>,
}

impl DisconnectAttempt {
   pub fn device(&self) -> Address {
      self.device
   }

   /// Waits for every profile task and collects their outcomes.
   pub async fn finish(self) -> DisconnectReport {
      let mut outcomes = Vec::with_capacity(self.tasks.len());
      for (profile, task) in self.tasks {
         let outcome = task.await.unwrap_or_else(|e| ProfileOutcome::Failed {
            reason: e.to_string(),
         });
         outcomes.push((profile, outcome));
      }
      DisconnectReport {
         device: self.device,
         outcomes,
      }
   }
}

/// Disconnects whatever device is selected when it runs.
#[derive(Clone)]
pub struct Disconnector {
   selection: DeviceSelection,
   backend: Arc<dyn BluetoothBackend>,
}

impl Disconnector {
   pub fn new(selection: DeviceSelection, backend: Arc<dyn BluetoothBackend>) -> Self {
      Self { selection, backend }
   }

   /// Starts disconnecting the selected device from every audio profile.
   ///
   /// Returns `None` without touching Bluetooth when nothing is selected.
   pub fn disconnect_selected(&self) -> Option<DisconnectAttempt> {
      let Some(device) = self.selection.current() else {
         debug!("No device selected, nothing to disconnect");
         return None;
      };

      info!("Disconnecting {device} from audio profiles");
      let tasks = AudioProfile::iter()
         .map(|profile| {
            let backend = self.backend.clone();
            let task =
               tokio::spawn(async move { disconnect_profile(&*backend, profile, device).await });
            (profile, task)
         })
         .collect();

      Some(DisconnectAttempt { device, tasks })
   }
}

async fn disconnect_profile(
   backend: &dyn BluetoothBackend,
   profile: AudioProfile,
   device: Address,
) -> ProfileOutcome {
   let proxy = match backend.open_profile(profile).await {
      ProxyEvent::Ready(proxy) => {
         debug!("{} proxy ready for {device}", proxy.profile());
         proxy
      },
      ProxyEvent::Unavailable(reason) => {
         warn!("{profile} proxy unavailable: {reason}");
         return ProfileOutcome::Unavailable { reason };
      },
   };

   let outcome = match proxy.disconnect(device).await {
      Ok(()) => {
         info!("Disconnected {device} from {profile}");
         ProfileOutcome::Disconnected
      },
      Err(e) => {
         warn!("Failed to disconnect {device} from {profile}: {e}");
         ProfileOutcome::Failed {
            reason: e.to_string(),
         }
      },
   };
   proxy.close();
   outcome
}

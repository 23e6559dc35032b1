//! In-memory doubles for the Bluetooth layer, the status indicator and the
//! event bus.

use std::{collections::HashSet, sync::Arc};

use bluer::Address;
use crossbeam::atomic::AtomicCell;
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::{
   bluetooth::{AudioProfile, BluetoothBackend, DeviceInfo, ProfileProxy, ProxyEvent},
   config::SettingsStore,
   error::{BtCloseError, Result},
   event::{EventBus, SchedulerEvent},
   indicator::{IndicatorId, StatusIndicator},
   scheduler::delay::Delay,
};

pub const DEVICE_A: Address = Address([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);
pub const DEVICE_B: Address = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

pub fn device(address: Address, name: &str) -> DeviceInfo {
   DeviceInfo {
      address,
      name: SmolStr::new(name),
   }
}

pub fn settings(dir: &TempDir) -> Arc<SettingsStore> {
   Arc::new(SettingsStore::open(dir.path().join("config.toml")).unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyCall {
   Opened(AudioProfile),
   Disconnect(AudioProfile, Address),
   Closed(AudioProfile),
}

pub struct FakeBackend {
   access: AtomicCell<bool>,
   devices: Mutex<Vec<DeviceInfo>>,
   unavailable: Mutex<HashSet<AudioProfile>>,
   failing: Mutex<HashSet<AudioProfile>>,
   calls: Arc<Mutex<Vec<ProxyCall>>>,
}

impl FakeBackend {
   /// Access granted, devices A and B connected.
   pub fn new() -> Arc<Self> {
      Arc::new(Self {
         access: AtomicCell::new(true),
         devices: Mutex::new(vec![
            device(DEVICE_A, "Headphones"),
            device(DEVICE_B, "Speaker"),
         ]),
         unavailable: Mutex::default(),
         failing: Mutex::default(),
         calls: Arc::default(),
      })
   }

   pub fn set_access(&self, granted: bool) {
      self.access.store(granted);
   }

   pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
      *self.devices.lock() = devices;
   }

   pub fn make_unavailable(&self, profile: AudioProfile) {
      self.unavailable.lock().insert(profile);
   }

   pub fn make_failing(&self, profile: AudioProfile) {
      self.failing.lock().insert(profile);
   }

   pub fn calls(&self) -> Vec<ProxyCall> {
      self.calls.lock().clone()
   }

   pub fn disconnects(&self) -> Vec<(AudioProfile, Address)> {
      self
         .calls()
         .into_iter()
         .filter_map(|call| match call {
            ProxyCall::Disconnect(profile, addr) => Some((profile, addr)),
            _ => None,
         })
         .collect()
   }
}

impl BluetoothBackend for FakeBackend {
   fn has_access(&self) -> BoxFuture<'_, bool> {
      futures::future::ready(self.access.load()).boxed()
   }

   fn connected_devices(&self) -> BoxFuture<'_, Result<Vec<DeviceInfo>>> {
      futures::future::ready(Ok(self.devices.lock().clone())).boxed()
   }

   fn open_profile(&self, profile: AudioProfile) -> BoxFuture<'_, ProxyEvent> {
      let event = if self.unavailable.lock().contains(&profile) {
         ProxyEvent::Unavailable(format!("{profile} service not running"))
      } else {
         self.calls.lock().push(ProxyCall::Opened(profile));
         ProxyEvent::Ready(Box::new(FakeProxy {
            profile,
            fail: self.failing.lock().contains(&profile),
            calls: self.calls.clone(),
         }))
      };
      futures::future::ready(event).boxed()
   }
}

struct FakeProxy {
   profile: AudioProfile,
   fail: bool,
   calls: Arc<Mutex<Vec<ProxyCall>>>,
}

impl ProfileProxy for FakeProxy {
   fn profile(&self) -> AudioProfile {
      self.profile
   }

   fn disconnect(&self, device: Address) -> BoxFuture<'_, Result<()>> {
      self
         .calls
         .lock()
         .push(ProxyCall::Disconnect(self.profile, device));
      let result = if self.fail {
         Err(BtCloseError::ProfileNotSupported(self.profile))
      } else {
         Ok(())
      };
      futures::future::ready(result).boxed()
   }

   fn close(self: Box<Self>) {
      self.calls.lock().push(ProxyCall::Closed(self.profile));
   }
}

#[derive(Default)]
pub struct FakeIndicator {
   next_id: AtomicCell<IndicatorId>,
   fail: AtomicCell<bool>,
   posted: Mutex<Vec<(IndicatorId, Delay)>>,
   withdrawn: Mutex<Vec<IndicatorId>>,
}

impl FakeIndicator {
   pub fn new() -> Arc<Self> {
      Arc::default()
   }

   pub fn set_failing(&self, fail: bool) {
      self.fail.store(fail);
   }

   pub fn posted(&self) -> Vec<(IndicatorId, Delay)> {
      self.posted.lock().clone()
   }

   pub fn withdrawn(&self) -> Vec<IndicatorId> {
      self.withdrawn.lock().clone()
   }

   /// Indicators posted and not yet withdrawn.
   pub fn active(&self) -> Vec<IndicatorId> {
      let withdrawn = self.withdrawn.lock();
      self
         .posted
         .lock()
         .iter()
         .map(|(id, _)| *id)
         .filter(|id| !withdrawn.contains(id))
         .collect()
   }
}

impl StatusIndicator for FakeIndicator {
   fn post(&self, delay: Delay) -> BoxFuture<'_, Result<IndicatorId>> {
      let result = if self.fail.load() {
         Err(BtCloseError::DBus(zbus::Error::Failure(
            "no notification server".into(),
         )))
      } else {
         let id = self.next_id.fetch_add(1) + 1;
         self.posted.lock().push((id, delay));
         Ok(id)
      };
      futures::future::ready(result).boxed()
   }

   fn withdraw(&self, id: IndicatorId) -> BoxFuture<'_, ()> {
      self.withdrawn.lock().push(id);
      futures::future::ready(()).boxed()
   }
}

/// Forwards every emitted event into a channel.
pub struct RecordingBus {
   tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl RecordingBus {
   pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SchedulerEvent>) {
      let (tx, rx) = mpsc::unbounded_channel();
      (Arc::new(Self { tx }), rx)
   }
}

impl EventBus for RecordingBus {
   fn emit(&self, event: SchedulerEvent) {
      let _ = self.tx.send(event);
   }
}

//! BlueZ implementation of the Bluetooth capability layer.

use std::collections::HashSet;

use bluer::{Adapter, Address, Session};
use futures::{FutureExt, future::BoxFuture};
use log::debug;
use smol_str::SmolStr;
use uuid::Uuid;

use crate::{
   bluetooth::{AudioProfile, BluetoothBackend, DeviceInfo, ProfileProxy, ProxyEvent},
   error::{BtCloseError, Result},
};

/// Talks to bluetoothd through a `bluer` session.
///
/// The adapter is resolved on every call so an adapter that appears after
/// startup is picked up.
pub struct BluezBackend {
   session: Session,
   adapter_name: Option<String>,
}

impl BluezBackend {
   pub async fn new(adapter_name: Option<String>) -> Result<Self> {
      let session = Session::new().await?;
      Ok(Self {
         session,
         adapter_name,
      })
   }

   async fn adapter(&self) -> Result<Adapter> {
      match &self.adapter_name {
         Some(name) => Ok(self.session.adapter(name)?),
         None => Ok(self.session.default_adapter().await?),
      }
   }

   async fn powered_adapter(&self) -> Result<Option<Adapter>> {
      let adapter = self.adapter().await?;
      if adapter.is_powered().await? {
         Ok(Some(adapter))
      } else {
         Ok(None)
      }
   }

   async fn list_connected(&self) -> Result<Vec<DeviceInfo>> {
      let adapter = self.adapter().await?;
      let mut devices = Vec::new();

      for addr in adapter.device_addresses().await? {
         let Ok(device) = adapter.device(addr) else {
            continue;
         };
         if !device.is_paired().await.unwrap_or(false)
            || !device.is_connected().await.unwrap_or(false)
         {
            continue;
         }

         let name = device
            .name()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| addr.to_string());
         devices.push(DeviceInfo {
            address: addr,
            name: SmolStr::from(name),
         });
      }

      devices.sort_by(|a, b| a.name.cmp(&b.name));
      Ok(devices)
   }
}

impl BluetoothBackend for BluezBackend {
   fn has_access(&self) -> BoxFuture<'_, bool> {
      async move {
         match self.powered_adapter().await {
            Ok(Some(_)) => true,
            Ok(None) => {
               debug!("Bluetooth adapter is powered off");
               false
            },
            Err(e) => {
               debug!("Bluetooth adapter unavailable: {e}");
               false
            },
         }
      }
      .boxed()
   }

   fn connected_devices(&self) -> BoxFuture<'_, Result<Vec<DeviceInfo>>> {
      self.list_connected().boxed()
   }

   fn open_profile(&self, profile: AudioProfile) -> BoxFuture<'_, ProxyEvent> {
      async move {
         match self.powered_adapter().await {
            Ok(Some(adapter)) => {
               debug!("Opened {profile} proxy on {}", adapter.name());
               ProxyEvent::Ready(Box::new(BluezProfileProxy { adapter, profile }))
            },
            Ok(None) => ProxyEvent::Unavailable("adapter is powered off".into()),
            Err(e) => ProxyEvent::Unavailable(e.to_string()),
         }
      }
      .boxed()
   }
}

/// Picks the service UUID to disconnect for `profile`: the first one, in the
/// profile's preference order, that the device advertises.
fn profile_uuid(profile: AudioProfile, advertised: &HashSet<Uuid>) -> Option<Uuid> {
   profile
      .uuids()
      .iter()
      .find(|uuid| advertised.contains(*uuid))
      .copied()
}

/// A profile bound to one adapter.
struct BluezProfileProxy {
   adapter: Adapter,
   profile: AudioProfile,
}

impl BluezProfileProxy {
   async fn disconnect_device(&self, address: Address) -> Result<()> {
      let device = self.adapter.device(address)?;
      if !device.is_connected().await? {
         return Err(BtCloseError::DeviceNotConnected(address));
      }

      let advertised = device.uuids().await?.unwrap_or_default();
      let Some(uuid) = profile_uuid(self.profile, &advertised) else {
         return Err(BtCloseError::ProfileNotSupported(self.profile));
      };

      device.disconnect_profile(&uuid).await?;
      Ok(())
   }
}

impl ProfileProxy for BluezProfileProxy {
   fn profile(&self) -> AudioProfile {
      self.profile
   }

   fn disconnect(&self, device: Address) -> BoxFuture<'_, Result<()>> {
      self.disconnect_device(device).boxed()
   }

   fn close(self: Box<Self>) {
      debug!("Closed {} proxy on {}", self.profile, self.adapter.name());
   }
}

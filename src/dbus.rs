use std::str::FromStr;

use bluer::Address;
use log::info;
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{controller::Controller, error::BtCloseError, scheduler::delay::Delay};

fn to_fdo(e: BtCloseError) -> fdo::Error {
   fdo::Error::Failed(e.to_string())
}

fn parse_address(address: &str) -> fdo::Result<Address> {
   Address::from_str(address).map_err(|e| fdo::Error::InvalidArgs(e.to_string()))
}

pub struct AutoDisconnectService {
   controller: Controller,
}

impl AutoDisconnectService {
   pub const fn new(controller: Controller) -> Self {
      Self { controller }
   }
}

#[interface(name = "org.btclose.Manager")]
impl AutoDisconnectService {
   async fn set_time(&self, hours: u32, minutes: u32) -> fdo::Result<String> {
      let outcome = self
         .controller
         .set_time(Delay::new(hours, minutes))
         .await
         .map_err(to_fdo)?;
      Ok(outcome.map_or("saved", |o| o.to_str()).to_owned())
   }

   async fn get_time(&self) -> (u32, u32) {
      let delay = self.controller.delay();
      (delay.hours, delay.minutes)
   }

   async fn connected_devices(&self) -> fdo::Result<String> {
      let selected = self.controller.selected_device();
      let devices: Vec<serde_json::Value> = self
         .controller
         .connected_devices()
         .await
         .map_err(to_fdo)?
         .iter()
         .map(|d| d.to_json(selected == Some(d.address)))
         .collect();
      serde_json::to_string(&devices).map_err(|e| fdo::Error::Failed(e.to_string()))
   }

   async fn select_device(&self, address: String) -> fdo::Result<String> {
      let addr = parse_address(&address)?;
      let selection = self.controller.select_device(addr).await.map_err(to_fdo)?;
      info!("Selection of {address}: {}", selection.to_str());
      Ok(selection.to_str().to_owned())
   }

   async fn forget_device(&self) -> fdo::Result<bool> {
      self.controller.forget_device().await.map_err(to_fdo)
   }

   async fn stop(&self) -> fdo::Result<bool> {
      self.controller.stop().await.map_err(to_fdo)
   }

   async fn status(&self) -> fdo::Result<String> {
      let status = self.controller.status().await.map_err(to_fdo)?;
      Ok(status.to_json().to_string())
   }

   // Signals
   #[zbus(signal)]
   pub async fn timer_armed(
      emitter: &SignalEmitter<'_>,
      address: &str,
      limit: &str,
      delay_ms: u64,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn timer_stopped(emitter: &SignalEmitter<'_>, address: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn timer_fired(
      emitter: &SignalEmitter<'_>,
      address: &str,
      report: &str,
   ) -> zbus::Result<()>;

   // Properties for polling-free updates
   #[zbus(property)]
   async fn armed(&self) -> bool {
      self
         .controller
         .status()
         .await
         .is_ok_and(|status| status.is_armed())
   }

   #[zbus(property)]
   async fn selected_device(&self) -> String {
      self
         .controller
         .selected_device()
         .map(|addr| addr.to_string())
         .unwrap_or_default()
   }
}

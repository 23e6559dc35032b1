//! Bluetooth auto-disconnect D-Bus service
//!
//! This service disconnects a chosen Bluetooth audio device (headphones,
//! speakers) from its headset and streaming profiles once a configured delay
//! has passed, so it does not stay connected overnight.

use std::{sync::Arc, time::Duration};

use crossbeam::queue::SegQueue;
use log::{info, warn};
use tokio::{
   select,
   signal::{
      self,
      unix::{Signal, SignalKind},
   },
   sync::Notify,
   time,
};
use zbus::{Connection, connection, object_server::InterfaceRef};

use bluetooth::{BluetoothBackend, bluez::BluezBackend};
use config::SettingsStore;
use controller::Controller;
use dbus::AutoDisconnectService;
use event::{EventBus, SchedulerEvent};
use indicator::{DesktopIndicator, LogIndicator, StatusIndicator};
use scheduler::{Scheduler, SchedulerDeps};
use selection::DeviceSelection;

mod bluetooth;
mod config;
mod controller;
mod dbus;
mod error;
mod event;
mod indicator;
mod scheduler;
mod selection;
#[cfg(test)]
mod testing;

use crate::{dbus::AutoDisconnectServiceSignals, error::Result};

const BUS_NAME: &str = "org.btclose";
const OBJECT_PATH: &str = "/org/btclose/manager";

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting btclosed D-Bus service...");

   let mut shutdown_signal = ShutdownSignal::new()?;

   // Load configuration
   let settings = Arc::new(SettingsStore::load()?);
   info!(
      "Loaded settings from {} (limit {})",
      settings.path().display(),
      settings.delay()
   );

   let backend: Arc<dyn BluetoothBackend> = Arc::new(BluezBackend::new(settings.adapter()).await?);

   // Create event channel
   let event_bus = EventProcessor::new();

   // Build D-Bus connection
   let connection = connection::Builder::session()?
      .name(BUS_NAME)?
      .build()
      .await?;

   let desktop = if settings.status_indicator() {
      match DesktopIndicator::new(&connection).await {
         Ok(desktop) => Some(desktop),
         Err(e) => {
            warn!("Desktop notifications unavailable, logging status instead: {e}");
            None
         },
      }
   } else {
      None
   };
   let indicator: Arc<dyn StatusIndicator> = match &desktop {
      Some(desktop) => Arc::new(desktop.clone()),
      None => Arc::new(LogIndicator::default()),
   };

   let selection = DeviceSelection::new();
   let scheduler = Scheduler::spawn(SchedulerDeps {
      settings: settings.clone(),
      selection: selection.clone(),
      backend: backend.clone(),
      indicator,
      events: event_bus.clone(),
   });

   if let Some(desktop) = &desktop
      && let Err(e) = desktop.forward_stop_actions(scheduler.clone()).await
   {
      warn!("Cannot listen for notification actions: {e}");
   }

   let shutdown = scheduler.clone();
   let controller = Controller::new(settings, selection, scheduler, backend);
   connection
      .object_server()
      .at(OBJECT_PATH, AutoDisconnectService::new(controller))
      .await?;

   info!("btclosed D-Bus service started at {BUS_NAME}");

   // Start event processor
   event_bus.spawn_dispatcher(connection).await?;

   // Wait for shutdown signal
   let received = shutdown_signal.recv().await?;
   info!("Received {received}, shutting down btclosed service...");
   if let Err(e) = shutdown.stop().await {
      warn!("Failed to cancel pending timer: {e}");
   }

   Ok(())
}

/// SIGINT or SIGTERM, whichever comes first.
struct ShutdownSignal {
   terminate: Signal,
}

impl ShutdownSignal {
   fn new() -> Result<Self> {
      Ok(Self {
         terminate: signal::unix::signal(SignalKind::terminate())?,
      })
   }

   async fn recv(&mut self) -> Result<&'static str> {
      select! {
         res = signal::ctrl_c() => {
            res?;
            Ok("SIGINT")
         }
         _ = self.terminate.recv() => Ok("SIGTERM"),
      }
   }
}

struct EventProcessor {
   queue: SegQueue<SchedulerEvent>,
   notifier: Notify,
}

impl EventProcessor {
   fn new() -> Arc<Self> {
      Arc::new(Self {
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }
}

impl EventProcessor {
   async fn recv(self: &Arc<Self>) -> Option<SchedulerEvent> {
      loop {
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         let notify = self.notifier.notified();
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(Duration::from_secs(1), notify).await;
      }
   }

   async fn dispatch(
      &self,
      iface: &InterfaceRef<AutoDisconnectService>,
      event: SchedulerEvent,
   ) -> Result<()> {
      match event {
         SchedulerEvent::Armed { device, delay } => {
            iface
               .timer_armed(&device.to_string(), &delay.to_string(), delay.as_millis())
               .await?;
         },
         SchedulerEvent::Stopped { device } => {
            iface.timer_stopped(&device.to_string()).await?;
         },
         SchedulerEvent::Fired(Some(report)) => {
            iface
               .timer_fired(&report.device.to_string(), &report.to_json().to_string())
               .await?;
         },
         SchedulerEvent::Fired(None) => {
            iface.timer_fired("", "null").await?;
         },
      }
      Ok(())
   }

   async fn spawn_dispatcher(self: Arc<Self>, connection: Connection) -> Result<()> {
      let iface = connection
         .object_server()
         .interface::<_, AutoDisconnectService>(OBJECT_PATH)
         .await?;
      tokio::spawn(async move {
         while let Some(event) = self.recv().await {
            if let Err(e) = self.dispatch(&iface, event).await {
               warn!("Error dispatching event: {e}");
            }
         }
      });

      Ok(())
   }
}

impl EventBus for EventProcessor {
   fn emit(&self, event: SchedulerEvent) {
      self.queue.push(event);
      self.notifier.notify_waiters();
   }
}

#[cfg(test)]
mod tests {
   use std::process::Command;

   use super::*;

   #[tokio::test]
   async fn test_sigterm_triggers_shutdown() {
      let mut shutdown = ShutdownSignal::new().unwrap();

      let status = Command::new("kill")
         .args(["-TERM", &std::process::id().to_string()])
         .status()
         .unwrap();
      assert!(status.success());

      let received = time::timeout(Duration::from_secs(5), shutdown.recv())
         .await
         .expect("SIGTERM not delivered")
         .unwrap();
      assert_eq!(received, "SIGTERM");
   }
}

//! Delayed disconnect scheduling.
//!
//! The scheduler is an actor owning at most one armed timer. Starting it
//! reads the configured delay, posts the status indicator and spawns a timer
//! task; when the timer expires the selected device is disconnected exactly
//! once. Rescheduling is always a full stop followed by a fresh start.

pub mod delay;

use std::{sync::Arc, time::Duration};

use bluer::Address;
use log::{debug, info, warn};
use serde_json::json;
use tokio::{
   select,
   sync::{mpsc, oneshot},
   task::JoinHandle,
   time::{self, Instant},
};

use crate::{
   bluetooth::{
      BluetoothBackend,
      disconnect::{DisconnectReport, Disconnector},
   },
   config::SettingsStore,
   error::{BtCloseError, Result},
   event::{EventSender, SchedulerEvent},
   indicator::{IndicatorId, StatusIndicator},
   selection::DeviceSelection,
};
use delay::Delay;

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Result of asking the scheduler to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
   /// A timer was armed for `device`.
   Armed { device: Address, delay: Delay },
   /// A timer is already pending; it was left untouched.
   AlreadyArmed { device: Address },
   /// No device is selected, nothing was scheduled.
   NoDevice,
   /// Bluetooth is not usable, nothing was scheduled.
   PermissionDenied,
}

impl StartOutcome {
   pub const fn is_armed(&self) -> bool {
      matches!(self, Self::Armed { .. })
   }

   pub fn to_str(&self) -> &'static str {
      match self {
         Self::Armed { .. } => "armed",
         Self::AlreadyArmed { .. } => "already_armed",
         Self::NoDevice => "no_device",
         Self::PermissionDenied => "permission_denied",
      }
   }
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
   Idle,
   Armed {
      device: Address,
      delay: Delay,
      remaining: Duration,
   },
}

impl SchedulerStatus {
   pub const fn is_armed(&self) -> bool {
      matches!(self, Self::Armed { .. })
   }

   pub fn to_json(&self) -> serde_json::Value {
      match self {
         Self::Idle => json!({ "state": "idle" }),
         Self::Armed {
            device,
            delay,
            remaining,
         } => json!({
            "state": "armed",
            "address": device.to_string(),
            "limit": delay.to_string(),
            "delay_ms": delay.as_millis(),
            "remaining_ms": u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
         }),
      }
   }
}

enum SchedulerCommand {
   Start(oneshot::Sender<StartOutcome>),
   Stop(oneshot::Sender<bool>),
   Restart(oneshot::Sender<StartOutcome>),
   Status(oneshot::Sender<SchedulerStatus>),
   /// Sent by the timer task once the disconnect attempt has finished.
   Fired {
      generation: u64,
      report: Option<DisconnectReport>,
   },
}

/// Everything the scheduler needs besides its own state.
pub struct SchedulerDeps {
   pub settings: Arc<SettingsStore>,
   pub selection: DeviceSelection,
   pub backend: Arc<dyn BluetoothBackend>,
   pub indicator: Arc<dyn StatusIndicator>,
   pub events: EventSender,
}

/// Handle to the scheduler actor.
///
/// This type is cheaply cloneable.
#[derive(Clone)]
pub struct Scheduler {
   inbox: mpsc::Sender<SchedulerCommand>,
}

impl Scheduler {
   /// Spawns the scheduler actor in the idle state.
   pub fn spawn(deps: SchedulerDeps) -> Self {
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      tokio::spawn(SchedulerActor::new(deps, command_rx).run());
      Self { inbox: command_tx }
   }

   async fn request<T>(
      &self,
      cmd: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
   ) -> Result<T> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(cmd(tx))
         .await
         .map_err(|_| BtCloseError::SchedulerShutdown)?;
      rx.await.map_err(|_| BtCloseError::SchedulerShutdown)
   }

   /// Arms the disconnect timer if possible.
   pub async fn start(&self) -> Result<StartOutcome> {
      self.request(SchedulerCommand::Start).await
   }

   /// Cancels the pending timer. Returns whether one was armed.
   pub async fn stop(&self) -> Result<bool> {
      self.request(SchedulerCommand::Stop).await
   }

   /// Stops and starts again so the current delay applies from now.
   pub async fn restart(&self) -> Result<StartOutcome> {
      self.request(SchedulerCommand::Restart).await
   }

   pub async fn status(&self) -> Result<SchedulerStatus> {
      self.request(SchedulerCommand::Status).await
   }
}

struct ArmedTimer {
   generation: u64,
   device: Address,
   delay: Delay,
   deadline: Instant,
   timer: JoinHandle<()>,
   indicator: Option<IndicatorId>,
}

struct SchedulerActor {
   settings: Arc<SettingsStore>,
   selection: DeviceSelection,
   backend: Arc<dyn BluetoothBackend>,
   indicator: Arc<dyn StatusIndicator>,
   events: EventSender,
   disconnector: Disconnector,
   command_rx: mpsc::Receiver<SchedulerCommand>,
   loopback_rx: mpsc::Receiver<SchedulerCommand>,
   loopback_tx: mpsc::Sender<SchedulerCommand>,

   // State
   armed: Option<ArmedTimer>,
   generation: u64,
}

impl SchedulerActor {
   fn new(deps: SchedulerDeps, command_rx: mpsc::Receiver<SchedulerCommand>) -> Self {
      let (loopback_tx, loopback_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      Self {
         disconnector: Disconnector::new(deps.selection.clone(), deps.backend.clone()),
         settings: deps.settings,
         selection: deps.selection,
         backend: deps.backend,
         indicator: deps.indicator,
         events: deps.events,
         command_rx,
         loopback_rx,
         loopback_tx,
         armed: None,
         generation: 0,
      }
   }

   async fn run(mut self) {
      debug!("Scheduler starting up");

      loop {
         select! {
            cmd = self.command_rx.recv() => {
               let Some(cmd) = cmd else {
                  info!("Scheduler shutting down");
                  break;
               };
               self.handle_command(cmd).await;
            }
            Some(cmd) = self.loopback_rx.recv() => {
               self.handle_command(cmd).await;
            }
         }
      }

      // Cleanup
      self.disarm().await;
   }

   async fn handle_command(&mut self, cmd: SchedulerCommand) {
      match cmd {
         SchedulerCommand::Start(reply) => {
            let outcome = self.arm().await;
            let _ = reply.send(outcome);
         },
         SchedulerCommand::Stop(reply) => {
            let stopped = self.disarm().await;
            let _ = reply.send(stopped);
         },
         SchedulerCommand::Restart(reply) => {
            self.disarm().await;
            let outcome = self.arm().await;
            let _ = reply.send(outcome);
         },
         SchedulerCommand::Status(reply) => {
            let _ = reply.send(self.status());
         },
         SchedulerCommand::Fired { generation, report } => {
            self.handle_fired(generation, report).await;
         },
      }
   }

   fn status(&self) -> SchedulerStatus {
      match &self.armed {
         Some(armed) => SchedulerStatus::Armed {
            device: armed.device,
            delay: armed.delay,
            remaining: armed.deadline.saturating_duration_since(Instant::now()),
         },
         None => SchedulerStatus::Idle,
      }
   }

   async fn arm(&mut self) -> StartOutcome {
      if let Some(armed) = &self.armed {
         debug!("Timer for {} already armed", armed.device);
         return StartOutcome::AlreadyArmed {
            device: armed.device,
         };
      }

      if !self.backend.has_access().await {
         debug!("Bluetooth not accessible, not scheduling");
         return StartOutcome::PermissionDenied;
      }

      let Some(device) = self.selection.current() else {
         debug!("No device selected, not scheduling");
         return StartOutcome::NoDevice;
      };

      let delay = self.settings.delay();
      let indicator = match self.indicator.post(delay).await {
         Ok(id) => Some(id),
         Err(e) => {
            warn!("Failed to post status indicator: {e}");
            None
         },
      };

      self.generation += 1;
      let deadline = Instant::now() + delay.as_duration();
      let timer = Self::spawn_timer(
         self.loopback_tx.clone(),
         self.disconnector.clone(),
         self.generation,
         deadline,
      );

      self.armed = Some(ArmedTimer {
         generation: self.generation,
         device,
         delay,
         deadline,
         timer,
         indicator,
      });

      info!(
         "Will disconnect {device} in {delay} ({} ms)",
         delay.as_millis()
      );
      self.events.emit(SchedulerEvent::Armed { device, delay });
      StartOutcome::Armed { device, delay }
   }

   fn spawn_timer(
      loopback: mpsc::Sender<SchedulerCommand>,
      disconnector: Disconnector,
      generation: u64,
      deadline: Instant,
   ) -> JoinHandle<()> {
      tokio::spawn(async move {
         time::sleep_until(deadline).await;
         debug!("Disconnect timer {generation} expired");

         let report = match disconnector.disconnect_selected() {
            Some(attempt) => Some(attempt.finish().await),
            None => None,
         };

         if let Err(e) = loopback
            .send(SchedulerCommand::Fired { generation, report })
            .await
         {
            warn!("Channel closed sending timer expiry: {e}");
         }
      })
   }

   /// Tears down the armed timer, if any.
   async fn disarm(&mut self) -> bool {
      let Some(armed) = self.armed.take() else {
         return false;
      };

      armed.timer.abort();
      if let Some(id) = armed.indicator {
         self.indicator.withdraw(id).await;
      }

      info!("Cancelled pending disconnect of {}", armed.device);
      self.events.emit(SchedulerEvent::Stopped {
         device: armed.device,
      });
      true
   }

   async fn handle_fired(&mut self, generation: u64, report: Option<DisconnectReport>) {
      let Some(armed) = self
         .armed
         .take_if(|armed| armed.generation == generation)
      else {
         debug!("Ignoring expiry of stale timer {generation}");
         return;
      };

      if let Some(id) = armed.indicator {
         self.indicator.withdraw(id).await;
      }

      match &report {
         Some(report) => info!(
            "Disconnect timer fired: {} of {} profiles disconnected on {}",
            report.disconnected(),
            report.outcomes.len(),
            report.device
         ),
         None => info!("Disconnect timer fired with no device selected"),
      }
      self.events.emit(SchedulerEvent::Fired(report));
   }
}

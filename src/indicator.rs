//! Status indicator shown while a disconnect timer is armed.
//!
//! On a desktop session this is a resident freedesktop notification carrying
//! the configured limit and a "STOP" action. Without a notification server
//! the indicator degrades to log lines.

use std::{collections::HashMap, sync::Arc};

use crossbeam::atomic::AtomicCell;
use futures::{FutureExt, StreamExt, future::BoxFuture};
use log::{debug, info, warn};
use tokio::select;
use zbus::{Connection, proxy, zvariant::Value};

use crate::{
   error::Result,
   scheduler::{Scheduler, delay::Delay},
};

/// Identifier of a posted indicator.
pub type IndicatorId = u32;

const APP_NAME: &str = "btclosed";
const APP_ICON: &str = "bluetooth-active-symbolic";
const STOP_ACTION: &str = "stop";
/// `NotificationClosed` reason for a notification dismissed by the user.
const DISMISSED_BY_USER: u32 = 2;

/// Shows and removes the ongoing status indicator.
pub trait StatusIndicator: Send + Sync {
   /// Posts an indicator summarizing `delay`.
   fn post(&self, delay: Delay) -> BoxFuture<'_, Result<IndicatorId>>;

   /// Removes a previously posted indicator.
   fn withdraw(&self, id: IndicatorId) -> BoxFuture<'_, ()>;
}

#[proxy(
   interface = "org.freedesktop.Notifications",
   default_service = "org.freedesktop.Notifications",
   default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
   #[allow(clippy::too_many_arguments)]
   fn notify(
      &self,
      app_name: &str,
      replaces_id: u32,
      app_icon: &str,
      summary: &str,
      body: &str,
      actions: &[&str],
      hints: &HashMap<&str, &Value<'_>>,
      expire_timeout: i32,
   ) -> zbus::Result<u32>;

   fn close_notification(&self, id: u32) -> zbus::Result<()>;

   #[zbus(signal)]
   fn action_invoked(&self, id: u32, action_key: &str) -> zbus::Result<()>;

   #[zbus(signal)]
   fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;
}

/// Whether an invoked action is the STOP button of the active notification.
fn is_stop_for(active: Option<IndicatorId>, id: IndicatorId, action_key: &str) -> bool {
   active == Some(id) && action_key == STOP_ACTION
}

/// Whether the user dismissed the active notification.
fn is_dismissal_of(active: Option<IndicatorId>, id: IndicatorId, reason: u32) -> bool {
   active == Some(id) && reason == DISMISSED_BY_USER
}

/// Resident desktop notification with a "STOP" action.
#[derive(Clone)]
pub struct DesktopIndicator {
   proxy: NotificationsProxy<'static>,
   active: Arc<AtomicCell<Option<IndicatorId>>>,
}

impl DesktopIndicator {
   pub async fn new(connection: &Connection) -> Result<Self> {
      let proxy = NotificationsProxy::new(connection).await?;
      Ok(Self {
         proxy,
         active: Arc::default(),
      })
   }

   /// Stops `scheduler` when the "STOP" action of the active notification
   /// is invoked or the user dismisses it, so the timer never outlives its
   /// indicator.
   pub async fn forward_stop_actions(&self, scheduler: Scheduler) -> Result<()> {
      let mut actions = self.proxy.receive_action_invoked().await?;
      let mut closed = self.proxy.receive_notification_closed().await?;
      let active = self.active.clone();

      tokio::spawn(async move {
         loop {
            let requested = select! {
               Some(signal) = actions.next() => signal
                  .args()
                  .is_ok_and(|args| is_stop_for(active.load(), *args.id(), args.action_key())),
               Some(signal) = closed.next() => signal
                  .args()
                  .is_ok_and(|args| is_dismissal_of(active.load(), *args.id(), *args.reason())),
               else => break,
            };
            if !requested {
               continue;
            }

            info!("Stop requested from the status indicator");
            if let Err(e) = scheduler.stop().await {
               warn!("Failed to stop scheduler: {e}");
               break;
            }
         }
         debug!("Notification signal streams ended");
      });

      Ok(())
   }

   async fn show(&self, delay: Delay) -> Result<IndicatorId> {
      let resident = Value::from(true);
      let urgency = Value::from(1u8);
      let hints = HashMap::from([("resident", &resident), ("urgency", &urgency)]);

      let id = self
         .proxy
         .notify(
            APP_NAME,
            self.active.load().unwrap_or(0),
            APP_ICON,
            "Bluetooth auto-disconnect",
            &delay.limit_label(),
            &[STOP_ACTION, "STOP"],
            &hints,
            0,
         )
         .await?;
      self.active.store(Some(id));
      Ok(id)
   }

   async fn close(&self, id: IndicatorId) {
      let _ = self.active.compare_exchange(Some(id), None);
      if let Err(e) = self.proxy.close_notification(id).await {
         warn!("Failed to close notification {id}: {e}");
      }
   }
}

impl StatusIndicator for DesktopIndicator {
   fn post(&self, delay: Delay) -> BoxFuture<'_, Result<IndicatorId>> {
      self.show(delay).boxed()
   }

   fn withdraw(&self, id: IndicatorId) -> BoxFuture<'_, ()> {
      self.close(id).boxed()
   }
}

/// Indicator that only writes to the log.
#[derive(Debug, Default)]
pub struct LogIndicator {
   next_id: AtomicCell<IndicatorId>,
}

impl StatusIndicator for LogIndicator {
   fn post(&self, delay: Delay) -> BoxFuture<'_, Result<IndicatorId>> {
      let id = self.next_id.fetch_add(1) + 1;
      info!("{}", delay.limit_label());
      futures::future::ready(Ok(id)).boxed()
   }

   fn withdraw(&self, id: IndicatorId) -> BoxFuture<'_, ()> {
      debug!("Status indicator {id} withdrawn");
      futures::future::ready(()).boxed()
   }
}

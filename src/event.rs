//! Event handling for scheduler state changes.
//!
//! The scheduler reports every arm, stop and expiry through an [`EventBus`];
//! the service turns these into D-Bus signals.

use std::sync::Arc;

use bluer::Address;

use crate::{bluetooth::disconnect::DisconnectReport, scheduler::delay::Delay};

/// Events that can be emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
   /// A disconnect timer was armed for `device`.
   Armed { device: Address, delay: Delay },
   /// The pending timer was cancelled before it fired.
   Stopped { device: Address },
   /// The timer fired. `None` when no device was selected at fire time.
   Fired(Option<DisconnectReport>),
}

/// Trait for implementing event emission.
pub trait EventBus: Send + Sync {
   /// Emits an event to all registered listeners.
   fn emit(&self, event: SchedulerEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;

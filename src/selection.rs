//! The single device chosen as the auto-disconnect target.

use std::sync::Arc;

use bluer::Address;
use crossbeam::atomic::AtomicCell;

/// Single-slot store holding the selected device.
///
/// Cheaply cloneable; every clone refers to the same slot. The selection
/// lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct DeviceSelection(Arc<AtomicCell<Option<Address>>>);

impl DeviceSelection {
   pub fn new() -> Self {
      Self::default()
   }

   /// Gets the currently selected device, if any.
   pub fn current(&self) -> Option<Address> {
      self.0.load()
   }

   /// Selects `address`, returning the device it replaced.
   pub fn set(&self, address: Address) -> Option<Address> {
      self.0.swap(Some(address))
   }

   /// Clears the selection, returning the device that was selected.
   pub fn clear(&self) -> Option<Address> {
      self.0.swap(None)
   }

   pub fn is_selected(&self, address: Address) -> bool {
      self.current() == Some(address)
   }
}

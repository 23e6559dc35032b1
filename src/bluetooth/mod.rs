//! Bluetooth capability layer.
//!
//! The scheduler and the control surface only see the [`BluetoothBackend`]
//! and [`ProfileProxy`] traits. [`bluez::BluezBackend`] implements them on
//! top of BlueZ.

use bluer::Address;
use futures::future::BoxFuture;
use serde_json::json;
use smol_str::SmolStr;
use uuid::Uuid;

use crate::error::Result;

pub mod bluez;
pub mod disconnect;

/// Hands-free unit (HFP), what headsets advertise for the call channel.
const HANDSFREE_UUID: Uuid = Uuid::from_u128(0x0000111e_0000_1000_8000_00805f9b34fb);
/// Legacy headset profile (HSP).
const HEADSET_UUID: Uuid = Uuid::from_u128(0x00001108_0000_1000_8000_00805f9b34fb);
/// A2DP sink, the streaming audio endpoint of headphones and speakers.
const AUDIO_SINK_UUID: Uuid = Uuid::from_u128(0x0000110b_0000_1000_8000_00805f9b34fb);

/// Audio profiles a device is forced off when the timer expires.
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Hash,
   strum::Display,
   strum::EnumIter,
   strum::IntoStaticStr,
)]
pub enum AudioProfile {
   #[strum(serialize = "headset")]
   Headset,
   #[strum(serialize = "audio-sink")]
   AudioSink,
}

impl AudioProfile {
   /// Remote service UUIDs covered by this profile, in preference order.
   pub const fn uuids(self) -> &'static [Uuid] {
      match self {
         Self::Headset => &[HANDSFREE_UUID, HEADSET_UUID],
         Self::AudioSink => &[AUDIO_SINK_UUID],
      }
   }

   pub fn to_str(self) -> &'static str {
      self.into()
   }
}

/// A bonded device that is currently connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
   pub address: Address,
   pub name: SmolStr,
}

impl DeviceInfo {
   pub fn to_json(&self, selected: bool) -> serde_json::Value {
      json!({
         "address": self.address.to_string(),
         "name": self.name.as_str(),
         "selected": selected,
      })
   }
}

/// Result of asking the platform for a profile proxy.
///
/// Delivered once per request.
pub enum ProxyEvent {
   Ready(Box<dyn ProfileProxy>),
   Unavailable(String),
}

/// Handle onto one audio profile, used for a single disconnect and then closed.
pub trait ProfileProxy: Send + Sync {
   fn profile(&self) -> AudioProfile;

   /// Forces `device` off this profile.
   fn disconnect(&self, device: Address) -> BoxFuture<'_, Result<()>>;

   /// Releases the proxy.
   fn close(self: Box<Self>);
}

/// Platform Bluetooth operations the service depends on.
pub trait BluetoothBackend: Send + Sync {
   /// Whether the service may currently use Bluetooth at all.
   fn has_access(&self) -> BoxFuture<'_, bool>;

   /// Lists bonded devices that are currently connected.
   fn connected_devices(&self) -> BoxFuture<'_, Result<Vec<DeviceInfo>>>;

   /// Requests a proxy for `profile`.
   fn open_profile(&self, profile: AudioProfile) -> BoxFuture<'_, ProxyEvent>;
}

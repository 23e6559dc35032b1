//! The configured wait before a device is disconnected.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

const fn default_minutes() -> u32 {
   30
}

/// Wait time before the selected device is disconnected.
///
/// Minutes are conventionally below 60 but never normalized, so
/// `0h 90min` is a valid 90 minute delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delay {
   #[serde(rename = "HOUR", default)]
   pub hours: u32,
   #[serde(rename = "MINUTE", default = "default_minutes")]
   pub minutes: u32,
}

impl Default for Delay {
   fn default() -> Self {
      Self {
         hours: 0,
         minutes: default_minutes(),
      }
   }
}

impl Delay {
   pub const fn new(hours: u32, minutes: u32) -> Self {
      Self { hours, minutes }
   }

   /// Total delay in milliseconds, `(hours * 3600 + minutes * 60) * 1000`.
   pub const fn as_millis(self) -> u64 {
      (self.hours as u64 * 3600 + self.minutes as u64 * 60) * 1000
   }

   pub const fn as_duration(self) -> Duration {
      Duration::from_millis(self.as_millis())
   }

   /// Text shown on the status indicator.
   pub fn limit_label(self) -> String {
      format!("LIMIT: {self}")
   }
}

impl fmt::Display for Delay {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      if self.hours != 0 {
         write!(f, "{}h", self.hours)?;
      }
      write!(f, "{}min", self.minutes)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_default_is_thirty_minutes() {
      let delay = Delay::default();
      assert_eq!(delay, Delay::new(0, 30));
      assert_eq!(delay.as_millis(), 1_800_000);
   }

   #[test]
   fn test_millis_formula() {
      assert_eq!(Delay::new(1, 15).as_millis(), 4_500_000);
      assert_eq!(Delay::new(0, 0).as_millis(), 0);
      assert_eq!(Delay::new(2, 0).as_millis(), 7_200_000);

      for hours in [0, 1, 7, 23, 1000] {
         for minutes in [0, 1, 30, 59, 60, 90] {
            let expected = (u64::from(hours) * 3600 + u64::from(minutes) * 60) * 1000;
            assert_eq!(Delay::new(hours, minutes).as_millis(), expected);
         }
      }
   }

   #[test]
   fn test_minutes_are_not_normalized() {
      let delay = Delay::new(0, 90);
      assert_eq!(delay.as_duration(), Duration::from_secs(90 * 60));
      assert_eq!(delay.to_string(), "90min");
   }

   #[test]
   fn test_extreme_values_do_not_overflow() {
      let delay = Delay::new(u32::MAX, u32::MAX);
      let expected = (u64::from(u32::MAX) * 3600 + u64::from(u32::MAX) * 60) * 1000;
      assert_eq!(delay.as_millis(), expected);
   }

   #[test]
   fn test_limit_label() {
      assert_eq!(Delay::new(0, 30).limit_label(), "LIMIT: 30min");
      assert_eq!(Delay::new(1, 15).limit_label(), "LIMIT: 1h15min");
      assert_eq!(Delay::new(3, 0).limit_label(), "LIMIT: 3h0min");
   }
}

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CLOCK_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(\d{1,2})\s*(?:[hH:.]\s*(\d{2})?)?$").unwrap());

/// Wall clock time of day, serialized as `HH:MM`.
///
/// Both notations found in timetables parse into this type: `8h`, `8h30`,
/// `08:30`, `8.30` or a bare hour. The `Xh`/`XhYY` form used when editing
/// the timeline is available through [`ClockTime::to_french`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
  hour: u8,
  minute: u8,
}

impl ClockTime {
  pub fn new(hour: u8, minute: u8) -> Option<Self> {
    if hour > 23 || minute > 59 {
      return None;
    }

    Some(Self { hour, minute })
  }

  pub fn hour(self) -> u8 {
    self.hour
  }

  pub fn minute(self) -> u8 {
    self.minute
  }

  pub fn to_french(self) -> String {
    if self.minute == 0 {
      format!("{}h", self.hour)
    } else {
      format!("{}h{:02}", self.hour, self.minute)
    }
  }
}

impl fmt::Display for ClockTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}:{:02}", self.hour, self.minute)
  }
}

impl FromStr for ClockTime {
  type Err = anyhow::Error;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    let captures = CLOCK_REGEX
      .captures(value.trim())
      .ok_or_else(|| anyhow!("not a time of day: {value:?}"))?;

    let hour = u8::from_str(&captures[1])?;
    let minute = match captures.get(2) {
      Some(minute) => u8::from_str(minute.as_str())?,
      None => 0,
    };

    Self::new(hour, minute).ok_or_else(|| anyhow!("time out of range: {value:?}"))
  }
}

impl TryFrom<String> for ClockTime {
  type Error = anyhow::Error;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ClockTime> for String {
  fn from(value: ClockTime) -> Self {
    value.to_string()
  }
}

#[cfg(test)]
mod test {
  use super::ClockTime;

  #[test]
  fn parses_both_notations() {
    let expected = ClockTime::new(8, 30).unwrap();

    for raw in ["8h30", "08:30", "8:30", "8.30", " 8 h 30 "] {
      assert_eq!(raw.parse::<ClockTime>().unwrap(), expected, "{raw}");
    }

    assert_eq!("9h".parse::<ClockTime>().unwrap(), ClockTime::new(9, 0).unwrap());
    assert_eq!("14".parse::<ClockTime>().unwrap(), ClockTime::new(14, 0).unwrap());
  }

  #[test]
  fn rejects_garbage() {
    assert!("25h00".parse::<ClockTime>().is_err());
    assert!("8h75".parse::<ClockTime>().is_err());
    assert!("midi".parse::<ClockTime>().is_err());
    assert!("".parse::<ClockTime>().is_err());
  }

  #[test]
  fn renders_canonical_and_french() {
    let time = ClockTime::new(8, 0).unwrap();
    assert_eq!(time.to_string(), "08:00");
    assert_eq!(time.to_french(), "8h");
    assert_eq!(ClockTime::new(13, 5).unwrap().to_french(), "13h05");

    let back = time.to_french().parse::<ClockTime>().unwrap();
    assert_eq!(back, time);
  }

  #[test]
  fn serializes_as_string() {
    let time = ClockTime::new(7, 45).unwrap();
    assert_eq!(serde_json::to_string(&time).unwrap(), "\"07:45\"");
    assert_eq!(serde_json::from_str::<ClockTime>("\"7h45\"").unwrap(), time);
  }
}

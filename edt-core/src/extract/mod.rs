//! Best-effort conversion of vision/OCR output into timetable data.
//!
//! Nothing in here fails: JSON that does not parse falls through to the
//! line heuristics, and the heuristics degrade to placeholder metadata.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::ClockTime;
use crate::model::{Day, Entity, ScheduleEntry, TimeSlot};

mod heuristic;
mod structured;
pub mod vocabulary;

pub(crate) const DASHES: [char; 5] = ['-', '–', '—', '‑', '−'];

pub(crate) static TIME_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\b\d{1,2}\s*[hH:.](?:\s*\d{2})?").unwrap());
pub(crate) static RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\b(\d{1,2}\s*[hH:.](?:\s*\d{2})?)\s*[-–—‑−]\s*(\d{1,2}\s*[hH:.](?:\s*\d{2})?)").unwrap()
});
static JSON_SPAN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static FENCE_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```$").unwrap());

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub school: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub year: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub class: Option<String>,
  /// Fields holding a stand-in value rather than extracted text.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub placeholders: Vec<String>,
}

impl PartialMetadata {
  pub fn is_placeholder(&self, field: &str) -> bool {
    self.placeholders.iter().any(|name| name == field)
  }

  fn extracted<'a>(&self, field: &str, value: &'a Option<String>) -> Option<&'a String> {
    value.as_ref().filter(|_| !self.is_placeholder(field))
  }

  pub fn extracted_school(&self) -> Option<&String> {
    self.extracted("school", &self.school)
  }

  pub fn extracted_year(&self) -> Option<&String> {
    self.extracted("year", &self.year)
  }

  pub fn extracted_class(&self) -> Option<&String> {
    self.extracted("class", &self.class)
  }
}

/// Whatever could be recovered; a missing field means "not extracted".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialTimetable {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<PartialMetadata>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub days: Option<Vec<Day>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time_slots: Option<Vec<TimeSlot>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subjects: Option<Vec<Entity>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub schedule: Option<Vec<ScheduleEntry>>,
}

/// Filled vs missing parts of an extraction, for a confidence indicator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
  pub days: usize,
  pub time_slots: usize,
  pub subjects: usize,
  pub entries: usize,
  pub missing: Vec<&'static str>,
}

impl ExtractionReport {
  pub fn is_complete(&self) -> bool {
    self.missing.is_empty()
  }
}

impl PartialTimetable {
  pub fn report(&self) -> ExtractionReport {
    let count = |len: Option<usize>| len.unwrap_or(0);
    let mut report = ExtractionReport {
      days: count(self.days.as_ref().map(Vec::len)),
      time_slots: count(self.time_slots.as_ref().map(Vec::len)),
      subjects: count(self.subjects.as_ref().map(Vec::len)),
      entries: count(self.schedule.as_ref().map(Vec::len)),
      missing: Vec::new(),
    };

    let metadata = self.metadata.clone().unwrap_or_default();
    for (name, present) in [
      ("school", metadata.extracted_school().is_some()),
      ("year", metadata.extracted_year().is_some()),
      ("class", metadata.extracted_class().is_some()),
      ("days", report.days > 0),
      ("timeSlots", report.time_slots > 0),
      ("subjects", report.subjects > 0),
      ("schedule", report.entries > 0),
    ] {
      if !present {
        report.missing.push(name);
      }
    }

    report
  }
}

/// Turns vision output into partial timetable data.
pub fn parse(text: &str) -> PartialTimetable {
  let trimmed = strip_fence(text.trim());

  if trimmed.starts_with('{') && trimmed.ends_with('}') {
    if let Some(span) = JSON_SPAN_REGEX.find(trimmed) {
      match serde_json::from_str::<serde_json::Value>(span.as_str()) {
        Ok(value) if value.is_object() => return structured::process(&value),
        Ok(_) => debug!("JSON payload is not an object, using text heuristics"),
        Err(err) => debug!("Invalid JSON payload ({}), using text heuristics", err),
      }
    }
  }

  heuristic::parse(text)
}

/// Unwraps a markdown code block around the whole text, as chat models like to add.
fn strip_fence(text: &str) -> &str {
  match FENCE_REGEX.captures(text) {
    Some(captures) => captures.get(1).map_or(text, |inner| inner.as_str().trim()),
    None => text,
  }
}

/// Rewrites every time of day in `text` into `HH:MM`.
pub(crate) fn normalize_times(text: &str) -> String {
  TIME_REGEX
    .replace_all(text, |captures: &Captures| {
      let raw = &captures[0];
      raw
        .parse::<ClockTime>()
        .map(|time| time.to_string())
        .unwrap_or_else(|_| raw.to_string())
    })
    .into_owned()
}

/// `8h00-9h00`, `08:00 – 09:00`, …
pub(crate) fn parse_range(text: &str) -> Option<(ClockTime, ClockTime)> {
  let (start, end) = text.trim().split_once(|c| DASHES.contains(&c))?;
  Some((start.parse().ok()?, end.parse().ok()?))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn normalizes_embedded_times() {
    assert_eq!(normalize_times("8h00"), "08:00");
    assert_eq!(normalize_times("de 8h à 9h30"), "de 08:00 à 09:30");
    assert_eq!(normalize_times("Maths"), "Maths");
  }

  #[test]
  fn parses_ranges() {
    let (start, end) = parse_range("8h00-9h00").unwrap();
    assert_eq!(start.to_string(), "08:00");
    assert_eq!(end.to_string(), "09:00");

    let (start, end) = parse_range(" 13:30 – 14:25 ").unwrap();
    assert_eq!(start.to_string(), "13:30");
    assert_eq!(end.to_string(), "14:25");

    assert!(parse_range("8h00").is_none());
    assert!(parse_range("matin-soir").is_none());
  }

  #[test]
  fn fenced_json_is_unwrapped() {
    let text = "```json\n{\"days\":[\"Lundi\"]}\n```";
    let partial = parse(text);
    assert_eq!(partial.days.unwrap()[0].name, "Lundi");
  }

  #[test]
  fn report_lists_missing_parts() {
    let report = PartialTimetable::default().report();
    assert!(!report.is_complete());
    assert_eq!(report.missing.len(), 7);
  }
}

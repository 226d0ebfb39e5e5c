use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::catalog::{self, NewEntity};
use crate::clock::ClockTime;
use crate::extract::vocabulary::{self, WEEKDAYS};
use crate::extract::{PartialMetadata, PartialTimetable, RANGE_REGEX};
use crate::model::{Day, Entity, EntityKind, EntityRef, ScheduleEntry, TimeSlot};

pub(crate) const UNKNOWN_SCHOOL: &str = "Unknown School";
pub(crate) const UNKNOWN_CLASS: &str = "Unknown Class";

const SCHOOL_LINES: usize = 5;
const HEADER_LINES: usize = 10;
const DAY_LINES: usize = 20;
const DAY_LOOKBEHIND: usize = 5;
const SLOT_LOOKBEHIND: usize = 3;
const SLOT_LOOKAHEAD: usize = 1;

static YEAR_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\b(\d{4}\s*[-/]\s*\d{4}|\d{4})\b").unwrap());
static CLASS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bclasse\s*:\s*(.+)$").unwrap());
static SALLE_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\bsalle\s*:?\s*([a-z0-9][\w-]*)").unwrap());
static BARE_ROOM_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]\d{2,3})\b").unwrap());
static FILLER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s|:;,()\[\]–—-]+").unwrap());

/// A schedule line whose subject is still the raw source text.
struct Candidate {
  day_id: u32,
  time_slot_id: u32,
  label: String,
  room: String,
}

pub(crate) fn parse(text: &str) -> PartialTimetable {
  match try_parse(text) {
    Ok(partial) => partial,
    Err(err) => {
      warn!("Text extraction failed, keeping placeholders only: {:#}", err);
      minimal()
    }
  }
}

fn current_year() -> String {
  OffsetDateTime::now_utc().year().to_string()
}

pub(crate) fn minimal() -> PartialTimetable {
  PartialTimetable {
    metadata: Some(with_placeholders(None, None, None)),
    ..PartialTimetable::default()
  }
}

fn try_parse(text: &str) -> anyhow::Result<PartialTimetable> {
  let lines = text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .collect::<Vec<&str>>();

  let metadata = read_metadata(&lines);
  let days = read_days(&lines);
  let time_slots = read_time_slots(&lines);
  let candidates = read_candidates(&lines, &time_slots);
  let (subjects, schedule) = backfill(candidates)?;

  debug!(
    "Heuristics found {} days, {} time slots, {} entries",
    days.len(),
    time_slots.len(),
    schedule.len()
  );

  Ok(PartialTimetable {
    metadata: Some(metadata),
    days: Some(days).filter(|days| !days.is_empty()),
    time_slots: Some(time_slots).filter(|slots| !slots.is_empty()),
    subjects: Some(subjects).filter(|subjects| !subjects.is_empty()),
    schedule: Some(schedule).filter(|schedule| !schedule.is_empty()),
  })
}

fn read_metadata(lines: &[&str]) -> PartialMetadata {
  let school = lines
    .iter()
    .take(SCHOOL_LINES)
    .find(|line| vocabulary::has_school_keyword(line))
    .map(|line| line.to_string());

  let header = &lines[..lines.len().min(HEADER_LINES)];
  let year = header.iter().find_map(|line| {
    YEAR_REGEX
      .captures(line)
      .map(|captures| captures[1].split_whitespace().collect::<String>())
  });
  let class = header.iter().find_map(|line| {
    CLASS_REGEX
      .captures(line)
      .map(|captures| captures[1].trim().to_string())
  });

  with_placeholders(school, year, class)
}

/// Fills unrecognized header fields with stand-ins and records which ones.
fn with_placeholders(
  school: Option<String>,
  year: Option<String>,
  class: Option<String>,
) -> PartialMetadata {
  let mut placeholders = Vec::new();
  let mut fill = |field: &str, value: Option<String>, fallback: fn() -> String| {
    Some(value.unwrap_or_else(|| {
      placeholders.push(field.to_string());
      fallback()
    }))
  };

  PartialMetadata {
    school: fill("school", school, || UNKNOWN_SCHOOL.to_string()),
    year: fill("year", year, current_year),
    class: fill("class", class, || UNKNOWN_CLASS.to_string()),
    placeholders,
  }
}

/// Days keep their calendar position as id, whatever order they show up in.
fn read_days(lines: &[&str]) -> Vec<Day> {
  let mut found = Vec::new();
  for line in lines.iter().take(DAY_LINES) {
    for index in vocabulary::weekdays_in(line) {
      if !found.contains(&index) {
        found.push(index);
      }
    }
  }

  found.sort_unstable();
  found
    .into_iter()
    .map(|index| Day {
      id: index as u32 + 1,
      name: WEEKDAYS[index].to_string(),
    })
    .collect()
}

fn ranges_in(line: &str) -> Vec<(ClockTime, ClockTime)> {
  RANGE_REGEX
    .captures_iter(line)
    .filter_map(|captures| {
      let start = captures[1].parse::<ClockTime>().ok()?;
      let end = captures[2].parse::<ClockTime>().ok()?;
      Some((start, end))
    })
    .collect()
}

/// Slots are numbered chronologically after sorting, unlike days.
fn read_time_slots(lines: &[&str]) -> Vec<TimeSlot> {
  let mut ranges = Vec::new();
  for line in lines {
    for range in ranges_in(line) {
      if !ranges.contains(&range) {
        ranges.push(range);
      }
    }
  }

  ranges.sort();
  ranges
    .into_iter()
    .zip(1..)
    .map(|((start, end), id)| TimeSlot { id, start, end })
    .collect()
}

fn is_filler(text: &str) -> bool {
  FILLER_REGEX.replace_all(text, "").is_empty()
}

fn is_day_line(line: &str) -> bool {
  !vocabulary::weekdays_in(line).is_empty() && is_filler(&vocabulary::strip_weekdays(line))
}

fn is_slot_line(line: &str) -> bool {
  RANGE_REGEX.is_match(line) && is_filler(&RANGE_REGEX.replace_all(line, ""))
}

fn read_candidates(lines: &[&str], time_slots: &[TimeSlot]) -> Vec<Candidate> {
  let mut candidates = Vec::new();

  for (index, line) in lines.iter().enumerate() {
    if is_day_line(line) || is_slot_line(line) {
      continue;
    }
    if vocabulary::subject_keyword(line).is_none() {
      continue;
    }

    let day_id = (index.saturating_sub(DAY_LOOKBEHIND)..=index)
      .rev()
      .find_map(|position| vocabulary::weekdays_in(lines[position]).first().copied())
      .map(|day| day as u32 + 1);

    let nearby = (index.saturating_sub(SLOT_LOOKBEHIND)..=index)
      .rev()
      .chain(index + 1..=(index + SLOT_LOOKAHEAD).min(lines.len() - 1));
    let time_slot_id = nearby
      .filter_map(|position| ranges_in(lines[position]).first().copied())
      .find_map(|range| {
        time_slots
          .iter()
          .find(|slot| (slot.start, slot.end) == range)
          .map(|slot| slot.id)
      });

    match (day_id, time_slot_id) {
      (Some(day_id), Some(time_slot_id)) => candidates.push(Candidate {
        day_id,
        time_slot_id,
        label: line.to_string(),
        room: room_in(line),
      }),
      _ => debug!("No day or time slot near {:?}, dropping it", line),
    }
  }

  candidates
}

fn room_in(line: &str) -> String {
  SALLE_REGEX
    .captures(line)
    .or_else(|| BARE_ROOM_REGEX.captures(line))
    .map(|captures| captures[1].to_string())
    .unwrap_or_default()
}

/// Subject name hidden in a source line: what is left once times, rooms
/// and day names are taken out.
fn subject_name(line: &str) -> String {
  let rest = RANGE_REGEX.replace_all(line, " ");
  let rest = SALLE_REGEX.replace_all(&rest, " ");
  let rest = BARE_ROOM_REGEX.replace_all(&rest, " ");
  let rest = vocabulary::strip_weekdays(&rest);

  let name = rest
    .split_whitespace()
    .filter(|word| !is_filler(word))
    .collect::<Vec<&str>>()
    .join(" ");

  if name.is_empty() {
    return vocabulary::subject_keyword(line)
      .unwrap_or(line)
      .to_string();
  }
  name
}

/// Turns candidate labels into catalog subjects, first seen first minted.
fn backfill(candidates: Vec<Candidate>) -> anyhow::Result<(Vec<Entity>, Vec<ScheduleEntry>)> {
  let mut subjects: Vec<Entity> = Vec::new();
  let mut by_label: HashMap<String, EntityRef> = HashMap::new();
  let mut schedule = Vec::with_capacity(candidates.len());

  for candidate in candidates {
    let name = subject_name(&candidate.label);
    let key = name.to_lowercase();

    let entity = match by_label.get(&key) {
      Some(entity) => entity.clone(),
      None => {
        let subject = catalog::mint(&subjects, EntityKind::Subject, NewEntity::named(name))?;
        let id = subject.id.clone();
        subjects.push(subject);
        by_label.insert(key, id.clone());
        id
      }
    };

    let mut entry = ScheduleEntry::empty(
      schedule.len() as u32 + 1,
      candidate.day_id,
      candidate.time_slot_id,
    );
    entry.entity = Some(entity);
    entry.room = candidate.room;
    schedule.push(entry);
  }

  Ok((subjects, schedule))
}

#[cfg(test)]
mod test {
  use crate::catalog::PALETTE;
  use crate::extract::parse;

  use super::*;

  const SCAN: &str = "
    COLLÈGE JEAN MOULIN
    Année scolaire 2024-2025
    Classe: 4e B

    Mardi
    10h00-11h00 Anglais salle 12
    8h00-9h00 Mathématiques B201

    Lundi
    8h00 - 9h00
    Histoire-Géo A104
    9h00-10h00 Mathématiques B201
  ";

  #[test]
  fn reads_header() {
    let partial = parse(SCAN);
    let metadata = partial.metadata.unwrap();

    assert_eq!(metadata.school.as_deref(), Some("COLLÈGE JEAN MOULIN"));
    assert_eq!(metadata.year.as_deref(), Some("2024-2025"));
    assert_eq!(metadata.class.as_deref(), Some("4e B"));
  }

  #[test]
  fn days_keep_calendar_ids() {
    let days = parse(SCAN).days.unwrap();
    assert_eq!(
      days.iter().map(|d| (d.id, d.name.as_str())).collect::<Vec<_>>(),
      vec![(1, "Lundi"), (2, "Mardi")]
    );
  }

  #[test]
  fn slots_are_sorted_and_renumbered() {
    let slots = parse(SCAN).time_slots.unwrap();
    assert_eq!(
      slots
        .iter()
        .map(|s| (s.id, s.start.to_string(), s.end.to_string()))
        .collect::<Vec<_>>(),
      vec![
        (1, "08:00".to_string(), "09:00".to_string()),
        (2, "09:00".to_string(), "10:00".to_string()),
        (3, "10:00".to_string(), "11:00".to_string()),
      ]
    );
  }

  #[test]
  fn entries_get_synthesized_subjects() {
    let partial = parse(SCAN);
    let subjects = partial.subjects.unwrap();
    let schedule = partial.schedule.unwrap();

    assert_eq!(
      subjects.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
      vec!["Anglais", "Mathématiques", "Histoire-Géo"]
    );
    assert_eq!(subjects[0].id.as_str(), "s-1");
    assert_eq!(subjects[2].color, PALETTE[2]);

    let placed = schedule
      .iter()
      .map(|e| (e.day_id, e.time_slot_id, e.entity.clone().unwrap(), e.room.as_str()))
      .collect::<Vec<_>>();
    assert_eq!(
      placed,
      vec![
        (2, 3, EntityRef::subject(1), "12"),
        (2, 1, EntityRef::subject(2), "B201"),
        (1, 1, EntityRef::subject(3), "A104"),
        (1, 2, EntityRef::subject(2), "B201"),
      ]
    );
    assert!(schedule.iter().all(|e| e.notes.is_empty()));
  }

  #[test]
  fn unresolvable_line_is_dropped() {
    let partial = parse("Emploi du temps\nMathématiques B201\nFin");

    assert!(partial.schedule.is_none());
    assert!(partial.subjects.is_none());
    assert!(partial.days.is_none());
  }

  fn keys(text: &str) -> Vec<(u32, u32)> {
    parse(text)
      .schedule
      .unwrap_or_default()
      .iter()
      .map(ScheduleEntry::key)
      .collect()
  }

  #[test]
  fn day_is_looked_up_five_lines_back() {
    assert_eq!(
      keys("Lundi\nGroupe 1\nGroupe 2\nGroupe 3\n8h00-9h00\nMathématiques"),
      vec![(1, 1)]
    );
    assert!(keys("Lundi\nGroupe 1\nGroupe 2\nGroupe 3\nGroupe 4\n8h00-9h00\nMathématiques").is_empty());
  }

  #[test]
  fn slot_is_looked_up_one_line_ahead() {
    assert_eq!(keys("Lundi\nMathématiques\n8h00-9h00"), vec![(1, 1)]);
    assert!(keys("Lundi\nMathématiques\nGroupe 1\n8h00-9h00").is_empty());
  }

  #[test]
  fn slot_is_looked_up_three_lines_back() {
    assert_eq!(
      keys("Lundi\n8h00-9h00\nGroupe 1\nGroupe 2\nMathématiques"),
      vec![(1, 1)]
    );
    assert!(keys("Lundi\n8h00-9h00\nGroupe 1\nGroupe 2\nGroupe 3\nMathématiques").is_empty());
  }

  #[test]
  fn malformed_json_falls_back() {
    let partial = parse("{not valid json}");
    let metadata = partial.metadata.unwrap();

    assert_eq!(metadata.school.as_deref(), Some(UNKNOWN_SCHOOL));
    assert_eq!(metadata.class.as_deref(), Some(UNKNOWN_CLASS));
    assert_eq!(metadata.year, Some(current_year()));
    assert_eq!(metadata.placeholders, vec!["school", "year", "class"]);

    assert!(parse("{not valid json").metadata.is_some());
  }

  #[test]
  fn stand_ins_count_as_missing() {
    let partial = parse("Lundi\n8h00-9h00\nMathématiques B201");
    let report = partial.report();

    assert_eq!(report.entries, 1);
    assert_eq!(report.missing, vec!["school", "year", "class"]);
  }

  #[test]
  fn recognized_header_is_not_a_stand_in() {
    let metadata = parse("Collège Victor Hugo\nClasse : 4e B\nLundi").metadata.unwrap();

    assert_eq!(metadata.class.as_deref(), Some("4e B"));
    assert_eq!(metadata.placeholders, vec!["year"]);
  }

  #[test]
  fn minimal_has_placeholders_only() {
    let partial = minimal();
    assert!(partial.metadata.is_some());
    assert!(partial.days.is_none());
    assert!(partial.schedule.is_none());
  }
}

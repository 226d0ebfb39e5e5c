use serde_json::Value;
use tracing::debug;

use crate::catalog::{self, NewEntity};
use crate::clock::ClockTime;
use crate::extract::{normalize_times, parse_range, PartialMetadata, PartialTimetable};
use crate::model::{Day, Entity, EntityKind, EntityRef, ScheduleEntry, TimeSlot};
use crate::notes;

/// Reads a loosely typed `{school, year, class, days, timeSlots, subjects, schedule}` object.
pub(crate) fn process(value: &Value) -> PartialTimetable {
  let days = value.get("days").and_then(Value::as_array).map(|days| read_days(days));
  let time_slots = value
    .get("timeSlots")
    .and_then(Value::as_array)
    .map(|slots| read_time_slots(slots));

  let mut subjects = Vec::new();
  if let Some(raw) = value.get("subjects").and_then(Value::as_array) {
    for subject in raw {
      catalog_entry(&mut subjects, subject);
    }
  }

  let schedule = value.get("schedule").and_then(Value::as_array).map(|raw| {
    read_schedule(
      raw,
      days.as_deref().unwrap_or_default(),
      time_slots.as_deref().unwrap_or_default(),
      &mut subjects,
    )
  });

  let subjects = if subjects.is_empty() && value.get("subjects").is_none() {
    None
  } else {
    Some(subjects)
  };

  PartialTimetable {
    metadata: read_metadata(value),
    days,
    time_slots,
    subjects,
    schedule,
  }
}

/// String or number under the first of `keys`, trimmed and non-empty.
fn text(value: &Value, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|key| match value.get(*key)? {
    Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
    Value::Number(number) => Some(number.to_string()),
    _ => None,
  })
}

fn read_metadata(value: &Value) -> Option<PartialMetadata> {
  let metadata = PartialMetadata {
    school: text(value, &["school"]),
    year: text(value, &["year"]),
    class: text(value, &["class", "classe"]),
    placeholders: Vec::new(),
  };

  if metadata == PartialMetadata::default() {
    return None;
  }
  Some(metadata)
}

/// Ids follow source order.
fn read_days(raw: &[Value]) -> Vec<Day> {
  raw
    .iter()
    .filter_map(|day| match day {
      Value::String(name) => Some(name.trim().to_string()),
      other => text(other, &["name"]),
    })
    .filter(|name| !name.is_empty())
    .zip(1..)
    .map(|(name, id)| Day { id, name })
    .collect()
}

fn read_time_slots(raw: &[Value]) -> Vec<TimeSlot> {
  raw
    .iter()
    .filter_map(|slot| {
      let range = match slot {
        Value::String(range) => parse_range(range),
        other => {
          let start = text(other, &["start"])?.parse::<ClockTime>().ok()?;
          let end = text(other, &["end"])?.parse::<ClockTime>().ok()?;
          Some((start, end))
        }
      };

      if range.is_none() {
        debug!("Skipping unreadable time slot {}", slot);
      }
      range
    })
    .zip(1..)
    .map(|((start, end), id)| TimeSlot { id, start, end })
    .collect()
}

/// Finds `subject` in the catalog by name or appends it, returning its id.
fn catalog_entry(subjects: &mut Vec<Entity>, subject: &Value) -> Option<EntityRef> {
  let (name, details) = match subject {
    Value::String(name) => (name.trim().to_string(), None),
    other => (text(other, &["name"])?, Some(other)),
  };
  if name.is_empty() {
    return None;
  }

  if let Some(existing) = catalog::find_by_name(subjects, &name) {
    return Some(existing.id.clone());
  }

  let new = NewEntity {
    short_name: details.and_then(|details| text(details, &["shortName"])),
    color: details
      .and_then(|details| text(details, &["color"]))
      .filter(|color| catalog::is_hex_color(color)),
    icon: details
      .and_then(|details| text(details, &["icon"]))
      .filter(|icon| catalog::is_single_glyph(icon)),
    teachers: details.and_then(read_teachers),
    name,
  };

  match catalog::mint(subjects, EntityKind::Subject, new) {
    Ok(entity) => {
      let id = entity.id.clone();
      subjects.push(entity);
      Some(id)
    }
    Err(err) => {
      debug!("Skipping subject {}: {}", subject, err);
      None
    }
  }
}

fn read_teachers(details: &Value) -> Option<Vec<String>> {
  match details.get("teachers") {
    Some(Value::Array(teachers)) => Some(
      teachers
        .iter()
        .filter_map(Value::as_str)
        .map(|teacher| teacher.trim().to_string())
        .filter(|teacher| !teacher.is_empty())
        .collect(),
    ),
    _ => text(details, &["teacher"]).map(|teacher| vec![teacher]),
  }
}

fn resolve_day(days: &[Day], raw: &Value) -> Option<u32> {
  if let Some(id) = raw.as_u64() {
    return days.iter().find(|day| u64::from(day.id) == id).map(|day| day.id);
  }

  let name = raw.as_str()?.trim().to_lowercase();
  if name.is_empty() {
    return None;
  }

  days
    .iter()
    .find(|day| day.name.to_lowercase() == name)
    .or_else(|| {
      days.iter().find(|day| {
        let candidate = day.name.to_lowercase();
        candidate.contains(&name) || name.contains(&candidate)
      })
    })
    .map(|day| day.id)
}

fn resolve_time_slot(slots: &[TimeSlot], raw: &Value) -> Option<u32> {
  if let Some(id) = raw.as_u64() {
    return slots.iter().find(|slot| u64::from(slot.id) == id).map(|slot| slot.id);
  }

  let normalized = normalize_times(raw.as_str()?);
  slots
    .iter()
    .find(|slot| normalized.contains(&slot.start.to_string()))
    .or_else(|| {
      slots
        .iter()
        .find(|slot| normalized.contains(&slot.end.to_string()))
    })
    .map(|slot| slot.id)
}

fn read_schedule(
  raw: &[Value],
  days: &[Day],
  slots: &[TimeSlot],
  subjects: &mut Vec<Entity>,
) -> Vec<ScheduleEntry> {
  let mut schedule = Vec::with_capacity(raw.len());

  for item in raw {
    let day_id = item.get("day").and_then(|day| resolve_day(days, day));
    let slot_id = ["timeSlot", "time", "slot"]
      .iter()
      .find_map(|key| item.get(*key))
      .and_then(|slot| resolve_time_slot(slots, slot));

    let (day_id, time_slot_id) = match (day_id, slot_id) {
      (Some(day_id), Some(slot_id)) => (day_id, slot_id),
      _ => {
        debug!("Dropping unplaceable schedule entry {}", item);
        continue;
      }
    };

    let mut entry = ScheduleEntry::empty(schedule.len() as u32 + 1, day_id, time_slot_id);
    entry.entity = item
      .get("subject")
      .and_then(|subject| catalog_entry(subjects, subject));
    entry.room = text(item, &["room", "salle"]).unwrap_or_default();
    entry.notes = text(item, &["notes"]).unwrap_or_default();
    if let Some(teacher) = text(item, &["teacher", "professeur"]) {
      entry.notes = notes::with_teacher(&entry.notes, &teacher);
    }

    schedule.push(entry);
  }

  schedule
}

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::clock::ClockTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Subject,
  Activity,
}

impl EntityKind {
  pub fn prefix(self) -> &'static str {
    match self {
      EntityKind::Subject => "s",
      EntityKind::Activity => "a",
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      EntityKind::Subject => "subject",
      EntityKind::Activity => "activity",
    }
  }
}

/// Reference to a subject or an activity.
///
/// The kind travels with the id; the `s-`/`a-` string form only exists at
/// the serialization boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityRef {
  kind: EntityKind,
  id: String,
}

impl EntityRef {
  pub fn new(kind: EntityKind, number: u32) -> Self {
    Self {
      kind,
      id: format!("{}-{}", kind.prefix(), number),
    }
  }

  pub fn subject(number: u32) -> Self {
    Self::new(EntityKind::Subject, number)
  }

  pub fn activity(number: u32) -> Self {
    Self::new(EntityKind::Activity, number)
  }

  pub fn kind(&self) -> EntityKind {
    self.kind
  }

  pub fn as_str(&self) -> &str {
    &self.id
  }

  /// Numeric suffix of ids minted by this crate (`s-12` -> 12).
  pub fn number(&self) -> Option<u32> {
    self.id[2..].parse().ok()
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.id)
  }
}

impl FromStr for EntityRef {
  type Err = anyhow::Error;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    let kind = match value.get(..2) {
      Some("s-") => EntityKind::Subject,
      Some("a-") => EntityKind::Activity,
      _ => bail!("unknown entity id {value:?}"),
    };

    if value.len() == 2 {
      return Err(anyhow!("entity id {value:?} has no suffix"));
    }

    Ok(Self {
      kind,
      id: value.to_string(),
    })
  }
}

impl TryFrom<String> for EntityRef {
  type Error = anyhow::Error;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<EntityRef> for String {
  fn from(value: EntityRef) -> Self {
    value.id
  }
}

/// A subject or an activity that can occupy a schedule cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
  pub id: EntityRef,
  pub name: String,
  pub short_name: String,
  pub color: String,
  pub icon: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub teachers: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
  pub id: u32,
  pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
  pub id: u32,
  pub start: ClockTime,
  pub end: ClockTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeekType {
  A,
  B,
}

/// Week B content of a cell alternating between two weeks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
  pub enabled: bool,
  #[serde(
    default,
    deserialize_with = "empty_entity_as_none",
    skip_serializing_if = "Option::is_none"
  )]
  pub entity_id_b: Option<EntityRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub room_b: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

/// The record bound to one (day, time slot) cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct ScheduleEntry {
  pub id: u32,
  pub day_id: u32,
  pub time_slot_id: u32,
  pub entity: Option<EntityRef>,
  pub room: String,
  pub notes: String,
  pub week_type: Option<WeekType>,
  pub split: Split,
}

impl ScheduleEntry {
  pub fn empty(id: u32, day_id: u32, time_slot_id: u32) -> Self {
    Self {
      id,
      day_id,
      time_slot_id,
      entity: None,
      room: String::new(),
      notes: String::new(),
      week_type: None,
      split: Split::default(),
    }
  }

  pub fn key(&self) -> (u32, u32) {
    (self.day_id, self.time_slot_id)
  }
}

/// Persisted shape of an entry: `type` + `entityId` strings, empty when unassigned.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
  id: u32,
  day_id: u32,
  time_slot_id: u32,
  #[serde(rename = "type", default)]
  kind: String,
  #[serde(default)]
  entity_id: String,
  #[serde(default)]
  room: String,
  #[serde(default)]
  notes: String,
  #[serde(default)]
  week_type: Option<WeekType>,
  #[serde(default)]
  split: Split,
}

impl From<RawEntry> for ScheduleEntry {
  fn from(raw: RawEntry) -> Self {
    Self {
      entity: lenient_ref(&raw.entity_id),
      id: raw.id,
      day_id: raw.day_id,
      time_slot_id: raw.time_slot_id,
      room: raw.room,
      notes: raw.notes,
      week_type: raw.week_type,
      split: raw.split,
    }
  }
}

/// An id that does not name a subject or an activity reads as unassigned.
fn lenient_ref(value: &str) -> Option<EntityRef> {
  if value.is_empty() {
    return None;
  }

  match value.parse() {
    Ok(entity) => Some(entity),
    Err(err) => {
      warn!("Ignoring entity reference {:?}: {}", value, err);
      None
    }
  }
}

impl From<ScheduleEntry> for RawEntry {
  fn from(entry: ScheduleEntry) -> Self {
    let (kind, entity_id) = match entry.entity {
      Some(entity) => (entity.kind().as_str().to_string(), entity.into()),
      None => (String::new(), String::new()),
    };

    Self {
      id: entry.id,
      day_id: entry.day_id,
      time_slot_id: entry.time_slot_id,
      kind,
      entity_id,
      room: entry.room,
      notes: entry.notes,
      week_type: entry.week_type,
      split: entry.split,
    }
  }
}

fn empty_entity_as_none<'de, D>(deserializer: D) -> Result<Option<EntityRef>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(
    Option::<String>::deserialize(deserializer)?
      .as_deref()
      .and_then(lenient_ref),
  )
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  pub school: String,
  pub year: String,
  pub class: String,
}

/// Root document holding the whole timetable; the unit of persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTableData {
  pub metadata: Metadata,
  pub time_slots: Vec<TimeSlot>,
  pub days: Vec<Day>,
  pub subjects: Vec<Entity>,
  pub activities: Vec<Entity>,
  pub schedule: Vec<ScheduleEntry>,
  #[serde(default)]
  pub special_notes: Vec<String>,
}

const DEFAULT_DAYS: [&str; 5] = ["Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi"];
const DEFAULT_FIRST_HOUR: u8 = 8;
const DEFAULT_LAST_HOUR: u8 = 17;

impl Default for TimeTableData {
  fn default() -> Self {
    let days = DEFAULT_DAYS
      .iter()
      .zip(1..)
      .map(|(name, id)| Day {
        id,
        name: name.to_string(),
      })
      .collect::<Vec<Day>>();

    let time_slots = (DEFAULT_FIRST_HOUR..DEFAULT_LAST_HOUR)
      .zip(1..)
      .filter_map(|(hour, id)| {
        Some(TimeSlot {
          id,
          start: ClockTime::new(hour, 0)?,
          end: ClockTime::new(hour + 1, 0)?,
        })
      })
      .collect::<Vec<TimeSlot>>();

    let schedule = build_grid(&days, &time_slots, |_, _| None);

    Self {
      metadata: Metadata::default(),
      time_slots,
      days,
      subjects: Vec::new(),
      activities: Vec::new(),
      schedule,
      special_notes: Vec::new(),
    }
  }
}

impl TimeTableData {
  pub fn next_entry_id(&self) -> u32 {
    self.schedule.iter().map(|entry| entry.id).max().unwrap_or(0) + 1
  }

  pub fn entities(&self, kind: EntityKind) -> &[Entity] {
    match kind {
      EntityKind::Subject => &self.subjects,
      EntityKind::Activity => &self.activities,
    }
  }

  pub fn entities_mut(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
    match kind {
      EntityKind::Subject => &mut self.subjects,
      EntityKind::Activity => &mut self.activities,
    }
  }

  /// Checks the structural rules every stored timetable keeps: unique day,
  /// time slot and cell keys, and a split flag set exactly when the entry
  /// carries a week label.
  pub fn validate(&self) -> anyhow::Result<()> {
    let mut days = HashSet::new();
    if let Some(day) = self.days.iter().find(|day| !days.insert(day.id)) {
      bail!("Day id {} is used twice", day.id);
    }

    let mut slots = HashSet::new();
    if let Some(slot) = self.time_slots.iter().find(|slot| !slots.insert(slot.id)) {
      bail!("Time slot id {} is used twice", slot.id);
    }

    let mut cells = HashSet::new();
    for entry in &self.schedule {
      if !cells.insert(entry.key()) {
        bail!(
          "Day {} and time slot {} hold more than one entry",
          entry.day_id,
          entry.time_slot_id
        );
      }
      if entry.split.enabled != entry.week_type.is_some() {
        bail!(
          "Entry {} has split {} but week type {:?}",
          entry.id,
          entry.split.enabled,
          entry.week_type
        );
      }
    }

    Ok(())
  }
}

/// Builds one entry per (day, slot) cell in day-major order, numbering ids from 1.
///
/// `existing` supplies the content of a cell if there is any; its id is replaced.
pub(crate) fn build_grid<F>(days: &[Day], time_slots: &[TimeSlot], mut existing: F) -> Vec<ScheduleEntry>
where
  F: FnMut(u32, u32) -> Option<ScheduleEntry>,
{
  let mut schedule = Vec::with_capacity(days.len() * time_slots.len());
  let mut id = 1;

  for day in days {
    for slot in time_slots {
      let entry = match existing(day.id, slot.id) {
        Some(entry) => ScheduleEntry { id, ..entry },
        None => ScheduleEntry::empty(id, day.id, slot.id),
      };
      schedule.push(entry);
      id += 1;
    }
  }

  schedule
}

/// Cosmetic settings stored next to the timetable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
  pub title: String,
  pub font: String,
  pub border_color: String,
  pub border_width: u32,
}

impl Default for DisplaySettings {
  fn default() -> Self {
    Self {
      title: "Emploi du temps".to_string(),
      font: "Inter".to_string(),
      border_color: "#1f2937".to_string(),
      border_width: 1,
    }
  }
}

#[cfg(test)]
mod test {
  use std::collections::HashSet;

  use serde_json::json;

  use super::*;

  #[test]
  fn default_has_one_entry_per_cell() {
    let data = TimeTableData::default();

    assert_eq!(data.days.len(), 5);
    assert_eq!(data.time_slots.len(), 9);
    assert_eq!(data.schedule.len(), 45);

    let keys = data.schedule.iter().map(ScheduleEntry::key).collect::<HashSet<_>>();
    assert_eq!(keys.len(), data.schedule.len());

    for pair in data.time_slots.windows(2) {
      assert_eq!(pair[0].end, pair[1].start);
    }
  }

  #[test]
  fn entity_ref_prefix() {
    let subject = "s-4".parse::<EntityRef>().unwrap();
    assert_eq!(subject.kind(), EntityKind::Subject);
    assert_eq!(subject.number(), Some(4));

    let activity = "a-club".parse::<EntityRef>().unwrap();
    assert_eq!(activity.kind(), EntityKind::Activity);
    assert_eq!(activity.number(), None);

    assert!("x-1".parse::<EntityRef>().is_err());
    assert!("s-".parse::<EntityRef>().is_err());
    assert!("".parse::<EntityRef>().is_err());
  }

  #[test]
  fn entity_refs_sort_by_kind_then_id() {
    let mut refs = vec![
      EntityRef::activity(1),
      EntityRef::subject(2),
      EntityRef::subject(1),
    ];
    refs.sort();

    assert_eq!(
      refs,
      vec![EntityRef::subject(1), EntityRef::subject(2), EntityRef::activity(1)]
    );
  }

  #[test]
  fn entry_keeps_persisted_layout() {
    let mut entry = ScheduleEntry::empty(3, 1, 2);
    entry.entity = Some(EntityRef::activity(1));
    entry.week_type = Some(WeekType::A);
    entry.split = Split {
      enabled: true,
      entity_id_b: Some(EntityRef::subject(2)),
      room_b: Some("B12".to_string()),
      notes: None,
    };

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(
      value,
      json!({
        "id": 3,
        "dayId": 1,
        "timeSlotId": 2,
        "type": "activity",
        "entityId": "a-1",
        "room": "",
        "notes": "",
        "weekType": "A",
        "split": { "enabled": true, "entityIdB": "s-2", "roomB": "B12" }
      })
    );

    let back = serde_json::from_value::<ScheduleEntry>(value).unwrap();
    assert_eq!(back, entry);
  }

  #[test]
  fn unassigned_entry_reads_empty_strings() {
    let entry = serde_json::from_value::<ScheduleEntry>(json!({
      "id": 1,
      "dayId": 1,
      "timeSlotId": 1,
      "type": "",
      "entityId": "",
      "room": "",
      "notes": "",
      "weekType": null,
      "split": { "enabled": false, "entityIdB": "" }
    }))
    .unwrap();

    assert_eq!(entry, ScheduleEntry::empty(1, 1, 1));
  }

  #[test]
  fn foreign_entity_ids_read_as_unassigned() {
    let entry = serde_json::from_value::<ScheduleEntry>(json!({
      "id": 1,
      "dayId": 1,
      "timeSlotId": 1,
      "type": "subject",
      "entityId": "maths",
      "room": "B201",
      "split": { "enabled": true, "entityIdB": "club" },
      "weekType": "A"
    }))
    .unwrap();

    assert_eq!(entry.entity, None);
    assert_eq!(entry.split.entity_id_b, None);
    assert_eq!(entry.room, "B201");
  }

  #[test]
  fn default_is_valid() {
    assert!(TimeTableData::default().validate().is_ok());
  }

  #[test]
  fn validate_rejects_duplicates() {
    let mut data = TimeTableData::default();
    data.days[1].id = data.days[0].id;
    assert!(data.validate().is_err());

    let mut data = TimeTableData::default();
    data.time_slots[2].id = data.time_slots[0].id;
    assert!(data.validate().is_err());

    let mut data = TimeTableData::default();
    let mut twin = data.schedule[0].clone();
    twin.id = 99;
    data.schedule.push(twin);
    assert!(data.validate().is_err());
  }

  #[test]
  fn validate_rejects_split_without_week() {
    let mut data = TimeTableData::default();
    data.schedule[0].split.enabled = true;
    assert!(data.validate().is_err());

    data.schedule[0].week_type = Some(WeekType::B);
    assert!(data.validate().is_ok());

    data.schedule[0].split.enabled = false;
    assert!(data.validate().is_err());
  }
}

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::catalog;
use crate::extract::PartialTimetable;
use crate::model::{
  build_grid, Day, Entity, EntityKind, EntityRef, ScheduleEntry, TimeSlot, TimeTableData,
};

/// Merges extracted data into a copy of `data`.
///
/// Extracted metadata fields, days and time slots replace the current ones;
/// placeholder metadata never overwrites a stored value. Subjects join the
/// catalog unless one with the same name exists, and the grid is rebuilt so
/// that every cell holds exactly one entry.
///
/// Returns an unchanged copy when the merged result would not be a valid
/// timetable.
pub fn import(current: &TimeTableData, partial: PartialTimetable) -> TimeTableData {
  let mut data = current.clone();

  if let Some(metadata) = &partial.metadata {
    if let Some(school) = metadata.extracted_school() {
      data.metadata.school = school.clone();
    }
    if let Some(year) = metadata.extracted_year() {
      data.metadata.year = year.clone();
    }
    if let Some(class) = metadata.extracted_class() {
      data.metadata.class = class.clone();
    }
  }

  let mut layout_changed = false;
  if let Some(days) = partial.days.filter(|days| !days.is_empty()) {
    data.days = unique_by_id(days, |day: &Day| day.id);
    layout_changed = true;
  }
  if let Some(time_slots) = partial.time_slots.filter(|slots| !slots.is_empty()) {
    data.time_slots = unique_by_id(time_slots, |slot: &TimeSlot| slot.id);
    layout_changed = true;
  }

  let mut renamed: HashMap<EntityRef, EntityRef> = HashMap::new();
  for subject in partial.subjects.unwrap_or_default() {
    let target = match catalog::find_by_name(&data.subjects, &subject.name) {
      Some(existing) => existing.id.clone(),
      None => {
        let id = catalog::next_ref(&data.subjects, EntityKind::Subject);
        data.subjects.push(Entity {
          id: id.clone(),
          ..subject.clone()
        });
        id
      }
    };
    renamed.insert(subject.id, target);
  }

  let extracted = partial.schedule.map(|schedule| {
    let mut cells: HashMap<(u32, u32), ScheduleEntry> = HashMap::new();
    for mut entry in schedule {
      for slot in [&mut entry.entity, &mut entry.split.entity_id_b] {
        if let Some(entity) = slot.take() {
          *slot = Some(renamed.get(&entity).cloned().unwrap_or(entity));
        }
      }
      if entry.split.enabled != entry.week_type.is_some() {
        debug!("Entry for cell {:?} has an unpaired split, unsplitting it", entry.key());
        entry.week_type = None;
        entry.split = Default::default();
      }
      if cells.contains_key(&entry.key()) {
        debug!("Ignoring second entry for cell {:?}", entry.key());
        continue;
      }
      cells.insert(entry.key(), entry);
    }
    cells
  });

  if extracted.is_some() || layout_changed {
    let mut previous = match &extracted {
      Some(_) => HashMap::new(),
      None => data
        .schedule
        .drain(..)
        .map(|entry| (entry.key(), entry))
        .collect::<HashMap<(u32, u32), ScheduleEntry>>(),
    };
    let mut extracted = extracted.unwrap_or_default();

    data.schedule = build_grid(&data.days, &data.time_slots, |day_id, slot_id| {
      extracted
        .remove(&(day_id, slot_id))
        .or_else(|| previous.remove(&(day_id, slot_id)))
    });

    let dropped = extracted.len() + previous.len();
    if dropped > 0 {
      debug!("{} entries fell outside the grid", dropped);
    }
  }

  if let Err(err) = data.validate() {
    warn!("Discarding import: {:#}", err);
    return current.clone();
  }

  info!(
    "Imported timetable: {} days, {} time slots, {} subjects",
    data.days.len(),
    data.time_slots.len(),
    data.subjects.len()
  );
  data
}

/// First occurrence of every id wins.
fn unique_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> u32) -> Vec<T> {
  let mut seen = HashSet::new();
  let before = items.len();
  let items = items
    .into_iter()
    .filter(|item| seen.insert(id(item)))
    .collect::<Vec<T>>();

  if items.len() < before {
    debug!("Dropped {} items with a repeated id", before - items.len());
  }
  items
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::catalog::{add_entity, NewEntity};
  use crate::extract::{parse, PartialMetadata};
  use crate::grid::get_entry;

  const REFERENCE: &str = r#"{"days":["Lundi","Mardi"],"timeSlots":["8h00-9h00","9h00-10h00"],"subjects":["Maths","Anglais"],"schedule":[{"day":"Lundi","timeSlot":"8h00","subject":"Maths","room":"B201"},{"day":"Lundi","timeSlot":"8h00","subject":"Anglais"},{"day":"Mardi","timeSlot":"9h00","subject":"Anglais"}]}"#;

  #[test]
  fn fills_a_complete_grid() {
    let data = import(&TimeTableData::default(), parse(REFERENCE));

    assert_eq!(data.days.len(), 2);
    assert_eq!(data.time_slots.len(), 2);
    assert_eq!(data.schedule.len(), 4);

    let keys = data.schedule.iter().map(ScheduleEntry::key).collect::<HashSet<_>>();
    assert_eq!(keys.len(), 4);

    let monday = get_entry(&data, 1, 1).unwrap();
    assert_eq!(monday.entity, Some(EntityRef::subject(1)));
    assert_eq!(monday.room, "B201");
    assert_eq!(get_entry(&data, 2, 2).unwrap().entity, Some(EntityRef::subject(2)));
    assert_eq!(get_entry(&data, 1, 2).unwrap().entity, None);
  }

  #[test]
  fn reuses_existing_subjects() -> anyhow::Result<()> {
    let (data, _) = add_entity(
      &TimeTableData::default(),
      EntityKind::Subject,
      NewEntity::named("Anglais"),
    )?;

    let data = import(&data, parse(REFERENCE));
    let names = data
      .subjects
      .iter()
      .map(|s| (s.id.as_str(), s.name.as_str()))
      .collect::<Vec<_>>();
    assert_eq!(names, vec![("s-1", "Anglais"), ("s-2", "Maths")]);

    assert_eq!(get_entry(&data, 1, 1).unwrap().entity, Some(EntityRef::subject(2)));
    assert_eq!(get_entry(&data, 2, 2).unwrap().entity, Some(EntityRef::subject(1)));
    Ok(())
  }

  #[test]
  fn metadata_only_keeps_grid() {
    let mut data = TimeTableData::default();
    data.schedule[3].room = "Labo".to_string();

    let partial = PartialTimetable {
      metadata: Some(PartialMetadata {
        class: Some("3e A".to_string()),
        ..PartialMetadata::default()
      }),
      ..PartialTimetable::default()
    };
    let imported = import(&data, partial);

    assert_eq!(imported.metadata.class, "3e A");
    assert_eq!(imported.schedule, data.schedule);
  }

  #[test]
  fn new_slots_keep_surviving_cells() {
    let mut data = TimeTableData::default();
    data.schedule[0].room = "Labo".to_string();

    let partial = PartialTimetable {
      time_slots: Some(data.time_slots[..2].to_vec()),
      ..PartialTimetable::default()
    };
    let imported = import(&data, partial);

    assert_eq!(imported.schedule.len(), 10);
    assert_eq!(get_entry(&imported, 1, 1).unwrap().room, "Labo");
  }

  #[test]
  fn repeated_day_ids_keep_the_first() {
    let partial = PartialTimetable {
      days: Some(vec![
        Day { id: 1, name: "Lundi".to_string() },
        Day { id: 1, name: "Mardi".to_string() },
      ]),
      ..PartialTimetable::default()
    };
    let imported = import(&TimeTableData::default(), partial);

    assert_eq!(imported.days, vec![Day { id: 1, name: "Lundi".to_string() }]);
    assert_eq!(imported.schedule.len(), 9);
    assert!(imported.validate().is_ok());
  }

  #[test]
  fn unpaired_split_is_undone() {
    let mut entry = ScheduleEntry::empty(1, 1, 1);
    entry.entity = Some(EntityRef::subject(1));
    entry.split.enabled = true;

    let partial = PartialTimetable {
      schedule: Some(vec![entry]),
      ..PartialTimetable::default()
    };
    let imported = import(&TimeTableData::default(), partial);

    let cell = get_entry(&imported, 1, 1).unwrap();
    assert_eq!(cell.entity, Some(EntityRef::subject(1)));
    assert!(!cell.split.enabled);
    assert!(imported.validate().is_ok());
  }

  #[test]
  fn stand_in_metadata_keeps_stored_values() {
    let mut data = TimeTableData::default();
    data.metadata.school = "Collège Jean Moulin".to_string();
    data.metadata.class = "4e B".to_string();
    data.metadata.year = "2024-2025".to_string();

    let partial = parse("Lundi\n8h00-9h00\nMathématiques B201");
    let imported = import(&data, partial);

    assert_eq!(imported.metadata, data.metadata);
    assert_eq!(get_entry(&imported, 1, 1).unwrap().room, "B201");
  }
}

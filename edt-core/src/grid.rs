use tracing::debug;

use crate::clock::ClockTime;
use crate::model::{EntityRef, ScheduleEntry, Split, TimeSlot, TimeTableData, WeekType};
use crate::notes;

pub fn get_entry(data: &TimeTableData, day_id: u32, time_slot_id: u32) -> Option<&ScheduleEntry> {
  data
    .schedule
    .iter()
    .find(|entry| entry.day_id == day_id && entry.time_slot_id == time_slot_id)
}

fn get_entry_mut(
  data: &mut TimeTableData,
  day_id: u32,
  time_slot_id: u32,
) -> Option<&mut ScheduleEntry> {
  data
    .schedule
    .iter_mut()
    .find(|entry| entry.day_id == day_id && entry.time_slot_id == time_slot_id)
}

/// Fields to overwrite on an entry; `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct EntryPatch {
  pub entity: Option<Option<EntityRef>>,
  pub room: Option<String>,
  pub notes: Option<String>,
  pub week_type: Option<Option<WeekType>>,
  pub split: Option<Split>,
}

impl EntryPatch {
  fn apply(self, entry: &mut ScheduleEntry) {
    if let Some(entity) = self.entity {
      entry.entity = entity;
    }
    if let Some(room) = self.room {
      entry.room = room;
    }
    if let Some(notes) = self.notes {
      entry.notes = notes;
    }
    if let Some(week_type) = self.week_type {
      entry.week_type = week_type;
    }
    if let Some(split) = self.split {
      entry.split = split;
    }
  }
}

/// Shallow-merges `patch` onto the entry of a copy; `None` if the cell does not exist.
pub fn update_entry(
  data: &TimeTableData,
  day_id: u32,
  time_slot_id: u32,
  patch: EntryPatch,
) -> Option<TimeTableData> {
  let mut data = data.clone();
  patch.apply(get_entry_mut(&mut data, day_id, time_slot_id)?);
  Some(data)
}

/// Sets the teacher of the cell's entity on every entry bound to that entity.
///
/// `None` when the cell does not exist or already shows this teacher.
pub fn set_teacher(
  data: &TimeTableData,
  day_id: u32,
  time_slot_id: u32,
  teacher: &str,
) -> Option<TimeTableData> {
  let entry = get_entry(data, day_id, time_slot_id)?;
  if notes::teacher(&entry.notes).unwrap_or_default() == teacher.trim() {
    return None;
  }

  Some(broadcast(data, entry, |entry| {
    entry.notes = notes::with_teacher(&entry.notes, teacher);
  }))
}

/// Sets the room of the cell's entity on every entry bound to that entity.
pub fn set_room(
  data: &TimeTableData,
  day_id: u32,
  time_slot_id: u32,
  room: &str,
) -> Option<TimeTableData> {
  let entry = get_entry(data, day_id, time_slot_id)?;
  if entry.room == room {
    return None;
  }

  Some(broadcast(data, entry, |entry| {
    entry.room = room.to_string();
  }))
}

/// Applies `edit` to all entries sharing the entity of `selected`, or to
/// `selected` alone when it is unassigned.
fn broadcast<F>(data: &TimeTableData, selected: &ScheduleEntry, mut edit: F) -> TimeTableData
where
  F: FnMut(&mut ScheduleEntry),
{
  let key = selected.key();
  let entity = selected.entity.clone();
  let mut data = data.clone();
  let mut touched = 0;

  for entry in data.schedule.iter_mut() {
    let matches = match &entity {
      Some(entity) => entry.entity.as_ref() == Some(entity),
      None => entry.key() == key,
    };

    if matches {
      edit(entry);
      touched += 1;
    }
  }

  debug!("Applied edit to {} entries of {:?}", touched, entity);
  data
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
  Start,
  End,
}

/// Moves one boundary of a slot and carries it over to the neighbour sharing it.
///
/// `None` if the slot is unknown or a slot would end before it starts.
pub fn set_slot_boundary(
  data: &TimeTableData,
  time_slot_id: u32,
  boundary: Boundary,
  time: ClockTime,
) -> Option<TimeTableData> {
  let slot = data.time_slots.iter().find(|slot| slot.id == time_slot_id)?;
  let old = match boundary {
    Boundary::Start => slot.start,
    Boundary::End => slot.end,
  };

  let mut data = data.clone();
  for slot in data.time_slots.iter_mut() {
    if slot.start == old {
      slot.start = time;
    }
    if slot.end == old {
      slot.end = time;
    }
  }

  if data.time_slots.iter().any(|slot| slot.start >= slot.end) {
    return None;
  }

  Some(data)
}

/// Appends a slot and creates an empty cell for it on every day.
pub fn add_time_slot(data: &TimeTableData, start: ClockTime, end: ClockTime) -> Option<TimeTableData> {
  if start >= end {
    return None;
  }

  let mut data = data.clone();
  let id = data.time_slots.iter().map(|slot| slot.id).max().unwrap_or(0) + 1;
  data.time_slots.push(TimeSlot { id, start, end });

  let mut entry_id = data.next_entry_id();
  for day in data.days.clone() {
    data.schedule.push(ScheduleEntry::empty(entry_id, day.id, id));
    entry_id += 1;
  }

  Some(data)
}

/// Drops a slot together with its cells.
pub fn remove_time_slot(data: &TimeTableData, time_slot_id: u32) -> Option<TimeTableData> {
  if !data.time_slots.iter().any(|slot| slot.id == time_slot_id) {
    return None;
  }

  let mut data = data.clone();
  data.time_slots.retain(|slot| slot.id != time_slot_id);
  data
    .schedule
    .retain(|entry| entry.time_slot_id != time_slot_id);

  Some(data)
}

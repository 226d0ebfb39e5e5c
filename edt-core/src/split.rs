use tracing::debug;

use crate::grid::get_entry;
use crate::model::{EntityRef, ScheduleEntry, Split, TimeTableData, WeekType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitState {
  Unsplit,
  WeekA,
  WeekB,
}

impl SplitState {
  pub fn of(entry: &ScheduleEntry) -> Self {
    match (entry.split.enabled, entry.week_type) {
      (true, Some(WeekType::B)) => SplitState::WeekB,
      (true, _) => SplitState::WeekA,
      (false, _) => SplitState::Unsplit,
    }
  }
}

fn with_entry<F>(data: &TimeTableData, day_id: u32, time_slot_id: u32, edit: F) -> TimeTableData
where
  F: FnOnce(&mut ScheduleEntry),
{
  let mut data = data.clone();
  if let Some(entry) = data
    .schedule
    .iter_mut()
    .find(|entry| entry.key() == (day_id, time_slot_id))
  {
    edit(entry);
  }
  data
}

/// Turns the A/B toggle of a cell on or off.
///
/// Enabling copies the current content into week B so neither week is left
/// empty. `None` when nothing changes: unknown or empty cell, or the toggle
/// already in the requested position.
pub fn set_split(
  data: &TimeTableData,
  day_id: u32,
  time_slot_id: u32,
  enabled: bool,
) -> Option<TimeTableData> {
  let entry = get_entry(data, day_id, time_slot_id)?;

  match (SplitState::of(entry), enabled) {
    (SplitState::Unsplit, true) => {
      let entity = entry.entity.clone()?;

      Some(with_entry(data, day_id, time_slot_id, |entry| {
        entry.week_type = Some(WeekType::A);
        entry.split = Split {
          enabled: true,
          entity_id_b: Some(entity),
          room_b: Some(entry.room.clone()),
          notes: Some(entry.notes.clone()),
        };
      }))
    }
    (SplitState::WeekA | SplitState::WeekB, false) => {
      Some(with_entry(data, day_id, time_slot_id, |entry| {
        entry.week_type = None;
        entry.split = Split::default();
      }))
    }
    _ => None,
  }
}

/// Relabels which week the primary content of a split cell belongs to.
pub fn set_week_type(
  data: &TimeTableData,
  day_id: u32,
  time_slot_id: u32,
  week_type: WeekType,
) -> Option<TimeTableData> {
  let entry = get_entry(data, day_id, time_slot_id)?;
  if !entry.split.enabled || entry.week_type == Some(week_type) {
    return None;
  }

  Some(with_entry(data, day_id, time_slot_id, |entry| {
    entry.week_type = Some(week_type);
  }))
}

/// Dropping an entity on a cell that already holds another one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
  pub day_id: u32,
  pub time_slot_id: u32,
  pub current: EntityRef,
  pub incoming: EntityRef,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Assignment {
  Applied(TimeTableData),
  Unchanged,
  /// The caller has to pick a [`Resolution`].
  Conflict(Conflict),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
  /// The incoming entity takes the whole cell; any split is discarded.
  Replace,
  /// Both entities share the cell on alternating weeks.
  Split {
    week_a: EntityRef,
    week_b: EntityRef,
  },
}

/// Binds `entity` to a cell. Never overwrites a different entity silently.
pub fn assign(
  data: &TimeTableData,
  day_id: u32,
  time_slot_id: u32,
  entity: EntityRef,
) -> Assignment {
  let entry = match get_entry(data, day_id, time_slot_id) {
    None => return Assignment::Unchanged,
    Some(entry) => entry,
  };

  match &entry.entity {
    None => Assignment::Applied(with_entry(data, day_id, time_slot_id, |entry| {
      entry.entity = Some(entity);
    })),
    Some(current) if *current == entity => Assignment::Unchanged,
    Some(current) => {
      debug!(
        "Cell ({}, {}) holds {}, asking before placing {}",
        day_id, time_slot_id, current, entity
      );

      Assignment::Conflict(Conflict {
        day_id,
        time_slot_id,
        current: current.clone(),
        incoming: entity,
      })
    }
  }
}

/// Applies the caller's decision for `conflict`.
///
/// `None` if the cell no longer holds the conflicting entity or the split
/// does not name exactly the two entities involved.
pub fn resolve(
  data: &TimeTableData,
  conflict: &Conflict,
  resolution: Resolution,
) -> Option<TimeTableData> {
  let entry = get_entry(data, conflict.day_id, conflict.time_slot_id)?;
  if entry.entity.as_ref() != Some(&conflict.current) {
    return None;
  }

  match resolution {
    Resolution::Replace => {
      let incoming = conflict.incoming.clone();

      Some(with_entry(data, conflict.day_id, conflict.time_slot_id, |entry| {
        entry.entity = Some(incoming);
        entry.week_type = None;
        entry.split = Split::default();
      }))
    }
    Resolution::Split { week_a, week_b } => {
      let involved = |entity: &EntityRef| *entity == conflict.current || *entity == conflict.incoming;
      if week_a == week_b || !involved(&week_a) || !involved(&week_b) {
        return None;
      }

      Some(with_entry(data, conflict.day_id, conflict.time_slot_id, |entry| {
        entry.entity = Some(week_a);
        entry.week_type = Some(WeekType::A);
        entry.split = Split {
          enabled: true,
          entity_id_b: Some(week_b),
          room_b: None,
          notes: None,
        };
      }))
    }
  }
}

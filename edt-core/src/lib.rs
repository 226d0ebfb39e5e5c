use tracing::debug;

pub use crate::catalog::{EntityPatch, NewEntity};
pub use crate::clock::ClockTime;
pub use crate::extract::{parse, ExtractionReport, PartialMetadata, PartialTimetable};
pub use crate::grid::{Boundary, EntryPatch};
pub use crate::model::{
  Day, DisplaySettings, Entity, EntityKind, EntityRef, Metadata, ScheduleEntry, Split,
  TimeSlot, TimeTableData, WeekType,
};
pub use crate::split::{Assignment, Conflict, Resolution, SplitState};
pub use crate::store::{
  ChangeEvent, ChangeScope, FileStore, KeyValueStore, MemoryStore, PersistenceGateway,
};

pub mod catalog;
pub mod clock;
pub mod extract;
pub mod grid;
pub mod import;
pub mod model;
pub mod notes;
pub mod split;
pub mod store;

/// Timetable operations that write their result through the gateway.
///
/// Every operation takes the current document, works on a copy and returns
/// the new document. When nothing changes the input is handed back and
/// nothing is saved.
pub struct Planner {
  gateway: PersistenceGateway,
}

impl Planner {
  pub fn new(gateway: PersistenceGateway) -> Self {
    Self { gateway }
  }

  pub fn gateway(&self) -> &PersistenceGateway {
    &self.gateway
  }

  pub fn load(&self) -> TimeTableData {
    self.gateway.load()
  }

  pub fn save(&self, data: &TimeTableData) -> bool {
    self.gateway.save(data)
  }

  pub fn reset(&self) -> TimeTableData {
    self.gateway.reset()
  }

  fn commit(&self, original: &TimeTableData, updated: Option<TimeTableData>) -> TimeTableData {
    match updated {
      Some(data) => {
        self.gateway.save(&data);
        data
      }
      None => {
        debug!("Nothing to change");
        original.clone()
      }
    }
  }

  pub fn update_entry(
    &self,
    data: &TimeTableData,
    day_id: u32,
    time_slot_id: u32,
    patch: EntryPatch,
  ) -> TimeTableData {
    self.commit(data, grid::update_entry(data, day_id, time_slot_id, patch))
  }

  /// Applies to every entry of the entity bound to the cell.
  pub fn set_teacher(
    &self,
    data: &TimeTableData,
    day_id: u32,
    time_slot_id: u32,
    teacher: &str,
  ) -> TimeTableData {
    self.commit(data, grid::set_teacher(data, day_id, time_slot_id, teacher))
  }

  /// Applies to every entry of the entity bound to the cell.
  pub fn set_room(
    &self,
    data: &TimeTableData,
    day_id: u32,
    time_slot_id: u32,
    room: &str,
  ) -> TimeTableData {
    self.commit(data, grid::set_room(data, day_id, time_slot_id, room))
  }

  pub fn set_split(
    &self,
    data: &TimeTableData,
    day_id: u32,
    time_slot_id: u32,
    enabled: bool,
  ) -> TimeTableData {
    self.commit(data, split::set_split(data, day_id, time_slot_id, enabled))
  }

  pub fn set_week_type(
    &self,
    data: &TimeTableData,
    day_id: u32,
    time_slot_id: u32,
    week_type: WeekType,
  ) -> TimeTableData {
    self.commit(
      data,
      split::set_week_type(data, day_id, time_slot_id, week_type),
    )
  }

  /// Saves applied assignments; conflicts are returned for the caller to decide.
  pub fn assign(
    &self,
    data: &TimeTableData,
    day_id: u32,
    time_slot_id: u32,
    entity: EntityRef,
  ) -> Assignment {
    let assignment = split::assign(data, day_id, time_slot_id, entity);
    if let Assignment::Applied(data) = &assignment {
      self.gateway.save(data);
    }
    assignment
  }

  pub fn resolve(
    &self,
    data: &TimeTableData,
    conflict: &Conflict,
    resolution: Resolution,
  ) -> TimeTableData {
    self.commit(data, split::resolve(data, conflict, resolution))
  }

  pub fn add_entity(
    &self,
    data: &TimeTableData,
    kind: EntityKind,
    new: NewEntity,
  ) -> anyhow::Result<(TimeTableData, EntityRef)> {
    let (data, entity) = catalog::add_entity(data, kind, new)?;
    self.gateway.save(&data);
    Ok((data, entity))
  }

  pub fn update_entity(
    &self,
    data: &TimeTableData,
    entity: &EntityRef,
    patch: EntityPatch,
  ) -> anyhow::Result<TimeTableData> {
    let updated = catalog::update_entity(data, entity, patch)?;
    Ok(self.commit(data, updated))
  }

  pub fn set_slot_boundary(
    &self,
    data: &TimeTableData,
    time_slot_id: u32,
    boundary: Boundary,
    time: ClockTime,
  ) -> TimeTableData {
    self.commit(
      data,
      grid::set_slot_boundary(data, time_slot_id, boundary, time),
    )
  }

  pub fn add_time_slot(&self, data: &TimeTableData, start: ClockTime, end: ClockTime) -> TimeTableData {
    self.commit(data, grid::add_time_slot(data, start, end))
  }

  pub fn remove_time_slot(&self, data: &TimeTableData, time_slot_id: u32) -> TimeTableData {
    self.commit(data, grid::remove_time_slot(data, time_slot_id))
  }

  pub fn import(&self, data: &TimeTableData, partial: PartialTimetable) -> TimeTableData {
    self.commit(data, Some(import::import(data, partial)))
  }
}

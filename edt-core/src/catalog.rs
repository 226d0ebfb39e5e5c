use anyhow::{anyhow, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::model::{Entity, EntityKind, EntityRef, TimeTableData};

static HEX_COLOR_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new("^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap());

/// Colors handed out round-robin to entities created without one.
pub const PALETTE: [&str; 15] = [
  "#4f46e5", "#0ea5e9", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#14b8a6",
  "#f97316", "#84cc16", "#06b6d4", "#a855f7", "#e11d48", "#22c55e", "#eab308",
];

pub const SUBJECT_ICON: &str = "📘";
pub const ACTIVITY_ICON: &str = "⭐";

pub fn palette_color(index: usize) -> &'static str {
  PALETTE[index % PALETTE.len()]
}

pub fn default_icon(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::Subject => SUBJECT_ICON,
    EntityKind::Activity => ACTIVITY_ICON,
  }
}

/// First three letters, upper-cased (`Mathématiques` -> `MAT`).
pub fn short_name(name: &str) -> String {
  let letters = name
    .chars()
    .filter(|c| c.is_alphanumeric())
    .take(3)
    .collect::<String>();

  if letters.is_empty() {
    return name.trim().to_string();
  }

  letters.to_uppercase()
}

pub fn is_hex_color(value: &str) -> bool {
  HEX_COLOR_REGEX.is_match(value)
}

/// A single visible glyph: one base character, optionally with variation
/// selectors, skin tone modifiers or zero-width joined parts.
pub fn is_single_glyph(value: &str) -> bool {
  if value.is_empty() || value.chars().any(char::is_whitespace) {
    return false;
  }

  let mut bases = 0;
  let mut joiners = 0;

  for c in value.chars() {
    match c {
      '\u{200d}' => joiners += 1,
      '\u{fe0e}' | '\u{fe0f}' | '\u{1f3fb}'..='\u{1f3ff}' => {}
      _ => bases += 1,
    }
  }

  bases >= 1 && bases == joiners + 1
}

/// Next free id of the given kind: highest numeric suffix plus one.
pub fn next_ref(entities: &[Entity], kind: EntityKind) -> EntityRef {
  let max = entities
    .iter()
    .filter_map(|entity| entity.id.number())
    .max()
    .unwrap_or(0);

  EntityRef::new(kind, max.max(entities.len() as u32) + 1)
}

pub fn get_entity<'a>(data: &'a TimeTableData, entity: &EntityRef) -> Option<&'a Entity> {
  data
    .entities(entity.kind())
    .iter()
    .find(|candidate| &candidate.id == entity)
}

/// Lookup by the string form of an id; unknown prefixes resolve to nothing.
pub fn get_entity_by_id<'a>(data: &'a TimeTableData, id: &str) -> Option<&'a Entity> {
  match id.parse::<EntityRef>() {
    Ok(entity) => get_entity(data, &entity),
    Err(err) => {
      debug!("Ignoring lookup of {:?}: {}", id, err);
      None
    }
  }
}

pub fn find_by_name<'a>(entities: &'a [Entity], name: &str) -> Option<&'a Entity> {
  let name = name.trim().to_lowercase();
  entities
    .iter()
    .find(|entity| entity.name.trim().to_lowercase() == name)
}

#[derive(Clone, Debug, Default)]
pub struct NewEntity {
  pub name: String,
  pub short_name: Option<String>,
  pub color: Option<String>,
  pub icon: Option<String>,
  pub teachers: Option<Vec<String>>,
}

impl NewEntity {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }
}

#[derive(Clone, Debug, Default)]
pub struct EntityPatch {
  pub name: Option<String>,
  pub short_name: Option<String>,
  pub color: Option<String>,
  pub icon: Option<String>,
  pub teachers: Option<Option<Vec<String>>>,
}

/// Builds an entity record, filling gaps with palette color and default icon.
pub fn mint(
  existing: &[Entity],
  kind: EntityKind,
  new: NewEntity,
) -> anyhow::Result<Entity> {
  let name = new.name.trim().to_string();
  if name.is_empty() {
    bail!("entity name must not be empty");
  }

  let color = new
    .color
    .unwrap_or_else(|| palette_color(existing.len()).to_string());
  if !is_hex_color(&color) {
    bail!("invalid color {color:?}");
  }

  let icon = new.icon.unwrap_or_else(|| default_icon(kind).to_string());
  if !is_single_glyph(&icon) {
    bail!("icon must be a single glyph, got {icon:?}");
  }

  Ok(Entity {
    id: next_ref(existing, kind),
    short_name: new.short_name.unwrap_or_else(|| short_name(&name)),
    name,
    color,
    icon,
    teachers: new.teachers,
  })
}

/// Appends a new subject or activity to a copy of the catalog.
pub fn add_entity(
  data: &TimeTableData,
  kind: EntityKind,
  new: NewEntity,
) -> anyhow::Result<(TimeTableData, EntityRef)> {
  let entity = mint(data.entities(kind), kind, new)?;
  let entity_ref = entity.id.clone();

  let mut data = data.clone();
  data.entities_mut(kind).push(entity);

  Ok((data, entity_ref))
}

/// Applies `patch` to a copy; `Ok(None)` when the entity does not exist.
pub fn update_entity(
  data: &TimeTableData,
  entity: &EntityRef,
  patch: EntityPatch,
) -> anyhow::Result<Option<TimeTableData>> {
  if let Some(color) = &patch.color {
    if !is_hex_color(color) {
      return Err(anyhow!("invalid color {color:?}"));
    }
  }
  if let Some(icon) = &patch.icon {
    if !is_single_glyph(icon) {
      return Err(anyhow!("icon must be a single glyph, got {icon:?}"));
    }
  }

  let mut data = data.clone();
  let target = match data
    .entities_mut(entity.kind())
    .iter_mut()
    .find(|candidate| &candidate.id == entity)
  {
    None => return Ok(None),
    Some(target) => target,
  };

  if let Some(name) = patch.name {
    let name = name.trim().to_string();
    if name.is_empty() {
      bail!("entity name must not be empty");
    }
    target.name = name;
  }
  if let Some(short_name) = patch.short_name {
    target.short_name = short_name;
  }
  if let Some(color) = patch.color {
    target.color = color;
  }
  if let Some(icon) = patch.icon {
    target.icon = icon;
  }
  if let Some(teachers) = patch.teachers {
    target.teachers = teachers;
  }

  Ok(Some(data))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn glyph_validation() {
    assert!(is_single_glyph("⭐"));
    assert!(is_single_glyph("✏️"));
    assert!(is_single_glyph("👩‍🔬"));
    assert!(is_single_glyph("A"));
    assert!(!is_single_glyph(""));
    assert!(!is_single_glyph("ab"));
    assert!(!is_single_glyph("⭐ "));
  }

  #[test]
  fn color_validation() {
    assert!(is_hex_color("#fff"));
    assert!(is_hex_color("#4F46E5"));
    assert!(!is_hex_color("4f46e5"));
    assert!(!is_hex_color("#12345"));
    assert!(!is_hex_color("red"));
  }

  #[test]
  fn ids_are_namespaced_and_increasing() -> anyhow::Result<()> {
    let data = TimeTableData::default();

    let (data, maths) = add_entity(&data, EntityKind::Subject, NewEntity::named("Maths"))?;
    let (data, french) = add_entity(&data, EntityKind::Subject, NewEntity::named("Français"))?;
    let (data, club) = add_entity(&data, EntityKind::Activity, NewEntity::named("Club échecs"))?;

    assert_eq!(maths.as_str(), "s-1");
    assert_eq!(french.as_str(), "s-2");
    assert_eq!(club.as_str(), "a-1");

    let maths = get_entity(&data, &maths).unwrap();
    assert_eq!(maths.color, PALETTE[0]);
    assert_eq!(maths.short_name, "MAT");
    assert_eq!(maths.icon, SUBJECT_ICON);
    assert_eq!(get_entity(&data, &french).unwrap().color, PALETTE[1]);
    assert_eq!(get_entity(&data, &club).unwrap().color, PALETTE[0]);

    assert_eq!(get_entity_by_id(&data, "a-1").unwrap().name, "Club échecs");
    assert!(get_entity_by_id(&data, "x-1").is_none());
    assert!(get_entity_by_id(&data, "s-9").is_none());

    Ok(())
  }

  #[test]
  fn rejects_invalid_entities() {
    let data = TimeTableData::default();

    let bad_color = NewEntity {
      color: Some("blue".to_string()),
      ..NewEntity::named("Maths")
    };
    assert!(add_entity(&data, EntityKind::Subject, bad_color).is_err());
    assert!(add_entity(&data, EntityKind::Subject, NewEntity::named("  ")).is_err());
  }

  #[test]
  fn update_keeps_id() -> anyhow::Result<()> {
    let (data, maths) = add_entity(
      &TimeTableData::default(),
      EntityKind::Subject,
      NewEntity::named("Maths"),
    )?;

    let patch = EntityPatch {
      name: Some("Mathématiques".to_string()),
      color: Some("#000000".to_string()),
      ..EntityPatch::default()
    };
    let updated = update_entity(&data, &maths, patch)?.unwrap();

    let entity = get_entity(&updated, &maths).unwrap();
    assert_eq!(entity.id, maths);
    assert_eq!(entity.name, "Mathématiques");
    assert_eq!(entity.color, "#000000");

    assert!(update_entity(&data, &EntityRef::subject(7), EntityPatch::default())?.is_none());
    Ok(())
  }
}

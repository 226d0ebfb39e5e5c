//! Teacher names live inside the free-text notes of an entry as a single
//! `Professeur: <name>` line placed first.

use once_cell::sync::Lazy;
use regex::Regex;

pub const TEACHER_MARKER: &str = "Professeur:";

static TEACHER_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"Professeur:\s*(.+?)(?:\n|$)").unwrap());

/// Teacher recorded in `notes`, if any.
pub fn teacher(notes: &str) -> Option<&str> {
  TEACHER_REGEX
    .captures(notes)
    .and_then(|captures| captures.get(1))
    .map(|value| value.as_str().trim())
    .filter(|value| !value.is_empty())
}

/// Notes without any teacher line.
pub fn without_teacher(notes: &str) -> String {
  TEACHER_REGEX
    .replace_all(notes, "")
    .trim_matches('\n')
    .to_string()
}

/// Replaces the teacher line of `notes`; an empty `teacher` removes it.
pub fn with_teacher(notes: &str, teacher: &str) -> String {
  let rest = without_teacher(notes);
  let teacher = teacher.trim();

  match (teacher.is_empty(), rest.is_empty()) {
    (true, _) => rest,
    (false, true) => format!("{TEACHER_MARKER} {teacher}"),
    (false, false) => format!("{TEACHER_MARKER} {teacher}\n{rest}"),
  }
}

use once_cell::sync::Lazy;
use regex::Regex;

/// Calendar order; a day's id is its position here plus one.
pub const WEEKDAYS: [&str; 7] = [
  "Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi", "Samedi", "Dimanche",
];

const WEEKDAY_ALIASES: [(&str, usize); 14] = [
  ("lundi", 0),
  ("mardi", 1),
  ("mercredi", 2),
  ("jeudi", 3),
  ("vendredi", 4),
  ("samedi", 5),
  ("dimanche", 6),
  ("monday", 0),
  ("tuesday", 1),
  ("wednesday", 2),
  ("thursday", 3),
  ("friday", 4),
  ("saturday", 5),
  ("sunday", 6),
];

pub const SCHOOL_KEYWORDS: [&str; 12] = [
  "école",
  "ecole",
  "collège",
  "college",
  "lycée",
  "lycee",
  "school",
  "université",
  "universite",
  "university",
  "institut",
  "academy",
];

static WEEKDAY_REGEX: Lazy<Regex> = Lazy::new(|| {
  let aliases = WEEKDAY_ALIASES
    .iter()
    .map(|(alias, _)| *alias)
    .collect::<Vec<&str>>();
  Regex::new(&format!(r"(?i)(?:{})", aliases.join("|"))).unwrap()
});

static SUBJECT_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(concat!(
    r"(?i)\b(?:",
    r"math\w*|fran[çc]ais|anglais|espagnol|allemand|italien|latin|grec|",
    r"histoire|g[ée]o(?:graphie)?|hist-g[ée]o|emc|physique\w*|chimie|svt|",
    r"sciences?|biologie|technologie|techno|eps|sport|musique|arts?\s+plastiques|",
    r"philo(?:sophie)?|ses|nsi|informatique|",
    r"english|spanish|german|history|geography|physics|chemistry|biology|music|",
    r"art|computing|science",
    r")\b"
  ))
  .unwrap()
});

/// Index into [`WEEKDAYS`] of every day named in `line`, ordered by position.
///
/// Names match anywhere in the line, glued words included, the same way
/// [`strip_weekdays`] removes them.
pub fn weekdays_in(line: &str) -> Vec<usize> {
  let mut days = Vec::new();
  for found in WEEKDAY_REGEX.find_iter(line) {
    let lower = found.as_str().to_lowercase();
    let index = WEEKDAY_ALIASES
      .iter()
      .find(|(alias, _)| *alias == lower)
      .map(|(_, index)| *index);
    if let Some(index) = index.filter(|index| !days.contains(index)) {
      days.push(index);
    }
  }
  days
}

/// `line` with every day name removed, case-insensitively.
pub fn strip_weekdays(line: &str) -> String {
  WEEKDAY_REGEX.replace_all(line, "").into_owned()
}

pub fn has_school_keyword(line: &str) -> bool {
  let lower = line.to_lowercase();
  SCHOOL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// The first subject keyword found in `line`.
pub fn subject_keyword(line: &str) -> Option<&str> {
  SUBJECT_REGEX.find(line).map(|keyword| keyword.as_str())
}

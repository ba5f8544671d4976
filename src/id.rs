//! Item identifiers.
//!
//! Task IDs look like `AB-07`, wait IDs like `AB-07W`. The prefix is two or
//! three letters, parsed in any case and canonicalized to uppercase; the
//! sequence number tolerates any amount of zero padding. Whether an ID names
//! a task or a wait is decided once, at parse time, and carried as
//! [`ItemKind`].
//!
//! Snapshots are read leniently: an ID that does not parse keeps its raw
//! text so the validator can report it instead of the load failing.
//! [`IdWidths`] renders IDs the way users see them, padded per project.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const WAIT_SUFFIX: char = 'W';
const MIN_ID_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Task,
    Wait,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Task => write!(f, "task"),
            ItemKind::Wait => write!(f, "wait"),
        }
    }
}

/// Identifier of a task or wait.
///
/// Ordering is by prefix, then sequence number, then kind, which gives the
/// numeric sort used when snapshots are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ItemId {
    prefix: String,
    seq: u32,
    kind: ItemKind,
    /// Stored text that did not parse.
    malformed: Option<String>,
}

impl ItemId {
    /// Build an ID without validating the prefix. The validator reports
    /// malformed IDs built this way.
    pub fn new(prefix: &str, seq: u32, kind: ItemKind) -> Self {
        Self {
            prefix: prefix.trim().to_ascii_uppercase(),
            seq,
            kind,
            malformed: None,
        }
    }

    /// Keep text that is not an ID. It never equals a parsed ID and never
    /// names an existing item.
    pub fn malformed(raw: &str) -> Self {
        Self {
            prefix: String::new(),
            seq: 0,
            kind: ItemKind::Task,
            malformed: Some(raw.trim().to_string()),
        }
    }

    pub fn task(prefix: &str, seq: u32) -> Self {
        Self::new(prefix, seq, ItemKind::Task)
    }

    pub fn wait(prefix: &str, seq: u32) -> Self {
        Self::new(prefix, seq, ItemKind::Wait)
    }

    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = || Error::InvalidId(trimmed.to_string());

        let (prefix, rest) = trimmed.split_once('-').ok_or_else(invalid)?;
        if !is_valid_prefix(prefix) {
            return Err(invalid());
        }

        let wait_digits = rest
            .strip_suffix(WAIT_SUFFIX)
            .or_else(|| rest.strip_suffix(WAIT_SUFFIX.to_ascii_lowercase()));
        let (digits, kind) = match wait_digits {
            Some(digits) => (digits, ItemKind::Wait),
            None => (rest, ItemKind::Task),
        };
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }
        let significant = digits.trim_start_matches('0');
        let seq: u32 = if significant.is_empty() {
            0
        } else {
            significant.parse().map_err(|_| invalid())?
        };
        if seq == 0 {
            return Err(invalid());
        }

        Ok(Self::new(prefix, seq, kind))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn is_task(&self) -> bool {
        self.kind == ItemKind::Task
    }

    pub fn is_wait(&self) -> bool {
        self.kind == ItemKind::Wait
    }

    /// True when the ID would survive a format/parse round trip.
    pub fn is_well_formed(&self) -> bool {
        self.malformed.is_none() && is_valid_prefix(&self.prefix) && self.seq > 0
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed.is_some()
    }

    /// Same sequence and kind under another project prefix.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self::new(prefix, self.seq, self.kind)
    }

    /// Render with the sequence zero-padded to `width` digits.
    /// Malformed IDs render as their raw text.
    pub fn format(&self, width: usize) -> String {
        if let Some(raw) = &self.malformed {
            return raw.clone();
        }
        let width = width.max(MIN_ID_WIDTH);
        match self.kind {
            ItemKind::Task => format!("{}-{:0width$}", self.prefix, self.seq),
            ItemKind::Wait => format!("{}-{:0width$}{}", self.prefix, self.seq, WAIT_SUFFIX),
        }
    }
}

/// Canonical form, as written to snapshots and logs. Users see
/// [`IdWidths::display`] instead.
impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(MIN_ID_WIDTH))
    }
}

impl FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_else(|_| Self::malformed(&value))
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.to_string()
    }
}

/// Two or three ASCII letters.
pub fn is_valid_prefix(prefix: &str) -> bool {
    (2..=3).contains(&prefix.len()) && prefix.chars().all(|ch| ch.is_ascii_alphabetic())
}

/// Canonical (uppercase) form of a project prefix.
pub fn normalize_prefix(prefix: &str) -> Result<String> {
    let trimmed = prefix.trim();
    if !is_valid_prefix(trimmed) {
        return Err(Error::InvalidArgument(format!(
            "invalid project prefix '{trimmed}' (expected 2-3 letters)"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Width of the sequence field given the highest allocated sequence number.
pub fn id_width(highest_seq: u32) -> usize {
    highest_seq.to_string().len().max(MIN_ID_WIDTH)
}

/// Display width of each known project. Unknown prefixes use the minimum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdWidths {
    widths: BTreeMap<String, usize>,
}

impl IdWidths {
    pub fn set(&mut self, prefix: &str, width: usize) {
        self.widths.insert(prefix.to_string(), width);
    }

    pub fn width(&self, prefix: &str) -> usize {
        self.widths.get(prefix).copied().unwrap_or(MIN_ID_WIDTH)
    }

    pub fn display(&self, id: &ItemId) -> String {
        id.format(self.width(id.prefix()))
    }

    pub fn display_all(&self, ids: &[ItemId]) -> Vec<String> {
        ids.iter().map(|id| self.display(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tasks_and_waits() {
        let task = ItemId::parse("ab-7").expect("task");
        assert_eq!(task.prefix(), "AB");
        assert_eq!(task.seq(), 7);
        assert!(task.is_task());

        let wait = ItemId::parse("Abc-0012w").expect("wait");
        assert_eq!(wait.prefix(), "ABC");
        assert_eq!(wait.seq(), 12);
        assert!(wait.is_wait());
    }

    #[test]
    fn comparison_ignores_case_and_padding() {
        assert_eq!(
            ItemId::parse("xy-001").expect("id"),
            ItemId::parse("XY-1").expect("id")
        );
        assert_ne!(
            ItemId::parse("XY-1").expect("id"),
            ItemId::parse("XY-1W").expect("id")
        );
    }

    #[test]
    fn rejects_malformed_ids() {
        for input in ["", "A-01", "ABCD-01", "AB01", "AB-", "AB-W", "AB-0", "AB-1X", "A1-01"] {
            let err = ItemId::parse(input).expect_err(input);
            assert!(matches!(err, Error::InvalidId(_)), "{input}");
        }
    }

    #[test]
    fn formats_with_minimum_width() {
        let id = ItemId::task("ab", 3);
        assert_eq!(id.to_string(), "AB-03");
        assert_eq!(id.format(3), "AB-003");
        assert_eq!(ItemId::wait("ab", 123).format(2), "AB-123W");
    }

    #[test]
    fn width_tracks_highest_sequence() {
        assert_eq!(id_width(0), 2);
        assert_eq!(id_width(9), 2);
        assert_eq!(id_width(99), 2);
        assert_eq!(id_width(100), 3);
        assert_eq!(id_width(12345), 5);
    }

    #[test]
    fn serde_uses_string_form() {
        let id = ItemId::wait("pr", 4);
        let yaml = serde_yaml::to_string(&id).expect("serialize");
        assert_eq!(yaml.trim(), "PR-04W");
        let back: ItemId = serde_yaml::from_str("pr-0004w").expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn unparseable_stored_ids_keep_their_text() {
        let ids: Vec<ItemId> = serde_yaml::from_str("[AB-1X, ab-3]").expect("deserialize");
        assert!(ids[0].is_malformed());
        assert!(!ids[0].is_well_formed());
        assert_eq!(ids[0].to_string(), "AB-1X");
        assert_eq!(ids[1], ItemId::task("AB", 3));
        assert_ne!(ids[0], ItemId::task("AB", 1));

        let yaml = serde_yaml::to_string(&ids).expect("serialize");
        assert!(yaml.contains("AB-1X"));
    }

    #[test]
    fn widths_pad_per_project() {
        let mut widths = IdWidths::default();
        widths.set("AB", 3);
        assert_eq!(widths.display(&ItemId::task("AB", 5)), "AB-005");
        assert_eq!(widths.display(&ItemId::wait("CD", 5)), "CD-05W");
        assert_eq!(
            widths.display_all(&[ItemId::task("AB", 12), ItemId::malformed("??")]),
            vec!["AB-012".to_string(), "??".to_string()]
        );
    }

    #[test]
    fn normalize_prefix_validates() {
        assert_eq!(normalize_prefix(" ab ").expect("prefix"), "AB");
        assert!(normalize_prefix("a").is_err());
        assert!(normalize_prefix("ab1").is_err());
    }
}

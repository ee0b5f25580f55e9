//! Attribute-level differences between two snapshots.

use std::fmt;

use super::snapshot::{AttributeValue, Snapshot};

/// One attribute that differs between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// Attribute name.
    pub field: String,
    /// Value before, `None` if the attribute was added.
    pub before: Option<AttributeValue>,
    /// Value after, `None` if the attribute was removed.
    pub after: Option<AttributeValue>,
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => write!(f, "{}: {before} -> {after}", self.field),
            (Some(before), None) => write!(f, "{}: {before} -> (removed)", self.field),
            (None, Some(after)) => write!(f, "{}: (added) -> {after}", self.field),
            (None, None) => write!(f, "{}: (unchanged)", self.field),
        }
    }
}

impl Snapshot {
    /// List the attributes that differ from `after`, in name order.
    ///
    /// Modified and removed attributes come from `self`; attributes present
    /// only in `after` are reported as added.
    #[must_use]
    pub fn diff(&self, after: &Snapshot) -> Vec<AttributeChange> {
        let mut changes: Vec<AttributeChange> = self
            .iter()
            .filter_map(|(field, before)| match after.get(field) {
                Some(value) if value == before => None,
                other => Some(AttributeChange {
                    field: field.to_string(),
                    before: Some(before.clone()),
                    after: other.cloned(),
                }),
            })
            .collect();

        changes.extend(
            after
                .iter()
                .filter(|(field, _)| !self.contains(field))
                .map(|(field, value)| AttributeChange {
                    field: field.to_string(),
                    before: None,
                    after: Some(value.clone()),
                }),
        );

        changes.sort_by(|a, b| a.field.cmp(&b.field));
        changes
    }
}

/// Render a one-line summary of the changes, or `None` if there are none.
#[must_use]
pub fn summarize_changes(changes: &[AttributeChange]) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    Some(
        changes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    )
}

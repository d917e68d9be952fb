//! Change detection over successive announcement field maps.
//!
//! The tracker decides when a packet is worth a detailed audit-log entry.
//! It never gates relaying: routine repeats are still forwarded, they just
//! do not produce verbose output.

use crate::announcement::FieldMap;
use std::collections::BTreeMap;

/// One differing field between the previous and current announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub key: String,
    /// Previous value; `None` when the key was added.
    pub old: Option<String>,
    /// Current value; `None` when the key was removed.
    pub new: Option<String>,
}

/// Classification of one observed announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// First announcement ever seen by this tracker.
    Initial,
    /// At least one field was added, removed, or changed value.
    Changed(Vec<FieldChange>),
    /// Identical to the previous announcement.
    Unchanged,
}

/// Tracks the last-seen field map in order-independent canonical form.
///
/// Comparison is plain string equality per field. Two textually different
/// renderings of the same number count as a change; redundant detail logs
/// are preferred over missed state transitions.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: Option<BTreeMap<String, String>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies the given fields against the stored state.
    ///
    /// `Initial` and `Changed` update the stored state; `Unchanged` is a
    /// pure read.
    pub fn observe(&mut self, fields: &FieldMap) -> ChangeKind {
        let current = fields.canonical();

        let Some(last) = &self.last else {
            self.last = Some(current);
            return ChangeKind::Initial;
        };

        let diff = Self::diff(last, &current);
        if diff.is_empty() {
            return ChangeKind::Unchanged;
        }
        self.last = Some(current);
        ChangeKind::Changed(diff)
    }

    /// Full key-set comparison: changed values, added keys, removed keys.
    fn diff(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        for (key, new_value) in new {
            match old.get(key) {
                Some(old_value) if old_value == new_value => {}
                Some(old_value) => changes.push(FieldChange {
                    key: key.clone(),
                    old: Some(old_value.clone()),
                    new: Some(new_value.clone()),
                }),
                None => changes.push(FieldChange {
                    key: key.clone(),
                    old: None,
                    new: Some(new_value.clone()),
                }),
            }
        }

        for (key, old_value) in old {
            if !new.contains_key(key) {
                changes.push(FieldChange {
                    key: key.clone(),
                    old: Some(old_value.clone()),
                    new: None,
                });
            }
        }

        changes
    }
}

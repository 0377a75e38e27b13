//! Field-level schema diffing

use serde::{Deserialize, Serialize};

use crate::infer::{DataType, FieldMap};

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Field present in the very first snapshot
    Create,
    Add,
    Remove,
    Modify,
}

/// One structural delta between two field maps
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub action: ChangeAction,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_type: Option<DataType>,
}

impl ChangeRecord {
    pub fn create(field: impl Into<String>) -> Self {
        Self {
            action: ChangeAction::Create,
            field: field.into(),
            old_type: None,
            new_type: None,
        }
    }

    pub fn add(field: impl Into<String>, new_type: DataType) -> Self {
        Self {
            action: ChangeAction::Add,
            field: field.into(),
            old_type: None,
            new_type: Some(new_type),
        }
    }

    pub fn remove(field: impl Into<String>, old_type: DataType) -> Self {
        Self {
            action: ChangeAction::Remove,
            field: field.into(),
            old_type: Some(old_type),
            new_type: None,
        }
    }

    pub fn modify(field: impl Into<String>, old_type: DataType, new_type: DataType) -> Self {
        Self {
            action: ChangeAction::Modify,
            field: field.into(),
            old_type: Some(old_type),
            new_type: Some(new_type),
        }
    }
}

/// Compute the changes that turn `old` into `new`.
///
/// Emits adds, then removes, then type modifications, each in field-name
/// order. Unchanged fields never appear. Identical maps yield no changes.
pub fn diff(old: &FieldMap, new: &FieldMap) -> Vec<ChangeRecord> {
    let added = new
        .iter()
        .filter(|(name, _)| !old.contains_key(*name))
        .map(|(name, tag)| ChangeRecord::add(name.as_str(), *tag));

    let removed = old
        .iter()
        .filter(|(name, _)| !new.contains_key(*name))
        .map(|(name, tag)| ChangeRecord::remove(name.as_str(), *tag));

    let modified = old.iter().filter_map(|(name, old_tag)| {
        new.get(name)
            .filter(|new_tag| *new_tag != old_tag)
            .map(|new_tag| ChangeRecord::modify(name.as_str(), *old_tag, *new_tag))
    });

    added.chain(removed).chain(modified).collect()
}

/// Change list for the first snapshot of a registry: every field is created
pub fn creations(fields: &FieldMap) -> Vec<ChangeRecord> {
    fields.keys().map(|name| ChangeRecord::create(name.as_str())).collect()
}

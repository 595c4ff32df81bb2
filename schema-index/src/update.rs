//! Index entry updates.

use crate::values::Value;

/// Kind of an index update, as stored in the update log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UpdateMode {
    Added = 0,
    Changed = 1,
    Removed = 2,
}

impl TryFrom<u8> for UpdateMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Added),
            1 => Ok(Self::Changed),
            2 => Ok(Self::Removed),
            _ => Err(value),
        }
    }
}

/// A change to the indexed values of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEntryUpdate {
    Added {
        entity_id: i64,
        values: Vec<Value>,
    },
    Changed {
        entity_id: i64,
        before: Vec<Value>,
        after: Vec<Value>,
    },
    Removed {
        entity_id: i64,
        values: Vec<Value>,
    },
}

impl IndexEntryUpdate {
    #[must_use]
    pub const fn added(entity_id: i64, values: Vec<Value>) -> Self {
        Self::Added { entity_id, values }
    }

    #[must_use]
    pub const fn changed(entity_id: i64, before: Vec<Value>, after: Vec<Value>) -> Self {
        Self::Changed {
            entity_id,
            before,
            after,
        }
    }

    #[must_use]
    pub const fn removed(entity_id: i64, values: Vec<Value>) -> Self {
        Self::Removed { entity_id, values }
    }

    #[must_use]
    pub const fn entity_id(&self) -> i64 {
        match self {
            Self::Added { entity_id, .. }
            | Self::Changed { entity_id, .. }
            | Self::Removed { entity_id, .. } => *entity_id,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> UpdateMode {
        match self {
            Self::Added { .. } => UpdateMode::Added,
            Self::Changed { .. } => UpdateMode::Changed,
            Self::Removed { .. } => UpdateMode::Removed,
        }
    }

    /// Values the entity has after the update, if it is still indexed.
    #[must_use]
    pub fn values(&self) -> Option<&[Value]> {
        match self {
            Self::Added { values, .. } => Some(values),
            Self::Changed { after, .. } => Some(after),
            Self::Removed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_mode_conversion() {
        for mode in [UpdateMode::Added, UpdateMode::Changed, UpdateMode::Removed] {
            assert_eq!(UpdateMode::try_from(mode as u8), Ok(mode));
        }
        assert_eq!(UpdateMode::try_from(3), Err(3));
    }

    #[test]
    fn test_update_accessors() {
        let update = IndexEntryUpdate::changed(4, vec![Value::Int(1)], vec![Value::Int(2)]);
        assert_eq!(update.entity_id(), 4);
        assert_eq!(update.mode(), UpdateMode::Changed);
        assert_eq!(update.values(), Some(&[Value::Int(2)][..]));
        assert_eq!(IndexEntryUpdate::removed(1, vec![]).values(), None);
    }
}

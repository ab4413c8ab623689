//! Lifecycle hooks of a [`crate::CommonDao`].

use crate::entity::{convert, DaoModel};
use polydb_core::{generate_id, DbResult, Row, ValidationError};
use std::marker::PhantomData;

/// Result of a hook that may veto a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome<T> {
    /// Continue with this value.
    Keep(T),
    /// Drop the row.
    Drop,
}

impl<T> HookOutcome<T> {
    /// Returns the kept value, if any.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Keep(v) => Some(v),
            Self::Drop => None,
        }
    }
}

/// Hooks applied by the dao pipelines.
///
/// Every method has a default, so implementors override only what they
/// need. Read pipeline: `after_load`, `anonymize` (when requested),
/// `before_dbm_to_bm`, validation. Write pipeline: id and timestamps,
/// validation, `before_bm_to_dbm`, `before_save`.
pub trait CommonDaoHooks<BM: DaoModel, DBM: DaoModel>: Send + Sync {
    /// Derives an id from the model. Tried before [`Self::create_random_id`].
    fn create_natural_id(&self, bm: &BM) -> Option<String> {
        let _ = bm;
        None
    }

    /// Generates a random id.
    fn create_random_id(&self) -> String {
        generate_id()
    }

    /// Fields encoded in a natural id, merged into models built by
    /// `create`.
    fn parse_natural_id(&self, id: &str) -> Row {
        let _ = id;
        Row::new()
    }

    /// Runs on every loaded row. `Drop` hides the row from the caller.
    fn after_load(&self, dbm: DBM) -> HookOutcome<DBM> {
        HookOutcome::Keep(dbm)
    }

    /// Strips personal data from a loaded row.
    fn anonymize(&self, dbm: DBM) -> DBM {
        dbm
    }

    /// Converts a loaded row to the business model.
    fn before_dbm_to_bm(&self, dbm: DBM) -> DbResult<BM> {
        convert(&dbm)
    }

    /// Converts a business model to the stored shape.
    fn before_bm_to_dbm(&self, bm: BM) -> DbResult<DBM> {
        convert(&bm)
    }

    /// Runs before a row is saved. `Drop` skips the save.
    fn before_save(&self, dbm: DBM) -> HookOutcome<DBM> {
        HookOutcome::Keep(dbm)
    }

    /// Transforms a validation error. `None` suppresses it and the
    /// unvalidated value is used.
    fn on_validation_error(&self, err: ValidationError) -> Option<ValidationError> {
        Some(err)
    }
}

/// Hooks that do nothing beyond the defaults.
pub struct DefaultHooks<BM, DBM>(PhantomData<fn() -> (BM, DBM)>);

impl<BM, DBM> DefaultHooks<BM, DBM> {
    /// Creates the default hooks.
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<BM, DBM> Default for DefaultHooks<BM, DBM> {
    fn default() -> Self {
        Self::new()
    }
}

impl<BM: DaoModel, DBM: DaoModel> CommonDaoHooks<BM, DBM> for DefaultHooks<BM, DBM> {}

#[cfg(test)]
mod tests {
    use super::*;
    use polydb_core::row_from_value;
    use serde_json::json;

    #[test]
    fn defaults_pass_through() {
        let hooks = DefaultHooks::<Row, Row>::new();
        let row = row_from_value(json!({"id": "a", "k": 1})).unwrap();

        assert_eq!(hooks.after_load(row.clone()), HookOutcome::Keep(row.clone()));
        assert_eq!(hooks.before_save(row.clone()).into_option(), Some(row.clone()));
        assert_eq!(hooks.before_dbm_to_bm(row.clone()).unwrap(), row);
        assert_eq!(hooks.create_natural_id(&row), None);
        assert_eq!(hooks.create_random_id().len(), 32);
        assert!(hooks.parse_natural_id("a").is_empty());
    }

    #[test]
    fn drop_has_no_value() {
        assert_eq!(HookOutcome::<i32>::Drop.into_option(), None);
    }
}

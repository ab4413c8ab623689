//! Dao configuration and per-call options.

use crate::entity::DaoModel;
use crate::hooks::{CommonDaoHooks, DefaultHooks};
use polydb_core::{
    CommonDB, ErrorMode, PipelineOptions, ReadOptions, SaveMethod, ValidationSchema,
};
use std::sync::Arc;

/// Configuration of a [`crate::CommonDao`].
///
/// # Example
///
/// ```rust
/// use polydb_core::Row;
/// use polydb_dao::CommonDaoCfg;
/// use polydb_storage::InMemoryDB;
/// use std::sync::Arc;
///
/// let cfg = CommonDaoCfg::<Row, Row>::new(Arc::new(InMemoryDB::new()), "users")
///     .immutable(true)
///     .redacted_fields(["password"]);
/// assert!(cfg.immutable);
/// ```
pub struct CommonDaoCfg<BM: DaoModel, DBM: DaoModel = BM> {
    /// The adapter the table lives in.
    pub db: Arc<dyn CommonDB>,
    /// Table name.
    pub table: String,
    /// Schema the business model is validated against.
    pub validation: Option<Arc<dyn ValidationSchema<BM>>>,
    /// Lifecycle hooks.
    pub hooks: Arc<dyn CommonDaoHooks<BM, DBM>>,
    /// Rows may be inserted but never overwritten, patched or deleted.
    pub immutable: bool,
    /// Every write is rejected.
    pub read_only: bool,
    /// Stamp `created` on save.
    pub use_created_property: bool,
    /// Stamp `updated` on save.
    pub use_updated_property: bool,
    /// Leave id assignment to the adapter.
    pub assign_generated_ids: bool,
    /// Fields whose values are redacted from validation errors.
    pub redacted_fields: Vec<String>,
    /// Log when an operation starts.
    pub log_started: bool,
    /// Run `patch_by_id` as read-modify-write inside a transaction when the
    /// adapter supports transactions.
    pub patch_in_transaction: bool,
}

impl<BM: DaoModel, DBM: DaoModel> CommonDaoCfg<BM, DBM> {
    /// Creates a configuration with default hooks and no validation.
    #[must_use]
    pub fn new(db: Arc<dyn CommonDB>, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
            validation: None,
            hooks: Arc::new(DefaultHooks::<BM, DBM>::new()),
            immutable: false,
            read_only: false,
            use_created_property: true,
            use_updated_property: true,
            assign_generated_ids: false,
            redacted_fields: Vec::new(),
            log_started: false,
            patch_in_transaction: false,
        }
    }

    /// Sets the validation schema.
    #[must_use]
    pub fn validation(mut self, schema: Arc<dyn ValidationSchema<BM>>) -> Self {
        self.validation = Some(schema);
        self
    }

    /// Sets the hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn CommonDaoHooks<BM, DBM>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets immutability.
    #[must_use]
    pub fn immutable(mut self, value: bool) -> Self {
        self.immutable = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether `created` is stamped.
    #[must_use]
    pub fn use_created_property(mut self, value: bool) -> Self {
        self.use_created_property = value;
        self
    }

    /// Sets whether `updated` is stamped.
    #[must_use]
    pub fn use_updated_property(mut self, value: bool) -> Self {
        self.use_updated_property = value;
        self
    }

    /// Sets whether the adapter assigns ids.
    #[must_use]
    pub fn assign_generated_ids(mut self, value: bool) -> Self {
        self.assign_generated_ids = value;
        self
    }

    /// Sets the redacted fields.
    #[must_use]
    pub fn redacted_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.redacted_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets start logging.
    #[must_use]
    pub fn log_started(mut self, value: bool) -> Self {
        self.log_started = value;
        self
    }

    /// Sets transactional patching.
    #[must_use]
    pub fn patch_in_transaction(mut self, value: bool) -> Self {
        self.patch_in_transaction = value;
        self
    }
}

/// Options of dao reads.
#[derive(Debug, Clone, Default)]
pub struct DaoReadOptions {
    /// Skip validation of loaded models.
    pub skip_validation: bool,
    /// Apply the `anonymize` hook.
    pub anonymize: bool,
    /// Time-machine read timestamp.
    pub read_at: Option<i64>,
}

impl DaoReadOptions {
    pub(crate) fn db(&self) -> ReadOptions {
        ReadOptions {
            read_at: self.read_at,
        }
    }

    pub(crate) fn unvalidated() -> Self {
        Self {
            skip_validation: true,
            ..Self::default()
        }
    }
}

/// Options of dao saves.
#[derive(Debug, Clone, Default)]
pub struct DaoSaveOptions {
    /// Skip validation before saving.
    pub skip_validation: bool,
    /// Save method. Immutable tables always insert.
    pub save_method: SaveMethod,
    /// Keep an existing `updated` instead of stamping now.
    pub preserve_updated: bool,
    /// Bypass immutability.
    pub allow_mutability: bool,
}

/// Options of `patch_by_id` and `patch`.
#[derive(Debug, Clone, Default)]
pub struct DaoPatchOptions {
    /// Skip validation before saving.
    pub skip_validation: bool,
    /// Bypass immutability.
    pub allow_mutability: bool,
    /// Patch the caller's model without loading the stored row.
    pub skip_db_read: bool,
    /// Create the row when it does not exist (`patch_by_id` only).
    pub create_if_missing: bool,
}

impl DaoPatchOptions {
    pub(crate) fn save(&self) -> DaoSaveOptions {
        DaoSaveOptions {
            skip_validation: self.skip_validation,
            allow_mutability: self.allow_mutability,
            ..DaoSaveOptions::default()
        }
    }
}

/// Options of dao deletes.
#[derive(Debug, Clone)]
pub struct DaoDeleteOptions {
    /// Bypass immutability.
    pub allow_mutability: bool,
    /// Stream matching ids and delete them in chunks of this size
    /// (0 deletes with one query).
    pub chunk_size: usize,
    /// Chunk deletes in flight.
    pub chunk_concurrency: usize,
    /// Error policy of chunked deletes.
    pub error_mode: ErrorMode,
}

impl Default for DaoDeleteOptions {
    fn default() -> Self {
        Self {
            allow_mutability: false,
            chunk_size: 0,
            chunk_concurrency: 8,
            error_mode: ErrorMode::default(),
        }
    }
}

/// Options of dao streaming operations.
#[derive(Debug, Clone)]
pub struct DaoStreamOptions {
    /// Skip validation of streamed models.
    pub skip_validation: bool,
    /// Apply the `anonymize` hook.
    pub anonymize: bool,
    /// Callbacks in flight.
    pub concurrency: usize,
    /// Rows per batch for `stream_save`.
    pub chunk_size: usize,
    /// Process at most N rows (0 is unlimited).
    pub limit: u64,
    /// Log progress every N rows (0 disables).
    pub log_every: u64,
    /// Error policy.
    pub error_mode: ErrorMode,
}

impl Default for DaoStreamOptions {
    fn default() -> Self {
        Self {
            skip_validation: false,
            anonymize: false,
            concurrency: 16,
            chunk_size: 500,
            limit: 0,
            log_every: 0,
            error_mode: ErrorMode::default(),
        }
    }
}

impl DaoStreamOptions {
    pub(crate) fn read(&self) -> DaoReadOptions {
        DaoReadOptions {
            skip_validation: self.skip_validation,
            anonymize: self.anonymize,
            read_at: None,
        }
    }

    pub(crate) fn pipeline(&self, name: String) -> PipelineOptions {
        PipelineOptions::named(name)
            .concurrency(self.concurrency)
            .chunk_size(self.chunk_size)
            .limit(self.limit)
            .log_every(self.log_every)
            .error_mode(self.error_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydb_core::Row;
    use polydb_storage::InMemoryDB;

    #[test]
    fn default_config() {
        let cfg = CommonDaoCfg::<Row>::new(Arc::new(InMemoryDB::new()), "t");
        assert_eq!(cfg.table, "t");
        assert!(cfg.use_created_property);
        assert!(cfg.use_updated_property);
        assert!(!cfg.immutable);
        assert!(!cfg.read_only);
        assert!(cfg.validation.is_none());
    }

    #[test]
    fn builder_pattern() {
        let cfg = CommonDaoCfg::<Row>::new(Arc::new(InMemoryDB::new()), "t")
            .read_only(true)
            .use_updated_property(false)
            .redacted_fields(["password", "ssn"])
            .patch_in_transaction(true);
        assert!(cfg.read_only);
        assert!(!cfg.use_updated_property);
        assert_eq!(cfg.redacted_fields, vec!["password", "ssn"]);
        assert!(cfg.patch_in_transaction);
    }

    #[test]
    fn stream_options_map_to_pipeline() {
        let opt = DaoStreamOptions {
            chunk_size: 10,
            error_mode: ErrorMode::Suppress,
            ..DaoStreamOptions::default()
        };
        let p = opt.pipeline("t.stream".to_string());
        assert_eq!(p.chunk_size, 10);
        assert_eq!(p.error_mode, ErrorMode::Suppress);
        assert_eq!(p.name, "t.stream");
    }
}

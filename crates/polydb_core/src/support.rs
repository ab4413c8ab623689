//! Capability manifest.

use crate::error::{DbError, DbResult};

/// A single capability of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Any query support.
    Queries,
    /// Relational filters.
    DbQueryFilter,
    /// `in` filters.
    DbQueryFilterIn,
    /// Ordering.
    DbQueryOrder,
    /// Field selection.
    DbQuerySelectFields,
    /// `SaveMethod::Insert`.
    InsertSaveMethod,
    /// `SaveMethod::Update`.
    UpdateSaveMethod,
    /// `patch_by_query`.
    PatchByQuery,
    /// `increment_batch`.
    Increment,
    /// `create_table`.
    CreateTable,
    /// `get_table_schema`.
    TableSchemas,
    /// `stream_query`.
    Streaming,
    /// Binary payloads (arrays of bytes) round-trip.
    BufferValues,
    /// `null` values round-trip.
    NullValues,
    /// Nested objects round-trip.
    ObjectValues,
    /// Transactions.
    Transactions,
    /// `ReadOptions::read_at`.
    TimeMachine,
}

/// The boolean feature flags an adapter publishes.
///
/// Callers check these before invoking capability-gated operations. Calling
/// an unsupported operation is not part of the contract; adapters in this
/// workspace answer with [`DbError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CommonDBSupport {
    pub queries: bool,
    pub db_query_filter: bool,
    pub db_query_filter_in: bool,
    pub db_query_order: bool,
    pub db_query_select_fields: bool,
    pub insert_save_method: bool,
    pub update_save_method: bool,
    pub patch_by_query: bool,
    pub increment: bool,
    pub create_table: bool,
    pub table_schemas: bool,
    pub streaming: bool,
    pub buffer_values: bool,
    pub null_values: bool,
    pub object_values: bool,
    pub transactions: bool,
    pub time_machine: bool,
}

impl CommonDBSupport {
    /// Everything except time-machine reads.
    pub const FULL: Self = Self {
        queries: true,
        db_query_filter: true,
        db_query_filter_in: true,
        db_query_order: true,
        db_query_select_fields: true,
        insert_save_method: true,
        update_save_method: true,
        patch_by_query: true,
        increment: true,
        create_table: true,
        table_schemas: true,
        streaming: true,
        buffer_values: true,
        null_values: true,
        object_values: true,
        transactions: true,
        time_machine: false,
    };

    /// Nothing at all.
    pub const NONE: Self = Self {
        queries: false,
        db_query_filter: false,
        db_query_filter_in: false,
        db_query_order: false,
        db_query_select_fields: false,
        insert_save_method: false,
        update_save_method: false,
        patch_by_query: false,
        increment: false,
        create_table: false,
        table_schemas: false,
        streaming: false,
        buffer_values: false,
        null_values: false,
        object_values: false,
        transactions: false,
        time_machine: false,
    };

    /// Returns whether `capability` is supported.
    #[must_use]
    pub const fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Queries => self.queries,
            Capability::DbQueryFilter => self.db_query_filter,
            Capability::DbQueryFilterIn => self.db_query_filter_in,
            Capability::DbQueryOrder => self.db_query_order,
            Capability::DbQuerySelectFields => self.db_query_select_fields,
            Capability::InsertSaveMethod => self.insert_save_method,
            Capability::UpdateSaveMethod => self.update_save_method,
            Capability::PatchByQuery => self.patch_by_query,
            Capability::Increment => self.increment,
            Capability::CreateTable => self.create_table,
            Capability::TableSchemas => self.table_schemas,
            Capability::Streaming => self.streaming,
            Capability::BufferValues => self.buffer_values,
            Capability::NullValues => self.null_values,
            Capability::ObjectValues => self.object_values,
            Capability::Transactions => self.transactions,
            Capability::TimeMachine => self.time_machine,
        }
    }

    /// Returns a copy with `capability` switched on or off.
    #[must_use]
    pub fn with(mut self, capability: Capability, enabled: bool) -> Self {
        match capability {
            Capability::Queries => self.queries = enabled,
            Capability::DbQueryFilter => self.db_query_filter = enabled,
            Capability::DbQueryFilterIn => self.db_query_filter_in = enabled,
            Capability::DbQueryOrder => self.db_query_order = enabled,
            Capability::DbQuerySelectFields => self.db_query_select_fields = enabled,
            Capability::InsertSaveMethod => self.insert_save_method = enabled,
            Capability::UpdateSaveMethod => self.update_save_method = enabled,
            Capability::PatchByQuery => self.patch_by_query = enabled,
            Capability::Increment => self.increment = enabled,
            Capability::CreateTable => self.create_table = enabled,
            Capability::TableSchemas => self.table_schemas = enabled,
            Capability::Streaming => self.streaming = enabled,
            Capability::BufferValues => self.buffer_values = enabled,
            Capability::NullValues => self.null_values = enabled,
            Capability::ObjectValues => self.object_values = enabled,
            Capability::Transactions => self.transactions = enabled,
            Capability::TimeMachine => self.time_machine = enabled,
        }
        self
    }

    /// Fails with [`DbError::Unsupported`] unless `capability` is supported.
    ///
    /// # Errors
    ///
    /// Returns an error naming `adapter` and `operation` when unsupported.
    pub fn require(&self, capability: Capability, adapter: &str, operation: &str) -> DbResult<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(DbError::unsupported(adapter, operation))
        }
    }
}

impl Default for CommonDBSupport {
    fn default() -> Self {
        Self::FULL
    }
}

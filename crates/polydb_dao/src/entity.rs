//! Entity traits and model conversions.

use polydb_core::{row_from_value, DbResult, Row, RowExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// The well-known fields every stored model carries.
///
/// `id` is `None` until one is assigned. Timestamps are unix seconds.
pub trait BaseDBEntity {
    /// Row id.
    fn id(&self) -> Option<&str>;
    /// Sets the row id.
    fn set_id(&mut self, id: String);
    /// Creation time.
    fn created(&self) -> Option<i64>;
    /// Sets the creation time.
    fn set_created(&mut self, ts: i64);
    /// Last update time.
    fn updated(&self) -> Option<i64>;
    /// Sets the last update time.
    fn set_updated(&mut self, ts: i64);
}

impl BaseDBEntity for Row {
    fn id(&self) -> Option<&str> {
        self.row_id()
    }

    fn set_id(&mut self, id: String) {
        self.set_row_id(id);
    }

    fn created(&self) -> Option<i64> {
        self.row_created()
    }

    fn set_created(&mut self, ts: i64) {
        self.insert("created".to_string(), Value::from(ts));
    }

    fn updated(&self) -> Option<i64> {
        self.row_updated()
    }

    fn set_updated(&mut self, ts: i64) {
        self.insert("updated".to_string(), Value::from(ts));
    }
}

/// Bounds shared by business and database models.
pub trait DaoModel:
    BaseDBEntity + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<T> DaoModel for T where
    T: BaseDBEntity + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

/// Serializes a model into a row.
///
/// # Errors
///
/// Returns an error if the model does not serialize to a JSON object.
pub fn to_row<T: Serialize>(value: &T) -> DbResult<Row> {
    row_from_value(serde_json::to_value(value)?)
}

/// Deserializes a model from a row.
///
/// # Errors
///
/// Returns an error if the row does not fit the model.
pub fn from_row<T: DeserializeOwned>(row: Row) -> DbResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Converts between two models through their JSON form.
///
/// # Errors
///
/// Returns an error if `value` does not fit `B`.
pub fn convert<A: Serialize, B: DeserializeOwned>(value: &A) -> DbResult<B> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

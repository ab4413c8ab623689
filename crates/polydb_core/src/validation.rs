//! Validation capability.
//!
//! PolyDB does not ship a schema engine. Anything that can "validate and
//! return the converted value, or a validation error" plugs in through
//! [`ValidationSchema`].

use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Placeholder written in place of redacted values.
const REDACTED: &str = "REDACTED";

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrorDetail {
    /// Dotted path of the offending field.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
    /// The offending value, if the engine reported it.
    pub value: Option<Value>,
}

impl ValidationErrorDetail {
    /// Creates a detail without a value.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Attaches the offending value.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    fn is_under(&self, field: &str) -> bool {
        self.path == field
            || self
                .path
                .strip_prefix(field)
                .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
    }
}

impl fmt::Display for ValidationErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(v) = &self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

/// Validation failed, with structured field-level details.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Rendered message.
    pub message: String,
    /// Field-level details.
    pub details: Vec<ValidationErrorDetail>,
    /// Name of the validated object (usually the table).
    pub object_name: Option<String>,
    /// Id of the validated object, if known.
    pub object_id: Option<String>,
}

impl ValidationError {
    /// Creates an error from details, rendering the message.
    pub fn new(details: Vec<ValidationErrorDetail>) -> Self {
        let mut err = Self {
            message: String::new(),
            details,
            object_name: None,
            object_id: None,
        };
        err.render();
        err
    }

    /// Sets the object name and id and re-renders the message.
    #[must_use]
    pub fn for_object(mut self, name: impl Into<String>, id: Option<String>) -> Self {
        self.object_name = Some(name.into());
        self.object_id = id;
        self.render();
        self
    }

    /// Removes the values of the given fields (and their children) from the
    /// details and the message.
    pub fn redact(&mut self, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        for detail in &mut self.details {
            if fields.iter().any(|f| detail.is_under(f)) && detail.value.is_some() {
                detail.value = Some(Value::String(REDACTED.to_string()));
            }
        }
        self.render();
    }

    fn render(&mut self) {
        let subject = match (&self.object_name, &self.object_id) {
            (Some(name), Some(id)) => format!("{name}.{id}"),
            (Some(name), None) => name.clone(),
            (None, Some(id)) => id.clone(),
            (None, None) => "object".to_string(),
        };
        let details = self
            .details
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        self.message = format!("{subject} is invalid: {details}");
    }
}

/// A schema that validates and converts values of type `T`.
pub trait ValidationSchema<T>: Send + Sync {
    /// Validates `value`, returning the (possibly converted) value.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing every offending field.
    fn validate(&self, value: T) -> Result<T, ValidationError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "schema"
    }
}

/// A [`ValidationSchema`] backed by a closure.
///
/// ```
/// use polydb_core::{FnSchema, ValidationErrorDetail, ValidationError, ValidationSchema};
///
/// let positive = FnSchema::new("positive", |n: i64| {
///     if n > 0 {
///         Ok(n)
///     } else {
///         Err(ValidationError::new(vec![ValidationErrorDetail::new("n", "must be positive")]))
///     }
/// });
/// assert!(positive.validate(1).is_ok());
/// assert!(positive.validate(-1).is_err());
/// ```
pub struct FnSchema<T, F> {
    name: String,
    f: F,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, F> FnSchema<T, F>
where
    F: Fn(T) -> Result<T, ValidationError> + Send + Sync,
{
    /// Wraps a validation closure.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _marker: PhantomData,
        }
    }
}

impl<T, F> ValidationSchema<T> for FnSchema<T, F>
where
    F: Fn(T) -> Result<T, ValidationError> + Send + Sync,
{
    fn validate(&self, value: T) -> Result<T, ValidationError> {
        (self.f)(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

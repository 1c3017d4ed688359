use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;
use thiserror::Error;
use warp::reject::Reject;

use crate::constants::NOT_FOUND;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    UniqueViolation,
    Unavailable,
    Other,
}

#[derive(Debug)]
pub struct QueryError {
    kind: QueryErrorKind,
    info: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, info: String) -> Self {
        Self { kind, info }
    }

    pub fn kind(&self) -> QueryErrorKind {
        self.kind
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind == QueryErrorKind::UniqueViolation
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        use QueryErrorKind::*;

        match value {
            sqlx::Error::Database(e) if e.is_unique_violation() => {
                Self::new(UniqueViolation, format!("{e}"))
            }
            sqlx::Error::Configuration(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::Database(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::Io(e) => Self::new(Unavailable, format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(Unavailable, format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(Other, e),
            sqlx::Error::RowNotFound => Self::new(Other, String::from("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(Other, format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(Other, format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(Other, e),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(Other, format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(Other, format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(Unavailable, String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(Unavailable, String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(Unavailable, String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(Other, format!("{e}")),
            e => Self::new(Other, format!("Unknown error: {e}")),
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.info)
    }
}

impl std::error::Error for QueryError {}

/// A single field conversion failure. The message is user-facing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }

    pub fn info(&self) -> &str {
        &self.info
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

/// Field path to messages, e.g. `"title"` or `"ingredients.1.name"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    /// Records the error of `result` under `field` and yields its value otherwise.
    pub fn check<T>(&mut self, field: &str, result: Result<T, TypeError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.add(field, e.info());
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|m| m.as_slice())
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.keys().map(|k| k.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    #[error("{0}")]
    AuthenticationFailed(&'static str),

    #[error("{}", NOT_FOUND)]
    NotFound,

    #[error("Storage failure: {0}")]
    Query(#[from] QueryError),

    #[error("Media storage failure: {0}")]
    Media(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(field: &str, message: &str) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl Reject for ApiError {}

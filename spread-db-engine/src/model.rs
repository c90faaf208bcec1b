// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Mapping between Rust records and table rows.
//!
//! Records go through `serde_json`: a model serializes to a JSON object whose
//! keys are column names, and rows are overlaid onto the serialized
//! `Default` value before deserializing, so partial projections leave the
//! remaining fields at their defaults.

use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::Value;

/// A row type bound to a table.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use spread_db_engine::Model;
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct City {
///     id: i64,
///     name: String,
///     deleted_at: Option<i64>,
/// }
///
/// impl Model for City {
///     const TABLE: &'static str = "cities";
///     const SOFT_DELETE: Option<&'static str> = Some("deleted_at");
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Default {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    /// Unix timestamp column filled on insert when zero.
    const CREATED_AT: Option<&'static str> = None;
    /// Unix timestamp column refreshed by `update`/`updates`/`save`.
    const UPDATED_AT: Option<&'static str> = None;
    /// Deletion marker; deleting sets it instead of removing the row.
    const SOFT_DELETE: Option<&'static str> = None;
}

/// Runtime copy of a model's table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub table: &'static str,
    pub primary_key: &'static str,
    pub created_at: Option<&'static str>,
    pub updated_at: Option<&'static str>,
    pub soft_delete: Option<&'static str>,
    /// Column names in declaration order
    pub columns: Vec<String>,
}

impl ModelMeta {
    pub fn of<T: Model>() -> Result<Self> {
        let columns = to_record(&T::default())?.keys().cloned().collect();
        Ok(Self {
            table: T::TABLE,
            primary_key: T::PRIMARY_KEY,
            created_at: T::CREATED_AT,
            updated_at: T::UPDATED_AT,
            soft_delete: T::SOFT_DELETE,
            columns,
        })
    }
}

/// A serialized record: column name to JSON value.
pub(crate) type Record = serde_json::Map<String, Json>;

pub(crate) fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Json::Object(map) => Ok(map),
        other => Err(Error::invalid(format!(
            "records must serialize to a struct, got {other}"
        ))),
    }
}

pub(crate) fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(Json::Object(record))?)
}

/// How a stored value decodes into a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Plain,
    /// SQLite stores booleans as integers
    Bool,
    /// Nested data stored as JSON text
    Json,
}

/// Builds models of one type from rows with one column layout.
///
/// Each column's field type is worked out once from the model's default
/// record. Optional fields default to `null`, so their type is found by
/// checking which JSON kinds the model accepts in that position.
pub(crate) struct RowMapper<T> {
    base: Record,
    columns: Vec<String>,
    shapes: Vec<Shape>,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> RowMapper<T> {
    pub(crate) fn new(columns: &[String]) -> Result<Self> {
        let base = to_record(&T::default())?;
        let shapes = columns
            .iter()
            .map(|column| match base.get(column) {
                Some(Json::Bool(_)) => Shape::Bool,
                Some(Json::Array(_) | Json::Object(_)) => Shape::Json,
                Some(Json::Null) => optional_shape::<T>(&base, column),
                _ => Shape::Plain,
            })
            .collect();
        Ok(Self {
            base,
            columns: columns.to_vec(),
            shapes,
            _model: PhantomData,
        })
    }

    /// Build a model from a row, starting from its default value.
    pub(crate) fn map(&self, values: &[Value]) -> Result<T> {
        let mut record = self.base.clone();
        for ((column, shape), value) in self.columns.iter().zip(&self.shapes).zip(values) {
            let json = match (shape, value) {
                (Shape::Bool, Value::Integer(i)) => Json::Bool(*i != 0),
                (Shape::Json, Value::Text(text)) => {
                    serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.clone()))
                }
                _ => value.to_json(),
            };
            record.insert(column.clone(), json);
        }
        from_record(record)
    }
}

fn optional_shape<T: Model>(base: &Record, column: &str) -> Shape {
    let accepts = |json: Json| {
        let mut record = base.clone();
        record.insert(column.to_owned(), json);
        from_record::<T>(record).is_ok()
    };
    if accepts(Json::Bool(true)) && !accepts(Json::from(1)) {
        Shape::Bool
    } else if (accepts(Json::Array(Vec::new())) || accepts(Json::Object(Record::new())))
        && !accepts(Json::String(String::new()))
    {
        Shape::Json
    } else {
        Shape::Plain
    }
}

/// Build a single model from a row.
pub(crate) fn overlay<T: Model>(columns: &[String], values: &[Value]) -> Result<T> {
    RowMapper::new(columns)?.map(values)
}

/// Read the primary key of a serialized record.
pub(crate) fn primary_key_of(record: &Record, primary_key: &str) -> Value {
    record
        .get(primary_key)
        .map(Value::from_json)
        .unwrap_or(Value::Null)
}

/// Current time as a Unix timestamp.
pub(crate) fn unix_now() -> i64 {
    system_time_to_unix(SystemTime::now())
}

/// Convert Unix timestamp to SystemTime.
pub fn unix_to_system_time(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}

/// Convert SystemTime to Unix timestamp.
pub fn system_time_to_unix(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        Err(e) => 0i64.saturating_sub_unsigned(e.duration().as_secs()),
    }
}

// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Materialized rows and scan destinations.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::{Record as JsonRecord, from_record};
use crate::value::Value;

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub(crate) fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Raw value of `column`.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Decode `column` into `V`.
    pub fn get<V: DeserializeOwned>(&self, column: &str) -> Result<V> {
        let value = self
            .value(column)
            .ok_or_else(|| Error::invalid(format!("no column named '{column}'")))?;
        Ok(serde_json::from_value(value.to_json())?)
    }

    /// Decode the whole row, by column name.
    pub fn scan<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.columns, &self.values)
    }
}

/// Decode one row. Single-column rows may decode as a bare scalar.
pub(crate) fn decode<T: DeserializeOwned>(columns: &[String], values: &[Value]) -> Result<T> {
    if let [value] = values {
        if let Ok(scalar) = serde_json::from_value(value.to_json()) {
            return Ok(scalar);
        }
    }
    let record: JsonRecord = columns
        .iter()
        .cloned()
        .zip(values.iter().map(Value::to_json))
        .collect();
    from_record(record)
}

/// Result of [`Db::row`](crate::Db::row).
///
/// Errors from running the query are deferred until the row is read.
#[derive(Debug, Clone)]
pub struct Row {
    result: Result<Option<Record>>,
}

impl Row {
    pub(crate) fn new(result: Result<Option<Record>>) -> Self {
        Self { result }
    }

    /// The query error, if any. A missing row is not reported here.
    pub fn err(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    /// The row itself; [`Error::RecordNotFound`] when the query matched nothing.
    pub fn record(&self) -> Result<&Record> {
        match &self.result {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(Error::RecordNotFound),
            Err(e) => Err(e.clone()),
        }
    }

    pub fn get<V: DeserializeOwned>(&self, column: &str) -> Result<V> {
        self.record()?.get(column)
    }

    pub fn scan<T: DeserializeOwned>(&self) -> Result<T> {
        self.record()?.scan()
    }
}

/// Rows returned by [`Db::rows`](crate::Db::rows).
#[derive(Debug)]
pub struct Rows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl Rows {
    pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for Rows {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.rows
            .next()
            .map(|values| Record::new(self.columns.clone(), values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Rows {}

/// A destination for [`Db::scan`](crate::Db::scan).
pub trait ScanDest {
    /// Replace the destination with the decoded rows.
    fn assign(&mut self, columns: &[String], rows: Vec<Vec<Value>>) -> Result<()>;
}

impl<T: DeserializeOwned> ScanDest for Vec<T> {
    fn assign(&mut self, columns: &[String], rows: Vec<Vec<Value>>) -> Result<()> {
        *self = rows
            .iter()
            .map(|values| decode(columns, values))
            .collect::<Result<_>>()?;
        Ok(())
    }
}

/// Holds the first row, or `None` when nothing matched.
impl<T: DeserializeOwned> ScanDest for Option<T> {
    fn assign(&mut self, columns: &[String], rows: Vec<Vec<Value>>) -> Result<()> {
        *self = match rows.first() {
            Some(values) => Some(decode(columns, values)?),
            None => None,
        };
        Ok(())
    }
}

/// Decode a single value.
pub(crate) fn decode_value<V: DeserializeOwned>(value: &Value) -> Result<V> {
    Ok(serde_json::from_value::<V>(value.to_json())?)
}

// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Read terminals.

use serde::de::DeserializeOwned;

use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Model, RowMapper, overlay};
use crate::row::{Record, Row, Rows, ScanDest, decode_value};
use crate::value::Value;

#[derive(Clone, Copy)]
enum Pick {
    First,
    Last,
    Take,
}

impl Db {
    /// Load every matching row into `dest`. Matching nothing is not an error.
    pub fn find<T: Model>(&self, dest: &mut Vec<T>) -> Db {
        let db = self.bind_model::<T>();
        db.run_select(&db, |columns, rows| {
            let mapper = RowMapper::<T>::new(columns)?;
            *dest = rows
                .iter()
                .map(|values| mapper.map(values))
                .collect::<Result<_>>()?;
            Ok(())
        })
    }

    /// First row by primary key.
    pub fn first<T: Model>(&self, dest: &mut T) -> Db {
        self.pick(dest, Pick::First)
    }

    /// Last row by primary key.
    pub fn last<T: Model>(&self, dest: &mut T) -> Db {
        self.pick(dest, Pick::Last)
    }

    /// Any one row, in no particular order.
    pub fn take<T: Model>(&self, dest: &mut T) -> Db {
        self.pick(dest, Pick::Take)
    }

    fn pick<T: Model>(&self, dest: &mut T, pick: Pick) -> Db {
        let db = self.bind_model::<T>();
        let mut query = db.clone();
        if let Some(meta) = &db.statement.model {
            let table = db.statement.table.as_deref().unwrap_or(meta.table);
            let key = db.dialect.quote(&format!("{table}.{}", meta.primary_key));
            match pick {
                Pick::First => query.statement.orders.push(key),
                Pick::Last => query.statement.orders.push(format!("{key} DESC")),
                Pick::Take => {}
            }
        }
        query.statement.limit = Some(1);
        db.run_select(&query, |columns, rows| match rows.first() {
            Some(values) => {
                *dest = overlay(columns, values)?;
                Ok(())
            }
            None => Err(Error::RecordNotFound),
        })
    }

    /// Decode matching rows into `dest`, by column name.
    pub fn scan<D: ScanDest>(&self, dest: &mut D) -> Db {
        self.run_select(self, |columns, rows| dest.assign(columns, rows))
    }

    /// Load one column of every matching row.
    pub fn pluck<V: DeserializeOwned>(&self, column: &str, dest: &mut Vec<V>) -> Db {
        let mut query = self.clone();
        query.statement.selects = vec![self.dialect.quote_if_ident(column).into()];
        self.run_select(&query, |_, rows| {
            *dest = rows
                .iter()
                .map(|values| {
                    values
                        .first()
                        .map_or_else(|| decode_value(&Value::Null), decode_value)
                })
                .collect::<Result<_>>()?;
            Ok(())
        })
    }

    /// Count matching rows. Ordering and limits are ignored.
    pub fn count(&self, dest: &mut i64) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        let (sql, vars) = match self.statement.build_count(self.dialect) {
            Ok(compiled) => compiled,
            Err(e) => return self.with_error(e),
        };
        if self.flags.dry_run {
            return self.finish(sql, vars, Ok(0));
        }
        let outcome = self.query_rows(&sql, &vars).and_then(|(_, rows)| {
            let count = match rows.first().and_then(|r| r.first()) {
                Some(Value::Integer(n)) => *n,
                _ => 0,
            };
            *dest = count;
            Ok(1)
        });
        self.finish(sql, vars, outcome)
    }

    /// Run the query and keep its first row.
    pub fn row(&self) -> Row {
        if let Some(e) = &self.error {
            return Row::new(Err(e.clone()));
        }
        let query = self.statement.build_select(self.dialect).and_then(|(sql, vars)| {
            self.log_statement(&sql, &vars);
            self.query_rows(&sql, &vars)
        });
        Row::new(query.map(|(columns, rows)| {
            rows.into_iter()
                .next()
                .map(|values| Record::new(columns, values))
        }))
    }

    /// Run the query and return every row.
    pub fn rows(&self) -> Result<Rows> {
        self.result()?;
        let (sql, vars) = self.statement.build_select(self.dialect)?;
        self.log_statement(&sql, &vars);
        let (columns, rows) = self.query_rows(&sql, &vars)?;
        Ok(Rows::new(columns, rows))
    }

    /// Compile `query`'s select, run it and hand the rows to `assign`.
    fn run_select(
        &self,
        query: &Db,
        assign: impl FnOnce(&[String], Vec<Vec<Value>>) -> Result<()>,
    ) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        let (sql, vars) = match query.statement.build_select(self.dialect) {
            Ok(compiled) => compiled,
            Err(e) => return self.with_error(e),
        };
        if self.flags.dry_run {
            return self.finish(sql, vars, Ok(0));
        }
        let outcome = self.query_rows(&sql, &vars).and_then(|(columns, rows)| {
            let found = rows.len() as u64;
            assign(&columns, rows)?;
            Ok(found)
        });
        self.finish(sql, vars, outcome)
    }
}

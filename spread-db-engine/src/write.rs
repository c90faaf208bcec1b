// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Mutating terminals.

use tracing::debug;

use crate::clause::Assignments;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Model, ModelMeta, Record, from_record, primary_key_of, to_record, unix_now};
use crate::value::Value;

/// A compiled insert and the records it writes.
struct Insert {
    sql: String,
    vars: Vec<Value>,
    records: Vec<Record>,
}

impl Db {
    /// Insert `record` and write the generated key back into it.
    pub fn create<T: Model>(&self, record: &mut T) -> Db {
        self.create_in_batches(std::slice::from_mut(record), 0)
    }

    /// Insert `records` with one statement per `batch_size` records; zero
    /// means a single statement.
    ///
    /// Without an enclosing transaction all chunks share an implicit one, so
    /// a failing chunk undoes the whole batch. With `skip_default_transaction`
    /// chunks commit one by one and those before the failure stay written.
    /// Keys are written back only for chunks that were kept.
    pub fn create_in_batches<T: Model>(&self, records: &mut [T], batch_size: usize) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        let meta = match ModelMeta::of::<T>() {
            Ok(meta) => meta,
            Err(e) => return self.with_error(e),
        };
        if records.is_empty() {
            return self.with_error(Error::invalid("no records to create"));
        }
        let size = if batch_size == 0 {
            records.len()
        } else {
            batch_size
        };
        let implicit = self.uses_implicit_transaction();
        let now = unix_now();

        let mut written: Vec<(usize, Vec<Record>)> = Vec::new();
        let mut last = (String::new(), Vec::new());
        let mut affected = 0u64;
        let outcome = self.write_scope(|tx| {
            for (index, chunk) in records.chunks(size).enumerate() {
                let mut insert = tx.compile_insert(&meta, chunk, now)?;
                last = (insert.sql.clone(), insert.vars.clone());
                if tx.flags.dry_run {
                    continue;
                }
                debug!(chunk = index, rows = chunk.len(), "inserting chunk");
                let (_, keys) = tx.query_rows(&insert.sql, &insert.vars)?;
                affected += keys.len() as u64;
                // ON CONFLICT DO NOTHING returns fewer keys than rows
                if keys.len() == insert.records.len() {
                    for (record, key) in insert.records.iter_mut().zip(keys) {
                        if let Some(key) = key.into_iter().next() {
                            record.insert(meta.primary_key.to_owned(), key.to_json());
                        }
                    }
                }
                written.push((index * size, insert.records));
            }
            Ok(())
        });

        let keep = outcome.is_ok() || !implicit;
        let failed = outcome.is_err();
        let mut db = self.finish(last.0, last.1, outcome.map(|()| affected));
        if !keep {
            return db;
        }
        if failed {
            db.rows_affected = affected;
        }
        for (offset, chunk) in written {
            for (i, record) in chunk.into_iter().enumerate() {
                match from_record(record) {
                    Ok(value) => records[offset + i] = value,
                    Err(e) => return db.with_error(e),
                }
            }
        }
        db
    }

    /// Compile one multi-row insert, filling zero timestamps and dropping
    /// the key column when no record carries a key.
    fn compile_insert<T: Model>(&self, meta: &ModelMeta, chunk: &[T], now: i64) -> Result<Insert> {
        let mut records = chunk.iter().map(to_record).collect::<Result<Vec<_>>>()?;
        for record in &mut records {
            for column in [meta.created_at, meta.updated_at].into_iter().flatten() {
                let unset = record
                    .get(column)
                    .is_none_or(|json| Value::from_json(json).is_zero());
                if unset {
                    record.insert(column.to_owned(), now.into());
                }
            }
        }

        let keyed = records
            .iter()
            .any(|r| !primary_key_of(r, meta.primary_key).is_zero());
        let mut columns: Vec<String> = meta
            .columns
            .iter()
            .filter(|c| keyed || c.as_str() != meta.primary_key)
            .cloned()
            .collect();
        if columns.is_empty() {
            columns.push(meta.primary_key.to_owned());
        }
        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| {
                        let value = record.get(column).map(Value::from_json).unwrap_or_default();
                        if column == meta.primary_key && value.is_zero() {
                            Value::Null
                        } else {
                            value
                        }
                    })
                    .collect()
            })
            .collect();

        let (sql, vars) = self
            .statement
            .build_insert(self.dialect, meta, &columns, &rows)?;
        Ok(Insert { sql, vars, records })
    }

    /// Insert `record` when its key is zero; otherwise update every column
    /// by key, inserting with that key when no row matched.
    pub fn save<T: Model>(&self, record: &mut T) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        let (meta, mut map) = match ModelMeta::of::<T>().and_then(|m| Ok((m, to_record(record)?))) {
            Ok(parts) => parts,
            Err(e) => return self.with_error(e),
        };
        if primary_key_of(&map, meta.primary_key).is_zero() {
            return self.create(record);
        }

        let now = unix_now();
        let mut assignments = Assignments::all(record);
        if let Some(column) = meta.updated_at {
            assignments.push(column.to_owned(), Value::Integer(now));
            map.insert(column.to_owned(), now.into());
        }
        let db = self.model(record);
        if db.error.is_some() {
            return db;
        }
        let (sql, vars) = match db
            .statement
            .build_update(db.dialect, assignments.into_pairs(), true)
        {
            Ok(compiled) => compiled,
            Err(e) => return db.with_error(e),
        };
        if db.flags.dry_run {
            return db.finish(sql, vars, Ok(0));
        }

        let outcome = db.write_scope(|tx| {
            let updated = tx.execute(&sql, &vars)?;
            if updated > 0 {
                return Ok((sql, vars, updated, map));
            }
            let Insert {
                sql,
                vars,
                mut records,
            } = tx.compile_insert(&meta, std::slice::from_ref(record), now)?;
            let (_, keys) = tx.query_rows(&sql, &vars)?;
            let inserted = records.pop().unwrap_or(map);
            Ok((sql, vars, keys.len() as u64, inserted))
        });

        match outcome {
            Ok((sql, vars, affected, saved)) => {
                let db = db.finish(sql, vars, Ok(affected));
                match from_record(saved) {
                    Ok(value) => {
                        *record = value;
                        db
                    }
                    Err(e) => db.with_error(e),
                }
            }
            Err(e) => db.with_error(e),
        }
    }

    /// Set one column, refreshing the model's update timestamp.
    pub fn update(&self, column: &str, value: impl Into<Value>) -> Db {
        self.run_update(Assignments::new().set(column, value), true)
    }

    /// Set several columns, refreshing the model's update timestamp.
    pub fn updates(&self, assignments: impl Into<Assignments>) -> Db {
        self.run_update(assignments.into(), true)
    }

    /// Set one column without touching the update timestamp.
    pub fn update_column(&self, column: &str, value: impl Into<Value>) -> Db {
        self.run_update(Assignments::new().set(column, value), false)
    }

    /// Set several columns without touching the update timestamp.
    pub fn update_columns(&self, assignments: impl Into<Assignments>) -> Db {
        self.run_update(assignments.into(), false)
    }

    fn run_update(&self, mut assignments: Assignments, touch: bool) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        if let Err(e) = assignments.check() {
            return self.with_error(e);
        }
        if let Some(meta) = &self.statement.model {
            assignments.retain(|column| column != meta.primary_key);
            if let Some(column) = meta.updated_at.filter(|c| touch && !assignments.contains(c)) {
                assignments.push(column.to_owned(), Value::Integer(unix_now()));
            }
        }
        if assignments.is_empty() {
            return self.with_error(Error::invalid("no columns to update"));
        }
        let compiled = self.statement.build_update(
            self.dialect,
            assignments.into_pairs(),
            self.flags.allow_global_update,
        );
        self.run_write(compiled)
    }

    /// Delete the rows matched by the chain and `record`'s key. Models with
    /// a soft-delete column are marked instead, unless unscoped.
    pub fn delete<T: Model>(&self, record: &T) -> Db {
        let db = self.model(record);
        if db.error.is_some() {
            return db;
        }
        let allow_global = db.flags.allow_global_update;
        let soft_delete = db
            .statement
            .model
            .as_ref()
            .and_then(|meta| meta.soft_delete)
            .filter(|_| !db.statement.unscoped);
        let compiled = match soft_delete {
            Some(column) => db.statement.build_update(
                db.dialect,
                vec![(column.to_owned(), Value::Integer(unix_now()))],
                allow_global,
            ),
            None => db.statement.build_delete(db.dialect, allow_global),
        };
        db.run_write(compiled)
    }

    fn run_write(&self, compiled: Result<(String, Vec<Value>)>) -> Db {
        let (sql, vars) = match compiled {
            Ok(compiled) => compiled,
            Err(e) => return self.with_error(e),
        };
        if self.flags.dry_run {
            return self.finish(sql, vars, Ok(0));
        }
        let outcome = self.write_scope(|tx| tx.execute(&sql, &vars));
        self.finish(sql, vars, outcome)
    }
}

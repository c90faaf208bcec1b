// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! The copy-on-call database handle and its query-building methods.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{CachedStatement, Connection, params_from_iter};
use tracing::{debug, info};

use crate::clause::{Clause, Condition, Expr, OrderBy, Selection};
use crate::connection::{OpenMode, Pool, PoolOptions, Source};
use crate::context::{Context, Flags, SessionConfig};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::model::{Model, ModelMeta, primary_key_of, to_record};
use crate::statement::{Connective, Statement};
use crate::transaction::TxConn;
use crate::value::Value;

/// A database handle carrying accumulated query state.
///
/// Cloning is cheap. Builder methods take `&self` and return a new handle,
/// so a handle can be reused as the root of any number of chains:
///
/// ```
/// use spread_db_engine::{Db, expr};
///
/// let db = Db::open_memory("doc_db")?;
/// let users = db.table("users");
/// let adults = users.filter(expr!("age >= ?", 18));
/// assert!(!users.statement().has_conditions());
/// assert!(adults.statement().has_conditions());
/// # Ok::<(), spread_db_engine::Error>(())
/// ```
///
/// The first error raised anywhere in a chain is kept on the handle; later
/// builder calls return it unchanged and terminals skip execution.
#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Arc<Pool>,
    pub(crate) tx: Option<Arc<TxConn>>,
    pub(crate) statement: Statement,
    pub(crate) flags: Flags,
    pub(crate) context: Context,
    pub(crate) error: Option<Error>,
    pub(crate) rows_affected: u64,
    pub(crate) dialect: Dialect,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("pool", &self.pool)
            .field("in_transaction", &self.in_transaction())
            .field("statement", &self.statement)
            .field("error", &self.error)
            .field("rows_affected", &self.rows_affected)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Open a database file.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::open_with(
            Source::File(path.as_ref().to_path_buf()),
            mode,
            PoolOptions::default(),
        )
    }

    /// Open a named in-memory database, shared by every handle using `name`.
    pub fn open_memory(name: &str) -> Result<Self> {
        Self::open_with(
            Source::Memory(name.to_owned()),
            OpenMode::Create,
            PoolOptions::default(),
        )
    }

    pub fn open_with(source: Source, mode: OpenMode, options: PoolOptions) -> Result<Self> {
        let pool = Pool::open(source, mode, options)?;
        Ok(Self {
            pool,
            tx: None,
            statement: Statement::default(),
            flags: Flags::default(),
            context: Context::background(),
            error: None,
            rows_affected: 0,
            dialect: Dialect::Sqlite,
        })
    }

    // Accessors

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The recorded error as a `Result`.
    pub fn result(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn open_mode(&self) -> OpenMode {
        self.pool.mode()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_open())
    }

    /// Whether both handles run statements against the same pool.
    pub fn same_pool(&self, other: &Db) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
    }

    // Chain plumbing

    /// Derive a new handle from `self`. Errored handles are returned as is.
    fn derive(&self, apply: impl FnOnce(&mut Db) -> Result<()>) -> Db {
        let mut db = self.clone();
        if db.error.is_some() {
            return db;
        }
        db.rows_affected = 0;
        if let Err(e) = apply(&mut db) {
            db.error = Some(e);
        }
        db
    }

    pub(crate) fn with_error(&self, error: Error) -> Db {
        let mut db = self.clone();
        if db.error.is_none() {
            db.error = Some(error);
        }
        db
    }

    // Builders

    pub fn with_context(&self, context: Context) -> Db {
        self.derive(|db| {
            db.context = context;
            Ok(())
        })
    }

    pub fn session(&self, config: SessionConfig) -> Db {
        self.derive(|db| {
            if config.new_db {
                db.statement = Statement::default();
            }
            db.flags.dry_run |= config.dry_run;
            db.flags.skip_default_transaction |= config.skip_default_transaction;
            db.flags.allow_global_update |= config.allow_global_update;
            if let Some(context) = config.context {
                db.context = context;
            }
            Ok(())
        })
    }

    pub fn table(&self, name: &str) -> Db {
        self.derive(|db| {
            db.statement.table = Some(name.to_owned());
            Ok(())
        })
    }

    /// Bind the model type and, when `record` has a primary key, restrict the
    /// statement to that row.
    pub fn model<T: Model>(&self, record: &T) -> Db {
        self.derive(|db| {
            let meta = ModelMeta::of::<T>()?;
            let key = primary_key_of(&to_record(record)?, meta.primary_key);
            if !key.is_zero() {
                let table = db.statement.table.as_deref().unwrap_or(meta.table);
                let column = db.dialect.quote(&format!("{table}.{}", meta.primary_key));
                db.statement
                    .push_predicate(Connective::And, Expr::new(format!("{column} = ?"), vec![key]));
            }
            db.statement.model = Some(meta);
            Ok(())
        })
    }

    /// Bind `T` as the model unless one is bound already.
    pub(crate) fn bind_model<T: Model>(&self) -> Db {
        if self.statement.model.is_some() {
            return self.clone();
        }
        self.derive(|db| {
            db.statement.model = Some(ModelMeta::of::<T>()?);
            Ok(())
        })
    }

    /// Set the projection, replacing any earlier one.
    pub fn select(&self, selection: impl Into<Selection>) -> Db {
        let selection = selection.into();
        self.derive(|db| {
            db.statement.selects = selection.render(db.dialect)?;
            Ok(())
        })
    }

    /// Leave columns out of the model's default projection.
    pub fn omit<I, S>(&self, columns: I) -> Db
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.derive(|db| {
            db.statement.omits.extend(columns);
            Ok(())
        })
    }

    pub fn distinct(&self, selection: impl Into<Selection>) -> Db {
        let selection = selection.into();
        self.derive(|db| {
            db.statement.distinct = true;
            let selects = selection.render(db.dialect)?;
            if !selects.iter().all(|s| s.sql == "*") {
                db.statement.selects = selects;
            }
            Ok(())
        })
    }

    pub fn filter(&self, condition: impl Into<Condition>) -> Db {
        self.predicate(Connective::And, condition.into())
    }

    pub fn or_filter(&self, condition: impl Into<Condition>) -> Db {
        self.predicate(Connective::Or, condition.into())
    }

    pub fn not(&self, condition: impl Into<Condition>) -> Db {
        self.predicate(Connective::Not, condition.into())
    }

    fn predicate(&self, connective: Connective, condition: Condition) -> Db {
        self.derive(|db| {
            if let Some(expr) = condition.into_expr(db.dialect)? {
                db.statement.push_predicate(connective, expr);
            }
            Ok(())
        })
    }

    /// Add a join, e.g. `"JOIN emails ON emails.user_id = users.id"`.
    pub fn joins(&self, join: impl Into<Expr>) -> Db {
        let join = join.into();
        self.derive(|db| {
            join.validate()?;
            db.statement.joins.push(join);
            Ok(())
        })
    }

    pub fn group(&self, column: &str) -> Db {
        self.derive(|db| {
            let column = db.dialect.quote_if_ident(column);
            db.statement.group_by.push(column);
            Ok(())
        })
    }

    pub fn having(&self, condition: impl Into<Expr>) -> Db {
        let condition = condition.into();
        self.derive(|db| {
            condition.validate()?;
            db.statement.havings.push(condition);
            Ok(())
        })
    }

    /// Append an ordering; repeated calls accumulate.
    pub fn order(&self, order: impl Into<OrderBy>) -> Db {
        let order = order.into();
        self.derive(|db| {
            let rendered = order.render(db.dialect);
            db.statement.orders.push(rendered);
            Ok(())
        })
    }

    /// Limit the row count; a negative limit removes it.
    pub fn limit(&self, limit: i64) -> Db {
        self.derive(|db| {
            db.statement.limit = (limit >= 0).then_some(limit);
            Ok(())
        })
    }

    /// Skip rows; a negative offset removes it.
    pub fn offset(&self, offset: i64) -> Db {
        self.derive(|db| {
            db.statement.offset = (offset >= 0).then_some(offset);
            Ok(())
        })
    }

    /// Disable the soft-delete filter.
    pub fn unscoped(&self) -> Db {
        self.derive(|db| {
            db.statement.unscoped = true;
            Ok(())
        })
    }

    /// Use literal SQL for the next read terminal.
    pub fn raw(&self, sql: impl Into<Expr>) -> Db {
        let sql = sql.into();
        self.derive(|db| {
            sql.validate()?;
            db.statement.raw = Some(sql);
            Ok(())
        })
    }

    /// Refuse to run any statement that would write, on this handle and
    /// every handle derived from it.
    pub fn read_only(&self) -> Db {
        self.derive(|db| {
            db.flags.read_only = true;
            Ok(())
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.read_only
    }

    /// Log statements from this chain at `info` level.
    pub fn debug(&self) -> Db {
        self.derive(|db| {
            db.statement.debug = true;
            Ok(())
        })
    }

    pub fn clauses(&self, clause: impl Into<Clause>) -> Db {
        let clause = clause.into();
        self.derive(|db| {
            db.statement.clauses.push(clause);
            Ok(())
        })
    }

    /// Apply query-building closures in order, each to the previous result.
    pub fn scopes<I, F>(&self, scopes: I) -> Db
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(Db) -> Db,
    {
        scopes
            .into_iter()
            .fold(self.clone(), |db, scope| scope(db))
    }

    // Execution

    /// Run `f` on this handle's connection: the transaction's if any, a
    /// pooled one otherwise.
    pub(crate) fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        self.context.check()?;
        match &self.tx {
            Some(tx) => tx.with_conn(|conn| self.context.run(conn, f)),
            None => {
                let conn = self.pool.get()?;
                self.context.run(&conn, f)
            }
        }
    }

    pub(crate) fn log_statement(&self, sql: &str, vars: &[Value]) {
        if self.statement.debug {
            info!(sql, ?vars, rows_affected = self.rows_affected, "statement");
        } else {
            debug!(sql, ?vars, "statement");
        }
    }

    /// Run a query and collect every row.
    pub(crate) fn query_rows(
        &self,
        sql: &str,
        vars: &[Value],
    ) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        self.with_conn(|conn| {
            let mut stmt = self.prepare(conn, sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
            let mut rows = stmt.query(params_from_iter(vars.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(Value::from(row.get_ref(i)?));
                }
                out.push(values);
            }
            Ok((columns, out))
        })
    }

    /// Run a statement and report the rows it changed.
    pub(crate) fn execute(&self, sql: &str, vars: &[Value]) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = self
                .prepare(conn, sql)?
                .execute(params_from_iter(vars.iter()))?;
            Ok(changed as u64)
        })
    }

    /// Run one or more `;`-separated statements without arguments.
    fn execute_script(&self, sql: &str) -> Result<u64> {
        self.with_conn(|conn| {
            conn.execute_batch(sql)?;
            Ok(conn.changes() as u64)
        })
    }

    fn prepare<'c>(&self, conn: &'c Connection, sql: &str) -> Result<CachedStatement<'c>> {
        let stmt = conn.prepare_cached(sql)?;
        if self.flags.read_only && !stmt.readonly() {
            return Err(Error::ReadOnly(sql.to_owned()));
        }
        Ok(stmt)
    }

    /// Record the outcome of a terminal on a new handle.
    pub(crate) fn finish(&self, sql: String, vars: Vec<Value>, outcome: Result<u64>) -> Db {
        let mut db = self.clone();
        db.statement.sql = sql;
        db.statement.vars = vars;
        match outcome {
            Ok(rows) => db.rows_affected = rows,
            Err(e) => {
                db.rows_affected = 0;
                db.error = Some(e);
            }
        }
        db.log_statement(&db.statement.sql, &db.statement.vars);
        db
    }

    /// Run a raw statement.
    pub fn exec(&self, sql: impl Into<Expr>) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        let sql = sql.into();
        if let Err(e) = sql.validate() {
            return self.with_error(e);
        }
        let outcome = if self.flags.dry_run {
            Ok(0)
        } else if sql.vars.is_empty() && !self.flags.read_only {
            self.execute_script(&sql.sql)
        } else {
            self.execute(&sql.sql, &sql.vars)
        };
        self.finish(sql.sql, sql.vars, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(name: &str) -> Db {
        let db = Db::open_memory(name).unwrap();
        db.exec("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .result()
            .unwrap();
        db
    }

    #[test]
    fn test_builders_do_not_mutate_receiver() {
        let root = db("db_immutable").table("users");
        let a = root.filter(crate::expr!("age > ?", 1));
        let b = root.filter(crate::expr!("age > ?", 1));
        assert!(!root.statement().has_conditions());
        assert_eq!(a.statement().predicates.len(), 1);
        assert_eq!(b.statement().predicates.len(), 1);
    }

    #[test]
    fn test_first_error_is_kept() {
        let db = db("db_first_error").table("users");
        let bad = db.filter(crate::expr!("age > ? AND name = ?", 1));
        let later = bad.joins(crate::expr!("JOIN x ON ?"));
        assert!(matches!(later.error(), Some(Error::InvalidQuery(msg)) if msg.contains("age")));
    }

    #[test]
    fn test_scopes_apply_in_order() {
        let db = db("db_scopes").table("users");
        let scoped = db.scopes([
            (|d: Db| d.order("name")) as fn(Db) -> Db,
            |d: Db| d.order("age"),
        ]);
        assert_eq!(scoped.statement().orders(), ["name", "age"]);
    }

    #[test]
    fn test_exec_validates_placeholders() {
        let db = db("db_exec_validate");
        let out = db.exec(crate::expr!("DELETE FROM users WHERE id = ? AND age = ?", 1));
        assert!(matches!(out.error(), Some(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_read_only_handle_refuses_writes() {
        let db = db("db_read_only");
        let out = db.read_only().exec("DELETE FROM users");
        assert!(matches!(out.error(), Some(Error::ReadOnly(_))));

        let mut rows: Vec<i64> = Vec::new();
        let out = db
            .read_only()
            .raw("INSERT INTO users (name, age) VALUES ('x', 1) RETURNING id")
            .scan(&mut rows);
        assert!(matches!(out.error(), Some(Error::ReadOnly(_))));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_cancelled_context_skips_statement() {
        let db = db("db_cancelled");
        let ctx = Context::background();
        ctx.cancel();
        let out = db.with_context(ctx).exec("DELETE FROM users");
        assert!(matches!(out.error(), Some(Error::Cancelled)));
    }
}

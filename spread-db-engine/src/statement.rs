// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Accumulated query state and its compilation to SQL.

use crate::clause::{Clause, Expr};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::model::ModelMeta;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Connective {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub(crate) connective: Connective,
    pub(crate) expr: Expr,
}

/// Clauses collected by a chain of builder calls, plus the SQL most recently
/// compiled from them.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub(crate) table: Option<String>,
    pub(crate) model: Option<ModelMeta>,
    pub(crate) selects: Vec<Expr>,
    pub(crate) omits: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) joins: Vec<Expr>,
    pub(crate) group_by: Vec<String>,
    pub(crate) havings: Vec<Expr>,
    pub(crate) orders: Vec<String>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
    pub(crate) unscoped: bool,
    pub(crate) raw: Option<Expr>,
    pub(crate) clauses: Vec<Clause>,
    pub(crate) debug: bool,
    pub(crate) sql: String,
    pub(crate) vars: Vec<Value>,
}

impl Statement {
    /// SQL of the last statement compiled on this handle.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound arguments of [`sql`](Self::sql).
    pub fn vars(&self) -> &[Value] {
        &self.vars
    }

    /// Target table, from `table()` or the bound model.
    pub fn table(&self) -> Option<&str> {
        self.table
            .as_deref()
            .or_else(|| self.model.as_ref().map(|m| m.table))
    }

    pub fn model(&self) -> Option<&ModelMeta> {
        self.model.as_ref()
    }

    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Whether any filter has been applied.
    pub fn has_conditions(&self) -> bool {
        !self.predicates.is_empty()
    }

    pub fn orders(&self) -> &[String] {
        &self.orders
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub(crate) fn table_name(&self) -> Result<&str> {
        self.table().ok_or(Error::MissingTable)
    }

    pub(crate) fn push_predicate(&mut self, connective: Connective, expr: Expr) {
        self.predicates.push(Predicate { connective, expr });
    }

    fn soft_delete_filter(&self, dialect: Dialect) -> Option<String> {
        if self.unscoped {
            return None;
        }
        let meta = self.model.as_ref()?;
        let column = meta.soft_delete?;
        let table = self.table.as_deref().unwrap_or(meta.table);
        Some(format!(
            "{}.{} IS NULL",
            dialect.quote(table),
            dialect.quote(column)
        ))
    }

    fn render_where(&self, dialect: Dialect, sql: &mut String, vars: &mut Vec<Value>) {
        let multiple = self.predicates.len() > 1;
        let mut user = String::new();
        for (i, predicate) in self.predicates.iter().enumerate() {
            let body = &predicate.expr.sql;
            let fragment = match predicate.connective {
                Connective::Not => format!("NOT ({body})"),
                _ if multiple && contains_or(body) => format!("({body})"),
                _ => body.clone(),
            };
            if i > 0 {
                user.push_str(match predicate.connective {
                    Connective::Or => " OR ",
                    _ => " AND ",
                });
            }
            user.push_str(&fragment);
            vars.extend(predicate.expr.vars.iter().cloned());
        }

        let has_or = self
            .predicates
            .iter()
            .any(|p| p.connective == Connective::Or);
        match (user.is_empty(), self.soft_delete_filter(dialect)) {
            (true, None) => {}
            (false, None) => {
                sql.push_str(" WHERE ");
                sql.push_str(&user);
            }
            (true, Some(filter)) => {
                sql.push_str(" WHERE ");
                sql.push_str(&filter);
            }
            (false, Some(filter)) if has_or => {
                sql.push_str(&format!(" WHERE ({user}) AND {filter}"));
            }
            (false, Some(filter)) => {
                sql.push_str(&format!(" WHERE {user} AND {filter}"));
            }
        }
    }

    fn render_projection(&self, dialect: Dialect, table: &str, vars: &mut Vec<Value>) -> String {
        if !self.selects.is_empty() {
            for select in &self.selects {
                vars.extend(select.vars.iter().cloned());
            }
            return self
                .selects
                .iter()
                .map(|s| s.sql.as_str())
                .collect::<Vec<_>>()
                .join(", ");
        }
        match &self.model {
            Some(meta) if !self.omits.is_empty() => {
                let qualify = !self.joins.is_empty();
                meta.columns
                    .iter()
                    .filter(|c| !self.omits.contains(c))
                    .map(|c| {
                        if qualify {
                            format!("{}.{}", dialect.quote(table), dialect.quote(c))
                        } else {
                            dialect.quote(c)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            Some(_) if !self.joins.is_empty() => format!("{}.*", dialect.quote(table)),
            _ => "*".to_owned(),
        }
    }

    /// Compile a `SELECT` for the accumulated clauses.
    pub(crate) fn build_select(&self, dialect: Dialect) -> Result<(String, Vec<Value>)> {
        if let Some(raw) = &self.raw {
            return Ok((raw.sql.clone(), raw.vars.clone()));
        }
        let table = self.table_name()?;
        let mut vars = Vec::new();
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.render_projection(dialect, table, &mut vars));
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote(table));
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.sql);
            vars.extend(join.vars.iter().cloned());
        }
        self.render_where(dialect, &mut sql, &mut vars);
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.havings.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(
                &self
                    .havings
                    .iter()
                    .map(|h| h.sql.as_str())
                    .collect::<Vec<_>>()
                    .join(" AND "),
            );
            for having in &self.havings {
                vars.extend(having.vars.iter().cloned());
            }
        }
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                vars.push(Value::Integer(limit));
                vars.push(Value::Integer(offset));
            }
            (Some(limit), None) => {
                sql.push_str(" LIMIT ?");
                vars.push(Value::Integer(limit));
            }
            (None, Some(offset)) => {
                // SQLite needs a LIMIT before OFFSET
                sql.push_str(" LIMIT -1 OFFSET ?");
                vars.push(Value::Integer(offset));
            }
            (None, None) => {}
        }
        Ok((sql, vars))
    }

    /// Compile a `SELECT count(*)` over the accumulated clauses.
    pub(crate) fn build_count(&self, dialect: Dialect) -> Result<(String, Vec<Value>)> {
        let mut inner = self.clone();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;

        let subquery = self.raw.is_some()
            || !self.group_by.is_empty()
            || (self.distinct && self.selects.len() > 1);
        if subquery {
            let (sql, vars) = inner.build_select(dialect)?;
            return Ok((format!("SELECT count(*) FROM ({sql})"), vars));
        }

        inner.selects = match (self.distinct, self.selects.first()) {
            (true, Some(select)) => vec![Expr::new(
                format!("count(DISTINCT {})", select.sql),
                select.vars.clone(),
            )],
            _ => vec![Expr::from("count(*)")],
        };
        inner.distinct = false;
        inner.build_select(dialect)
    }

    /// Compile a multi-row `INSERT ... RETURNING <primary key>`.
    pub(crate) fn build_insert(
        &self,
        dialect: Dialect,
        meta: &ModelMeta,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<(String, Vec<Value>)> {
        let table = self.table.as_deref().unwrap_or(meta.table);
        let row_sql = format!(
            "({})",
            vec![dialect.placeholder(); columns.len()].join(",")
        );
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            dialect.quote(table),
            columns
                .iter()
                .map(|c| dialect.quote(c))
                .collect::<Vec<_>>()
                .join(","),
            vec![row_sql.as_str(); rows.len()].join(",")
        );
        for clause in &self.clauses {
            match clause {
                Clause::OnConflict(on_conflict) => {
                    sql.push_str(&on_conflict.render(dialect, meta.primary_key, columns));
                }
            }
        }
        sql.push_str(" RETURNING ");
        sql.push_str(&dialect.quote(meta.primary_key));
        let vars = rows.iter().flatten().cloned().collect();
        Ok((sql, vars))
    }

    /// Compile an `UPDATE` of `assignments` over the filtered rows.
    pub(crate) fn build_update(
        &self,
        dialect: Dialect,
        assignments: Vec<(String, Value)>,
        allow_global: bool,
    ) -> Result<(String, Vec<Value>)> {
        let table = self.table_name()?;
        if self.predicates.is_empty() && !allow_global {
            return Err(Error::MissingWhereClause);
        }
        let set = assignments
            .iter()
            .map(|(c, _)| format!("{}=?", dialect.quote(c)))
            .collect::<Vec<_>>()
            .join(",");
        let mut sql = format!("UPDATE {} SET {set}", dialect.quote(table));
        let mut vars: Vec<Value> = assignments.into_iter().map(|(_, v)| v).collect();
        self.render_where(dialect, &mut sql, &mut vars);
        Ok((sql, vars))
    }

    /// Compile a `DELETE` of the filtered rows.
    pub(crate) fn build_delete(
        &self,
        dialect: Dialect,
        allow_global: bool,
    ) -> Result<(String, Vec<Value>)> {
        let table = self.table_name()?;
        if self.predicates.is_empty() && !allow_global {
            return Err(Error::MissingWhereClause);
        }
        let mut sql = format!("DELETE FROM {}", dialect.quote(table));
        let mut vars = Vec::new();
        self.render_where(dialect, &mut sql, &mut vars);
        Ok((sql, vars))
    }
}

fn contains_or(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city_meta() -> ModelMeta {
        ModelMeta {
            table: "cities",
            primary_key: "id",
            created_at: None,
            updated_at: None,
            soft_delete: Some("deleted_at"),
            columns: vec!["id".into(), "name".into(), "deleted_at".into()],
        }
    }

    #[test]
    fn test_select_without_table_fails() {
        let stmt = Statement::default();
        assert!(matches!(
            stmt.build_select(Dialect::Sqlite),
            Err(Error::MissingTable)
        ));
    }

    #[test]
    fn test_soft_delete_filter_and_unscoped() {
        let mut stmt = Statement {
            model: Some(city_meta()),
            ..Default::default()
        };
        let (sql, _) = stmt.build_select(Dialect::Sqlite).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"cities\" WHERE \"cities\".\"deleted_at\" IS NULL"
        );

        stmt.unscoped = true;
        let (sql, _) = stmt.build_select(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT * FROM \"cities\"");
    }

    #[test]
    fn test_or_predicates_are_grouped_before_soft_delete() {
        let mut stmt = Statement {
            model: Some(city_meta()),
            ..Default::default()
        };
        stmt.push_predicate(Connective::And, crate::expr!("name = ?", "a"));
        stmt.push_predicate(Connective::Or, crate::expr!("name = ?", "b"));
        let (sql, vars) = stmt.build_select(Dialect::Sqlite).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"cities\" WHERE (name = ? OR name = ?) AND \"cities\".\"deleted_at\" IS NULL"
        );
        assert_eq!(vars, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_not_predicate() {
        let mut stmt = Statement {
            table: Some("users".into()),
            ..Default::default()
        };
        stmt.push_predicate(Connective::Not, crate::expr!("age > ? OR age < ?", 60, 18));
        let (sql, _) = stmt.build_select(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE NOT (age > ? OR age < ?)");
    }

    #[test]
    fn test_offset_without_limit() {
        let stmt = Statement {
            table: Some("users".into()),
            offset: Some(5),
            ..Default::default()
        };
        let (sql, vars) = stmt.build_select(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" LIMIT -1 OFFSET ?");
        assert_eq!(vars, vec![Value::Integer(5)]);
    }

    #[test]
    fn test_count_drops_order_and_limit() {
        let stmt = Statement {
            table: Some("users".into()),
            orders: vec!["name".into()],
            limit: Some(3),
            ..Default::default()
        };
        let (sql, vars) = stmt.build_count(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT count(*) FROM \"users\"");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_count_grouped_uses_subquery() {
        let stmt = Statement {
            table: Some("users".into()),
            group_by: vec!["\"role\"".into()],
            ..Default::default()
        };
        let (sql, _) = stmt.build_count(Dialect::Sqlite).unwrap();
        assert_eq!(
            sql,
            "SELECT count(*) FROM (SELECT * FROM \"users\" GROUP BY \"role\")"
        );
    }

    #[test]
    fn test_update_requires_conditions() {
        let stmt = Statement {
            table: Some("users".into()),
            ..Default::default()
        };
        let assignments = vec![("name".to_owned(), Value::from("x"))];
        assert!(matches!(
            stmt.build_update(Dialect::Sqlite, assignments.clone(), false),
            Err(Error::MissingWhereClause)
        ));
        let (sql, _) = stmt
            .build_update(Dialect::Sqlite, assignments, true)
            .unwrap();
        assert_eq!(sql, "UPDATE \"users\" SET \"name\"=?");
    }

    #[test]
    fn test_insert_multiple_rows() {
        let stmt = Statement::default();
        let meta = city_meta();
        let columns = vec!["name".to_owned()];
        let rows = vec![vec![Value::from("a")], vec![Value::from("b")]];
        let (sql, vars) = stmt
            .build_insert(Dialect::Sqlite, &meta, &columns, &rows)
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"cities\" (\"name\") VALUES (?),(?) RETURNING \"id\""
        );
        assert_eq!(vars.len(), 2);
    }
}

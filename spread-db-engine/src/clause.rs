// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Query fragments accepted by the builder methods.

use std::collections::{BTreeMap, HashMap};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::model::{Model, to_record};
use crate::value::Value;

/// Build an [`Expr`] from a SQL fragment and positional arguments.
///
/// ```
/// use spread_db_engine::expr;
///
/// let e = expr!("age > ? AND name = ?", 20, "A");
/// assert_eq!(e.vars.len(), 2);
/// ```
#[macro_export]
macro_rules! expr {
    ($sql:expr $(, $var:expr)* $(,)?) => {
        $crate::Expr::new($sql, ::std::vec![$($crate::Value::from($var)),*])
    };
}

/// A literal SQL fragment with `?` placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expr {
    pub sql: String,
    pub vars: Vec<Value>,
}

impl Expr {
    pub fn new(sql: impl Into<String>, vars: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            vars,
        }
    }

    /// Check that the number of placeholders matches the bound arguments.
    pub(crate) fn validate(&self) -> Result<()> {
        let placeholders = count_placeholders(&self.sql);
        if placeholders != self.vars.len() {
            return Err(Error::invalid(format!(
                "'{}' has {} placeholders but {} arguments",
                self.sql,
                placeholders,
                self.vars.len()
            )));
        }
        Ok(())
    }
}

impl From<&str> for Expr {
    fn from(sql: &str) -> Self {
        Self::new(sql, Vec::new())
    }
}

impl From<String> for Expr {
    fn from(sql: String) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Count `?` placeholders outside of quoted literals and identifiers.
fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '?') => count += 1,
            _ => {}
        }
    }
    count
}

/// A filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Literal SQL with positional arguments.
    Expr(Expr),
    /// Column equality, joined with `AND`.
    Eq(Vec<(String, Value)>),
    /// A condition that could not be built; applying it records an error.
    Invalid(String),
}

impl Condition {
    /// Equality on a single column.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(vec![(column.into(), value.into())])
    }

    /// Use a record as a template: every non-zero field becomes an equality.
    pub fn template<T: Model>(record: &T) -> Self {
        match to_record(record) {
            Ok(map) => Condition::Eq(
                map.iter()
                    .map(|(column, json)| (column.clone(), Value::from_json(json)))
                    .filter(|(_, value)| !value.is_zero())
                    .collect(),
            ),
            Err(e) => Condition::Invalid(e.to_string()),
        }
    }

    /// Resolve into SQL. An empty equality set yields no predicate.
    pub(crate) fn into_expr(self, dialect: Dialect) -> Result<Option<Expr>> {
        match self {
            Condition::Expr(expr) => {
                expr.validate()?;
                Ok(Some(expr))
            }
            Condition::Eq(pairs) if pairs.is_empty() => Ok(None),
            Condition::Eq(pairs) => {
                let sql = pairs
                    .iter()
                    .map(|(column, value)| match value {
                        Value::Null => format!("{} IS NULL", dialect.quote(column)),
                        _ => format!("{} = ?", dialect.quote(column)),
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                let vars = pairs
                    .into_iter()
                    .map(|(_, value)| value)
                    .filter(|value| *value != Value::Null)
                    .collect();
                Ok(Some(Expr::new(sql, vars)))
            }
            Condition::Invalid(reason) => Err(Error::InvalidQuery(reason)),
        }
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Condition::Expr(expr)
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Condition::Expr(sql.into())
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Condition::Expr(sql.into())
    }
}

impl From<BTreeMap<String, Value>> for Condition {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Condition::Eq(map.into_iter().collect())
    }
}

impl From<HashMap<String, Value>> for Condition {
    fn from(map: HashMap<String, Value>) -> Self {
        // Sorted so the compiled SQL is stable
        Condition::Eq(map.into_iter().collect::<BTreeMap<_, _>>().into_iter().collect())
    }
}

/// Projection for `select` and `distinct`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// A SQL fragment such as `"role, count(*) as count"`.
    Expr(Expr),
    /// Plain column names, quoted on render.
    Columns(Vec<String>),
}

impl Selection {
    pub(crate) fn render(self, dialect: Dialect) -> Result<Vec<Expr>> {
        match self {
            Selection::Expr(expr) => {
                expr.validate()?;
                if expr.vars.is_empty() {
                    Ok(vec![Expr::from(dialect.quote_if_ident(&expr.sql))])
                } else {
                    Ok(vec![expr])
                }
            }
            Selection::Columns(columns) => Ok(columns
                .iter()
                .map(|column| Expr::from(dialect.quote_if_ident(column)))
                .collect()),
        }
    }
}

impl From<&str> for Selection {
    fn from(sql: &str) -> Self {
        Selection::Expr(sql.into())
    }
}

impl From<String> for Selection {
    fn from(sql: String) -> Self {
        Selection::Expr(sql.into())
    }
}

impl From<Expr> for Selection {
    fn from(expr: Expr) -> Self {
        Selection::Expr(expr)
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(columns: [&str; N]) -> Self {
        Selection::Columns(columns.iter().map(|c| (*c).to_owned()).collect())
    }
}

impl From<&[&str]> for Selection {
    fn from(columns: &[&str]) -> Self {
        Selection::Columns(columns.iter().map(|c| (*c).to_owned()).collect())
    }
}

impl From<Vec<&str>> for Selection {
    fn from(columns: Vec<&str>) -> Self {
        Selection::Columns(columns.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<String>> for Selection {
    fn from(columns: Vec<String>) -> Self {
        Selection::Columns(columns)
    }
}

/// One column of an `ORDER BY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByColumn {
    pub column: String,
    pub desc: bool,
}

/// Ordering for `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    /// Literal SQL such as `"created_at desc, name"`.
    Expr(String),
    Columns(Vec<OrderByColumn>),
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy::Columns(vec![OrderByColumn {
            column: column.into(),
            desc: false,
        }])
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy::Columns(vec![OrderByColumn {
            column: column.into(),
            desc: true,
        }])
    }

    pub fn then_asc(self, column: impl Into<String>) -> Self {
        self.then(column.into(), false)
    }

    pub fn then_desc(self, column: impl Into<String>) -> Self {
        self.then(column.into(), true)
    }

    fn then(self, column: String, desc: bool) -> Self {
        let mut columns = match self {
            OrderBy::Expr(sql) => vec![OrderByColumn {
                column: sql,
                desc: false,
            }],
            OrderBy::Columns(columns) => columns,
        };
        columns.push(OrderByColumn { column, desc });
        OrderBy::Columns(columns)
    }

    pub(crate) fn render(&self, dialect: Dialect) -> String {
        match self {
            OrderBy::Expr(sql) => sql.clone(),
            OrderBy::Columns(columns) => columns
                .iter()
                .map(|c| {
                    let column = dialect.quote_if_ident(&c.column);
                    if c.desc {
                        format!("{column} DESC")
                    } else {
                        column
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&str> for OrderBy {
    fn from(sql: &str) -> Self {
        OrderBy::Expr(sql.to_owned())
    }
}

impl From<String> for OrderBy {
    fn from(sql: String) -> Self {
        OrderBy::Expr(sql)
    }
}

impl From<OrderByColumn> for OrderBy {
    fn from(column: OrderByColumn) -> Self {
        OrderBy::Columns(vec![column])
    }
}

/// Column assignments for `updates` and `update_columns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignments {
    pairs: Vec<(String, Value)>,
    invalid: Option<String>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an assignment.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column.into(), value.into());
        self
    }

    /// Every non-zero field of `record` except its primary key.
    pub fn non_zero<T: Model>(record: &T) -> Self {
        Self::from_record(record, true)
    }

    /// Every field of `record` except its primary key.
    pub fn all<T: Model>(record: &T) -> Self {
        Self::from_record(record, false)
    }

    fn from_record<T: Model>(record: &T, skip_zero: bool) -> Self {
        match to_record(record) {
            Ok(map) => Self {
                pairs: map
                    .iter()
                    .filter(|(column, _)| column.as_str() != T::PRIMARY_KEY)
                    .map(|(column, json)| (column.clone(), Value::from_json(json)))
                    .filter(|(_, value)| !skip_zero || !value.is_zero())
                    .collect(),
                invalid: None,
            },
            Err(e) => Self {
                pairs: Vec::new(),
                invalid: Some(e.to_string()),
            },
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.pairs.iter().any(|(c, _)| c == column)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub(crate) fn push(&mut self, column: String, value: Value) {
        match self.pairs.iter_mut().find(|(c, _)| *c == column) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((column, value)),
        }
    }

    pub(crate) fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.pairs.retain(|(c, _)| keep(c));
    }

    pub(crate) fn check(&self) -> Result<()> {
        match &self.invalid {
            Some(reason) => Err(Error::InvalidQuery(reason.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn into_pairs(self) -> Vec<(String, Value)> {
        self.pairs
    }
}

impl From<BTreeMap<String, Value>> for Assignments {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self {
            pairs: map.into_iter().collect(),
            invalid: None,
        }
    }
}

impl From<HashMap<String, Value>> for Assignments {
    fn from(map: HashMap<String, Value>) -> Self {
        map.into_iter().collect::<BTreeMap<_, _>>().into()
    }
}

impl<V: Into<Value>> From<Vec<(&str, V)>> for Assignments {
    fn from(pairs: Vec<(&str, V)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |acc, (column, value)| acc.set(column, value))
    }
}

/// What to do when an insert hits a uniqueness conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    DoNothing,
    /// Overwrite every inserted column except the conflict target.
    UpdateAll,
    Update(Vec<String>),
}

/// `ON CONFLICT` clause for inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnConflict {
    /// Conflict target; empty means the model's primary key.
    pub columns: Vec<String>,
    pub action: ConflictAction,
}

impl OnConflict {
    pub fn do_nothing() -> Self {
        Self {
            columns: Vec::new(),
            action: ConflictAction::DoNothing,
        }
    }

    pub fn update_all() -> Self {
        Self {
            columns: Vec::new(),
            action: ConflictAction::UpdateAll,
        }
    }

    pub fn update<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: Vec::new(),
            action: ConflictAction::Update(columns.into_iter().map(Into::into).collect()),
        }
    }

    /// Set the conflict target.
    pub fn on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn render(&self, dialect: Dialect, primary_key: &str, inserted: &[String]) -> String {
        let target = if self.columns.is_empty() {
            vec![primary_key.to_owned()]
        } else {
            self.columns.clone()
        };
        let target_sql = target
            .iter()
            .map(|c| dialect.quote(c))
            .collect::<Vec<_>>()
            .join(",");
        let updated: Vec<&String> = match &self.action {
            ConflictAction::DoNothing => Vec::new(),
            ConflictAction::UpdateAll => inserted.iter().filter(|c| !target.contains(c)).collect(),
            ConflictAction::Update(columns) => columns.iter().collect(),
        };
        if updated.is_empty() {
            return format!(" ON CONFLICT ({target_sql}) DO NOTHING");
        }
        let set = updated
            .iter()
            .map(|c| format!("{0}=excluded.{0}", dialect.quote(c)))
            .collect::<Vec<_>>()
            .join(",");
        format!(" ON CONFLICT ({target_sql}) DO UPDATE SET {set}")
    }
}

/// Extra clauses attached with `clauses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    OnConflict(OnConflict),
}

impl From<OnConflict> for Clause {
    fn from(on_conflict: OnConflict) -> Self {
        Clause::OnConflict(on_conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::none("name = 'a?'", 0)]
    #[case::two("age > ? AND name = ?", 2)]
    #[case::quoted_ident("\"we?ird\" = ?", 1)]
    fn test_count_placeholders(#[case] sql: &str, #[case] expected: usize) {
        assert_eq!(count_placeholders(sql), expected);
    }

    #[test]
    fn test_expr_macro_validates() {
        assert!(crate::expr!("a = ?", 1).validate().is_ok());
        assert!(crate::expr!("a = ? AND b = ?", 1).validate().is_err());
    }

    #[test]
    fn test_map_condition() {
        let mut map = BTreeMap::new();
        map.insert("name".to_owned(), Value::from("A"));
        map.insert("deleted_at".to_owned(), Value::Null);
        let expr = Condition::from(map)
            .into_expr(Dialect::Sqlite)
            .unwrap()
            .unwrap();
        assert_eq!(expr.sql, "\"deleted_at\" IS NULL AND \"name\" = ?");
        assert_eq!(expr.vars, vec![Value::from("A")]);
    }

    #[test]
    fn test_order_render() {
        let order = OrderBy::asc("age").then_desc("score");
        assert_eq!(order.render(Dialect::Sqlite), "\"age\", \"score\" DESC");
        assert_eq!(
            OrderBy::from("created_at desc, name").render(Dialect::Sqlite),
            "created_at desc, name"
        );
    }

    #[test]
    fn test_on_conflict_render() {
        let inserted = vec!["id".to_owned(), "name".to_owned()];
        assert_eq!(
            OnConflict::update_all().render(Dialect::Sqlite, "id", &inserted),
            " ON CONFLICT (\"id\") DO UPDATE SET \"name\"=excluded.\"name\""
        );
        assert_eq!(
            OnConflict::do_nothing()
                .on(["name"])
                .render(Dialect::Sqlite, "id", &inserted),
            " ON CONFLICT (\"name\") DO NOTHING"
        );
    }
}

//! Typed builders for the dynamic SQL used by partial updates and listings
//!
//! Both builders accumulate `(column, value)` pairs in call order and number
//! placeholders `?1, ?2, ...` in that same order, so the generated text is
//! deterministic for a given set of supplied fields.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A value bound to a positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

/// Bind values onto a query in placeholder order.
pub fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: Vec<SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
    }
    query
}

/// `UPDATE <table> SET ... WHERE <key> = ?n` touching only supplied columns.
#[derive(Debug)]
pub struct UpdateQuery {
    table: &'static str,
    assignments: Vec<(&'static str, SqlValue)>,
    timestamps: Vec<&'static str>,
}

impl UpdateQuery {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: SqlValue) -> &mut Self {
        self.assignments.push((column, value));
        self
    }

    /// Refresh a timestamp column to the database's current time.
    pub fn touch(&mut self, column: &'static str) -> &mut Self {
        self.timestamps.push(column);
        self
    }

    pub fn build(self, key_column: &str, key: i64) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::with_capacity(self.assignments.len() + self.timestamps.len());
        let mut values = Vec::with_capacity(self.assignments.len() + 1);

        for (column, value) in self.assignments {
            values.push(value);
            clauses.push(format!("{} = ?{}", column, values.len()));
        }
        for column in self.timestamps {
            clauses.push(format!("{} = CURRENT_TIMESTAMP", column));
        }

        values.push(SqlValue::Int(key));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            self.table,
            clauses.join(", "),
            key_column,
            values.len()
        );
        (sql, values)
    }
}

/// Banner listing with optional filters and banner-level paging.
///
/// Conditions are templates with a single `{}` standing for the placeholder.
/// They apply to an inner `banner b` selection that is ordered and paged by
/// id before the tag join fans rows out.
#[derive(Debug, Default)]
pub struct ListQuery {
    conditions: Vec<(&'static str, SqlValue)>,
    limit: Option<i64>,
    offset: i64,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, condition: &'static str, value: SqlValue) -> &mut Self {
        self.conditions.push((condition, value));
        self
    }

    pub fn paginate(&mut self, limit: Option<i64>, offset: i64) -> &mut Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn build(self) -> (String, Vec<SqlValue>) {
        let mut values = Vec::with_capacity(self.conditions.len() + 2);
        let mut predicates = Vec::with_capacity(self.conditions.len());

        for (condition, value) in self.conditions {
            values.push(value);
            predicates.push(condition.replace("{}", &format!("?{}", values.len())));
        }

        let mut inner = String::from("SELECT b.id FROM banner b");
        if !predicates.is_empty() {
            inner.push_str(" WHERE ");
            inner.push_str(&predicates.join(" AND "));
        }

        // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
        values.push(SqlValue::Int(self.limit.unwrap_or(-1)));
        let limit_at = values.len();
        values.push(SqlValue::Int(self.offset));
        let offset_at = values.len();
        inner.push_str(&format!(
            " ORDER BY b.id LIMIT ?{} OFFSET ?{}",
            limit_at, offset_at
        ));

        let sql = format!(
            "SELECT b.id, json(b.content) AS content, b.is_active, b.feature_id, \
             b.created_at, b.updated_at, bt.tag_id \
             FROM banner b \
             LEFT JOIN banner_tag bt ON b.id = bt.banner_id \
             WHERE b.id IN ({}) \
             ORDER BY b.id, bt.id",
            inner
        );
        (sql, values)
    }
}

//! Cursor-based pagination
//!
//! A cursor pages on the last seen value of one ordered column. Columns are
//! checked against an allow-list when the cursor is built, before any query
//! text exists, because the column name is interpolated into generated SQL.
//!
//! Ties on the cursor column are not broken here. Callers that need a strict
//! total order must page on a column without duplicates, such as `id`.

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Columns the marketplace feeds page on.
pub const DEFAULT_SORT_COLUMNS: &[&str] = &["created_at", "updated_at", "id", "post_views"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorDirection {
    /// Ascending order, rows strictly after the cursor value
    Forward,
    /// Descending order, rows strictly before the cursor value
    Backward,
}

impl CursorDirection {
    pub fn comparison_operator(&self) -> &'static str {
        match self {
            CursorDirection::Forward => ">",
            CursorDirection::Backward => "<",
        }
    }

    pub fn sort_keyword(&self) -> &'static str {
        match self {
            CursorDirection::Forward => "ASC",
            CursorDirection::Backward => "DESC",
        }
    }
}

/// Last seen value of the cursor column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CursorValue {
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// Position in an ordered result set.
///
/// Only [`Paginator::build_cursor`] creates cursors, so `column` is always a
/// member of the paginator's allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationCursor {
    column: String,
    value: Option<CursorValue>,
    direction: CursorDirection,
    limit: u32,
}

/// Query pieces rendered from a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    /// `"{column} > ?"` or `"{column} < ?"`; absent on the first page
    pub predicate: Option<String>,
    /// `"ORDER BY {column} ASC|DESC LIMIT {n}"`
    pub order_by: String,
    /// Value to bind to the predicate placeholder
    pub bind: Option<CursorValue>,
}

impl PaginationCursor {
    pub fn column(&self) -> &str {
        &self.column
    }

    /// `None` on the first page.
    pub fn value(&self) -> Option<&CursorValue> {
        self.value.as_ref()
    }

    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Render the filter and ordering clauses for a parameterized query.
    ///
    /// The value is never interpolated; it is returned for binding.
    pub fn sql_fragment(&self) -> SqlFragment {
        SqlFragment {
            predicate: self.value.as_ref().map(|_| {
                format!("{} {} ?", self.column, self.direction.comparison_operator())
            }),
            order_by: format!(
                "ORDER BY {} {} LIMIT {}",
                self.column,
                self.direction.sort_keyword(),
                self.limit
            ),
            bind: self.value.clone(),
        }
    }

    /// Whether a row keyed by `key` falls after this cursor.
    pub fn admits(&self, key: &CursorValue) -> bool {
        match &self.value {
            None => true,
            Some(value) => match self.direction {
                CursorDirection::Forward => key > value,
                CursorDirection::Backward => key < value,
            },
        }
    }

    fn advanced_to(&self, value: CursorValue) -> Self {
        Self {
            value: Some(value),
            ..self.clone()
        }
    }
}

/// One slice of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the following page; `None` when nothing remains
    pub next_cursor: Option<PaginationCursor>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Builds cursors restricted to an allow-list of columns.
#[derive(Debug, Clone)]
pub struct Paginator {
    allowed_columns: Vec<String>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_SORT_COLUMNS.iter().copied())
    }
}

impl Paginator {
    pub fn new<I, S>(allowed_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_columns: allowed_columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allowed_columns(&self) -> &[String] {
        &self.allowed_columns
    }

    pub fn is_allowed(&self, column: &str) -> bool {
        self.allowed_columns.iter().any(|allowed| allowed == column)
    }

    /// Validate `column` and `limit` and build a cursor.
    ///
    /// Fails with [`CacheError::DisallowedColumn`] for columns outside the
    /// allow-list and [`CacheError::InvalidArgument`] for a zero limit.
    pub fn build_cursor(
        &self,
        column: &str,
        direction: CursorDirection,
        value: Option<CursorValue>,
        limit: u32,
    ) -> Result<PaginationCursor> {
        if !self.is_allowed(column) {
            return Err(CacheError::DisallowedColumn {
                column: column.to_string(),
            });
        }

        if limit == 0 {
            return Err(CacheError::InvalidArgument(
                "page limit must be at least 1".to_string(),
            ));
        }

        Ok(PaginationCursor {
            column: column.to_string(),
            value,
            direction,
            limit,
        })
    }

    /// Slice an in-memory result set with the same comparison and ordering
    /// the SQL fragment would apply.
    ///
    /// `key_fn` extracts the cursor column's value from a row. The sort is
    /// stable, so rows with equal keys keep their input order.
    pub fn paginate<T, F>(&self, cursor: &PaginationCursor, items: Vec<T>, key_fn: F) -> Page<T>
    where
        F: Fn(&T) -> CursorValue,
    {
        let mut keyed: Vec<(CursorValue, T)> = items
            .into_iter()
            .map(|item| (key_fn(&item), item))
            .filter(|(key, _)| cursor.admits(key))
            .collect();

        keyed.sort_by(|(a, _), (b, _)| match cursor.direction {
            CursorDirection::Forward => a.cmp(b),
            CursorDirection::Backward => b.cmp(a),
        });

        let limit = cursor.limit as usize;
        let has_more = keyed.len() > limit;
        keyed.truncate(limit);

        let next_cursor = if has_more {
            keyed.last().map(|(key, _)| cursor.advanced_to(key.clone()))
        } else {
            None
        };

        Page {
            items: keyed.into_iter().map(|(_, item)| item).collect(),
            next_cursor,
        }
    }
}

//! Warehouse session abstraction
//!
//! Every component receives the session as an explicit `&dyn Warehouse`
//! argument, so a run has exactly one writer and tests can substitute an
//! in-memory handle.

pub mod snowflake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use snowflake::SnowflakeClient;

/// Errors returned by a warehouse session
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Statement rejected ({code}): {message}")]
    Rejected {
        code: String,
        sql_state: Option<String>,
        message: String,
    },

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl WarehouseError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        WarehouseError::Rejected {
            code: code.into(),
            sql_state: None,
            message: message.into(),
        }
    }
}

/// Outcome of one statement: the result set (possibly empty) and DML stats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub rows_affected: Option<u64>,
}

impl StatementResult {
    /// Single-cell result, as returned by `SELECT COUNT(*)`
    pub fn scalar(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            columns: vec![column.into()],
            rows: vec![vec![Some(value.to_string())]],
            rows_affected: None,
        }
    }

    /// Status-only result, as returned by DDL
    pub fn status(message: impl Into<String>) -> Self {
        Self::scalar("status", message.into())
    }

    /// First cell as text
    pub fn first_text(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }

    /// First cell parsed as an unsigned integer
    pub fn scalar_u64(&self) -> Result<u64, WarehouseError> {
        let text = self
            .first_text()
            .ok_or_else(|| WarehouseError::Protocol("expected a single value, got none".into()))?;
        parse_count(text)
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Sum of an integer column across all rows, `None` if the column is absent
    pub fn sum_column(&self, name: &str) -> Result<Option<u64>, WarehouseError> {
        let Some(index) = self.column_index(name) else {
            return Ok(None);
        };

        let mut total = 0u64;
        for row in &self.rows {
            if let Some(Some(cell)) = row.get(index) {
                total = total.saturating_add(parse_count(cell)?);
            }
        }
        Ok(Some(total))
    }
}

fn parse_count(text: &str) -> Result<u64, WarehouseError> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| WarehouseError::Protocol(format!("expected a non-negative integer, got '{}'", text)))
}

/// Session settings a statement runs under.
///
/// Each SQL API request is its own session, so `USE ...` statements cannot
/// carry over from one request to the next. Scripts record them here
/// instead (see [`StatementContext::apply_use`]) and every later request
/// sends the overrides. Unset fields fall back to the connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementContext {
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
}

impl StatementContext {
    /// Record `sql` if it is a plain `USE [ROLE|WAREHOUSE|DATABASE|SCHEMA] <name>`.
    ///
    /// Returns `false`, leaving the context untouched, for any other
    /// statement (including `USE` forms with quoted or unusual names, which
    /// are left to the warehouse).
    pub fn apply_use(&mut self, sql: &str) -> bool {
        let words: Vec<&str> = strip_leading_comments(sql).split_whitespace().collect();
        let (kind, name) = match words.as_slice() {
            [use_kw, name] if use_kw.eq_ignore_ascii_case("USE") => ("DATABASE", *name),
            [use_kw, kind, name] if use_kw.eq_ignore_ascii_case("USE") => (*kind, *name),
            _ => return false,
        };

        let parts: Vec<&str> = name.split('.').collect();
        if !parts.iter().all(|p| is_identifier(p)) {
            return false;
        }

        match (kind.to_ascii_uppercase().as_str(), parts.as_slice()) {
            ("ROLE", [role]) => self.role = Some(role.to_string()),
            ("WAREHOUSE", [warehouse]) => self.warehouse = Some(warehouse.to_string()),
            ("DATABASE", [database]) => {
                self.database = Some(database.to_string());
                self.schema = None;
            },
            ("SCHEMA", [schema]) => self.schema = Some(schema.to_string()),
            ("SCHEMA", [database, schema]) => {
                self.database = Some(database.to_string());
                self.schema = Some(schema.to_string());
            },
            _ => return false,
        }
        true
    }
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map(|(_, tail)| tail).unwrap_or_default();
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map(|(_, tail)| tail).unwrap_or_default();
        } else {
            return rest;
        }
        rest = rest.trim_start();
    }
}

/// A session able to run SQL statements against the warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute one statement under `context`.
    ///
    /// `bindings` fill positional `?` placeholders as TEXT values. The
    /// pipeline's own statements are DDL, bulk loads and counts over
    /// validated identifiers, none of which accept bind variables, so they
    /// pass an empty slice; the parameter exposes the SQL API's binding
    /// support for ad-hoc queries.
    async fn execute_in(
        &self,
        context: &StatementContext,
        sql: &str,
        bindings: &[String],
    ) -> Result<StatementResult, WarehouseError>;

    /// Execute one statement with the connection settings
    async fn execute(&self, sql: &str) -> Result<StatementResult, WarehouseError> {
        self.execute_in(&StatementContext::default(), sql, &[]).await
    }

    /// Execute a single-value count query
    async fn count(&self, sql: &str) -> Result<u64, WarehouseError> {
        self.execute(sql).await?.scalar_u64()
    }
}

/// Validated, possibly qualified, table identifier such as `RAW.yellow_taxi_trips`.
///
/// Only unquoted identifier characters are accepted, so the name can be
/// interpolated into statement text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unqualified last part
    pub fn table(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

pub(crate) fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

impl FromStr for TableName {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.is_empty() || parts.len() > 3 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(WarehouseError::InvalidIdentifier(s.to_string()));
        }
        Ok(TableName(trimmed.to_string()))
    }
}

impl TryFrom<String> for TableName {
    type Error = WarehouseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote a value as a SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

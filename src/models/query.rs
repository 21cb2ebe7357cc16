//! Query-related data models.
//!
//! This module defines the declarative table/column/join selection that the
//! query builder turns into a SELECT statement.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default row limit for previews.
pub const DEFAULT_PREVIEW_LIMIT: u32 = 100;

/// Maximum allowed preview row limit.
pub const MAX_PREVIEW_LIMIT: u32 = 10000;

/// Kind of join between the base table and the other table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// SQL keyword for this join kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
        }
    }

    /// Parse a join kind, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INNER" => Some(Self::Inner),
            "LEFT" => Some(Self::Left),
            "RIGHT" => Some(Self::Right),
            "FULL" | "FULL OUTER" => Some(Self::Full),
            _ => None,
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One equality condition between the two joined tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeyPair {
    #[serde(alias = "first_table_key")]
    pub left_key: String,
    #[serde(alias = "second_table_key")]
    pub right_key: String,
}

impl JoinKeyPair {
    pub fn new(left_key: impl Into<String>, right_key: impl Into<String>) -> Self {
        Self {
            left_key: left_key.into(),
            right_key: right_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(alias = "second_table")]
    pub other_table: String,
    #[serde(default, alias = "join_type")]
    pub join_kind: JoinKind,
    #[serde(alias = "join_keys")]
    pub key_pairs: Vec<JoinKeyPair>,
}

impl JoinConfig {
    /// Create a join with no key pairs yet.
    pub fn new(other_table: impl Into<String>, join_kind: JoinKind) -> Self {
        Self {
            other_table: other_table.into(),
            join_kind,
            key_pairs: Vec::new(),
        }
    }

    /// Add an equality condition.
    pub fn on(mut self, left_key: impl Into<String>, right_key: impl Into<String>) -> Self {
        self.key_pairs.push(JoinKeyPair::new(left_key, right_key));
        self
    }
}

/// Declarative description of a table projection and optional join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(alias = "table_name")]
    pub table: String,
    /// Empty selects every column
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, alias = "join_config", skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinConfig>,
}

impl QuerySpec {
    /// Select every column of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            join: None,
        }
    }

    /// Set the projected columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Join another table.
    pub fn with_join(mut self, join: JoinConfig) -> Self {
        self.join = Some(join);
        self
    }

    /// Names of every table this spec reads.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.table.as_str()];
        if let Some(join) = &self.join {
            tables.push(join.other_table.as_str());
        }
        tables
    }
}

/// Clamp a requested preview limit to `[1, max]`, falling back to `default`.
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

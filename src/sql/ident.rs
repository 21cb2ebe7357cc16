//! Validated SQL identifiers.
//!
//! An [`Ident`] is the only way a table or column name reaches rendered SQL.
//! Names of existing objects are handed out by the schema allow-list after a
//! lookup; names of objects about to be created pass [`Ident::new_object`].

use crate::error::{ConnectorError, ConnectorResult};
use std::fmt;

/// Longest identifier accepted for a new object, in bytes.
pub const MAX_IDENT_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    name: String,
}

impl Ident {
    /// Wrap a name confirmed to exist by a schema lookup.
    pub(crate) fn from_schema(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Validate the name of a table or column that does not exist yet.
    ///
    /// Rejects empty names, names longer than [`MAX_IDENT_LEN`], control
    /// characters, backticks and backslashes.
    pub fn new_object(name: &str) -> ConnectorResult<Self> {
        if name.trim().is_empty() {
            return Err(ConnectorError::invalid_input("Identifier cannot be empty"));
        }
        if name.len() > MAX_IDENT_LEN {
            return Err(ConnectorError::invalid_input(format!(
                "Identifier exceeds {} bytes: '{}...'",
                MAX_IDENT_LEN,
                name.chars().take(32).collect::<String>()
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| c.is_control() || *c == '`' || *c == '\\')
        {
            return Err(ConnectorError::invalid_input(format!(
                "Identifier '{}' contains forbidden character {:?}",
                name.escape_debug(),
                bad
            )));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// The raw name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name as a backtick-quoted ClickHouse identifier.
    ///
    /// An embedded backtick is doubled and a backslash is escaped with a
    /// backslash.
    pub fn quoted(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + 2);
        out.push('`');
        for c in self.name.chars() {
            match c {
                '`' => out.push('`'),
                '\\' => out.push('\\'),
                _ => {}
            }
            out.push(c);
        }
        out.push('`');
        out
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

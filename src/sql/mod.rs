//! SQL construction.
//!
//! - `ident`: validated, quoted identifiers
//! - `builder`: schema allow-list and SELECT / CREATE / INSERT rendering
//! - `guard`: read-only check on rendered SELECT statements

pub mod builder;
pub mod guard;
pub mod ident;

pub use builder::{
    AllowedTable, CreateStatement, DEFAULT_ENGINE_CLAUSE, InsertStatement, ProjectedColumn,
    QueryBuilder, RenderedJoin, SchemaAllowList, SelectStatement, render_create, render_insert,
};
pub use ident::Ident;

//! Query construction.
//!
//! Turns a [`QuerySpec`] into a SELECT, and a column list into CREATE and
//! INSERT statements. Identifiers come only from a [`SchemaAllowList`] built
//! from prior schema lookups, or from [`Ident::new_object`] for objects that
//! do not exist yet; caller-supplied strings are never spliced into SQL.

use crate::db::types::ColumnType;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::schema::ensure_unique_columns;
use crate::models::{ColumnSchema, JoinKind, QuerySpec, TableSchema};
use crate::sql::guard;
use crate::sql::ident::Ident;
use std::collections::HashSet;
use tracing::debug;

/// Storage clause appended to every CREATE TABLE.
pub const DEFAULT_ENGINE_CLAUSE: &str = "ENGINE = MergeTree() ORDER BY tuple()";

// =============================================================================
// Schema Allow-List
// =============================================================================

/// Tables and columns confirmed to exist by a schema lookup.
#[derive(Debug, Clone, Default)]
pub struct SchemaAllowList {
    tables: Vec<TableSchema>,
}

impl SchemaAllowList {
    /// Build an allow-list from described tables.
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    /// Resolve a table name, failing with `SchemaMismatch` if it was not described.
    pub fn table(&self, name: &str) -> ConnectorResult<AllowedTable<'_>> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|schema| AllowedTable {
                ident: Ident::from_schema(&schema.name),
                schema,
            })
            .ok_or_else(|| {
                ConnectorError::schema_mismatch(format!("Table '{}' does not exist", name), name)
            })
    }
}

/// A table from the allow-list.
#[derive(Debug, Clone)]
pub struct AllowedTable<'a> {
    ident: Ident,
    schema: &'a TableSchema,
}

impl<'a> AllowedTable<'a> {
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    pub fn schema(&self) -> &'a TableSchema {
        self.schema
    }

    /// Resolve a column, failing with `SchemaMismatch` if the table lacks it.
    pub fn column(&self, name: &str) -> ConnectorResult<(Ident, &'a ColumnSchema)> {
        self.schema
            .column(name)
            .map(|c| (Ident::from_schema(&c.name), c))
            .ok_or_else(|| {
                ConnectorError::schema_mismatch(
                    format!(
                        "Column '{}' does not exist in table '{}'",
                        name, self.schema.name
                    ),
                    format!("{}.{}", self.schema.name, name),
                )
            })
    }
}

// =============================================================================
// Rendered Statements
// =============================================================================

/// One output column of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub table: String,
    pub column: String,
    /// Name of the column in the result (the requested name)
    pub output_name: String,
    pub column_type: ColumnType,
}

/// The resolved join of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedJoin {
    pub other_table: String,
    pub kind: JoinKind,
    pub keys: Vec<(String, String)>,
}

/// A SELECT built from a validated [`QuerySpec`].
#[derive(Debug, Clone)]
pub struct SelectStatement {
    sql: String,
    table: String,
    /// Empty for `*`
    projection: Vec<ProjectedColumn>,
    join: Option<RenderedJoin>,
    limit: Option<u32>,
}

impl SelectStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn projection(&self) -> &[ProjectedColumn] {
        &self.projection
    }

    pub fn join(&self) -> Option<&RenderedJoin> {
        self.join.as_ref()
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// True if the statement selects `*`.
    pub fn is_wildcard(&self) -> bool {
        self.projection.is_empty()
    }
}

/// A CREATE TABLE for a table that does not exist yet.
#[derive(Debug, Clone)]
pub struct CreateStatement {
    sql: String,
    table: String,
    columns: Vec<ColumnSchema>,
}

impl CreateStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }
}

/// An INSERT header; rows travel separately as JSONEachRow.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    sql: String,
    table: String,
    columns: Vec<ColumnSchema>,
}

impl InsertStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Renders SELECT statements against an allow-list.
pub struct QueryBuilder<'a> {
    allow_list: &'a SchemaAllowList,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(allow_list: &'a SchemaAllowList) -> Self {
        Self { allow_list }
    }

    /// Render `spec` as a SELECT, optionally bounded by `limit`.
    ///
    /// Fails with `SchemaMismatch` if any table or column is not in the
    /// allow-list, and with `InvalidInput` for an unusable join or a
    /// duplicated column.
    pub fn render_select(
        &self,
        spec: &QuerySpec,
        limit: Option<u32>,
    ) -> ConnectorResult<SelectStatement> {
        let base = self.allow_list.table(&spec.table)?;

        let joined = match &spec.join {
            Some(join) => {
                if join.key_pairs.is_empty() {
                    return Err(ConnectorError::invalid_input(
                        "A join needs at least one key pair",
                    ));
                }
                if join.other_table == spec.table {
                    return Err(ConnectorError::invalid_input(format!(
                        "Cannot join table '{}' to itself",
                        spec.table
                    )));
                }
                Some((join, self.allow_list.table(&join.other_table)?))
            }
            None => None,
        };

        let projection = resolve_projection(
            &spec.columns,
            &base,
            joined.as_ref().map(|(_, other)| other),
        )?;

        let mut sql = String::from("SELECT ");
        if projection.is_empty() {
            sql.push('*');
        } else {
            let rendered: Vec<String> = projection
                .iter()
                .map(|p| render_projected(p, joined.is_some()))
                .collect();
            sql.push_str(&rendered.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&base.ident().quoted());

        let mut rendered_join = None;
        if let Some((join, other)) = &joined {
            let mut conditions = Vec::with_capacity(join.key_pairs.len());
            let mut keys = Vec::with_capacity(join.key_pairs.len());
            for pair in &join.key_pairs {
                let (left, _) = base.column(&pair.left_key)?;
                let (right, _) = other.column(&pair.right_key)?;
                conditions.push(format!(
                    "{}.{} = {}.{}",
                    base.ident(),
                    left,
                    other.ident(),
                    right
                ));
                keys.push((left.name().to_string(), right.name().to_string()));
            }
            sql.push_str(&format!(
                " {} JOIN {} ON {}",
                join.join_kind.keyword(),
                other.ident(),
                conditions.join(" AND ")
            ));
            rendered_join = Some(RenderedJoin {
                other_table: other.schema().name.clone(),
                kind: join.join_kind,
                keys,
            });
        }

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        guard::ensure_read_only(&sql)?;
        debug!(sql = %sql, "Rendered SELECT");

        Ok(SelectStatement {
            sql,
            table: base.schema().name.clone(),
            projection,
            join: rendered_join,
            limit,
        })
    }
}

/// Resolve requested column names against the base and joined tables.
///
/// A bare name resolves to the base table first, then the joined table. A
/// name with no exact match that looks like `table.column` resolves against
/// the named table.
fn resolve_projection(
    requested: &[String],
    base: &AllowedTable<'_>,
    other: Option<&AllowedTable<'_>>,
) -> ConnectorResult<Vec<ProjectedColumn>> {
    let mut seen = HashSet::new();
    let mut projection = Vec::with_capacity(requested.len());

    for name in requested {
        if !seen.insert(name.as_str()) {
            return Err(ConnectorError::invalid_input(format!(
                "Column '{}' is selected more than once",
                name
            )));
        }

        let mut candidates = vec![base];
        candidates.extend(other);

        let exact = candidates
            .iter()
            .find_map(|t| t.schema().column(name).map(|c| (*t, c)));

        let resolved = match exact {
            Some(found) => Some(found),
            None => name.split_once('.').and_then(|(table, column)| {
                candidates
                    .iter()
                    .find(|t| t.schema().name == table)
                    .and_then(|t| t.schema().column(column).map(|c| (*t, c)))
            }),
        };

        let Some((table, column)) = resolved else {
            let object = match other {
                Some(other) => format!("{}|{}.{}", base.schema().name, other.schema().name, name),
                None => format!("{}.{}", base.schema().name, name),
            };
            return Err(ConnectorError::schema_mismatch(
                format!("Column '{}' is not in the resolved schema", name),
                object,
            ));
        };

        projection.push(ProjectedColumn {
            table: table.schema().name.clone(),
            column: column.name.clone(),
            output_name: name.clone(),
            column_type: column.column_type.clone(),
        });
    }

    Ok(projection)
}

fn render_projected(column: &ProjectedColumn, qualify: bool) -> String {
    let col = Ident::from_schema(&column.column);
    if !qualify && column.output_name == column.column {
        return col.quoted();
    }
    let table = Ident::from_schema(&column.table);
    let alias = Ident::from_schema(&column.output_name);
    format!("{}.{} AS {}", table, col, alias)
}

/// Render a CREATE TABLE for `table` with one definition per column, in order.
pub fn render_create(table: &Ident, columns: &[ColumnSchema]) -> ConnectorResult<CreateStatement> {
    if columns.is_empty() {
        return Err(ConnectorError::invalid_input(
            "Cannot create a table without columns",
        ));
    }
    ensure_unique_columns(columns)?;

    let definitions = columns
        .iter()
        .map(|c| -> ConnectorResult<String> {
            Ok(format!("{} {}", Ident::new_object(&c.name)?, c.column_type))
        })
        .collect::<ConnectorResult<Vec<_>>>()?;

    let sql = format!(
        "CREATE TABLE {} ({}) {}",
        table,
        definitions.join(", "),
        DEFAULT_ENGINE_CLAUSE
    );
    debug!(sql = %sql, "Rendered CREATE TABLE");

    Ok(CreateStatement {
        sql,
        table: table.name().to_string(),
        columns: columns.to_vec(),
    })
}

/// Render the INSERT header for `columns` of `table`.
pub fn render_insert(table: &Ident, columns: &[ColumnSchema]) -> ConnectorResult<InsertStatement> {
    if columns.is_empty() {
        return Err(ConnectorError::invalid_input(
            "Cannot insert without columns",
        ));
    }
    ensure_unique_columns(columns)?;

    let names = columns
        .iter()
        .map(|c| Ident::new_object(&c.name).map(|i| i.quoted()))
        .collect::<ConnectorResult<Vec<_>>>()?;

    let sql = format!(
        "INSERT INTO {} ({}) FORMAT JSONEachRow",
        table,
        names.join(", ")
    );

    Ok(InsertStatement {
        sql,
        table: table.name().to_string(),
        columns: columns.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JoinConfig;

    fn allow_list() -> SchemaAllowList {
        SchemaAllowList::new([
            TableSchema::new("orders")
                .with_column("id", ColumnType::Int32)
                .with_column("amount", ColumnType::Float64)
                .with_column("customer_id", ColumnType::Int32),
            TableSchema::new("customers")
                .with_column("id", ColumnType::Int32)
                .with_column("name", ColumnType::String),
        ])
    }

    #[test]
    fn test_wildcard_when_no_columns() {
        let list = allow_list();
        let stmt = QueryBuilder::new(&list)
            .render_select(&QuerySpec::new("orders"), None)
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM `orders`");
        assert!(stmt.is_wildcard());
    }

    #[test]
    fn test_columns_in_requested_order_with_limit() {
        let list = allow_list();
        let spec = QuerySpec::new("orders").with_columns(["amount", "id"]);
        let stmt = QueryBuilder::new(&list).render_select(&spec, Some(100)).unwrap();
        assert_eq!(stmt.sql(), "SELECT `amount`, `id` FROM `orders` LIMIT 100");
        assert_eq!(stmt.limit(), Some(100));
    }

    #[test]
    fn test_left_join_rendering() {
        let list = allow_list();
        let spec = QuerySpec::new("orders")
            .with_columns(["id", "name"])
            .with_join(JoinConfig::new("customers", JoinKind::Left).on("customer_id", "id"));
        let stmt = QueryBuilder::new(&list).render_select(&spec, None).unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT `orders`.`id` AS `id`, `customers`.`name` AS `name` FROM `orders` \
             LEFT JOIN `customers` ON `orders`.`customer_id` = `customers`.`id`"
        );
        let join = stmt.join().unwrap();
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.keys, vec![("customer_id".to_string(), "id".to_string())]);
    }

    #[test]
    fn test_multiple_key_pairs_conjoined() {
        let list = allow_list();
        let spec = QuerySpec::new("orders").with_join(
            JoinConfig::new("customers", JoinKind::Inner)
                .on("customer_id", "id")
                .on("id", "id"),
        );
        let stmt = QueryBuilder::new(&list).render_select(&spec, None).unwrap();
        assert!(stmt.sql().ends_with(
            "INNER JOIN `customers` ON `orders`.`customer_id` = `customers`.`id` \
             AND `orders`.`id` = `customers`.`id`"
        ));
    }

    #[test]
    fn test_qualified_column_resolves_to_joined_table() {
        let list = allow_list();
        let spec = QuerySpec::new("orders")
            .with_columns(["id", "customers.id"])
            .with_join(JoinConfig::new("customers", JoinKind::Inner).on("customer_id", "id"));
        let stmt = QueryBuilder::new(&list).render_select(&spec, None).unwrap();
        assert!(stmt
            .sql()
            .starts_with("SELECT `orders`.`id` AS `id`, `customers`.`id` AS `customers.id` FROM"));
        assert_eq!(stmt.projection()[1].table, "customers");
    }

    #[test]
    fn test_unknown_column_is_schema_mismatch() {
        let list = allow_list();
        let spec = QuerySpec::new("orders").with_columns(["id", "total"]);
        let err = QueryBuilder::new(&list).render_select(&spec, None).unwrap_err();
        assert!(matches!(err, ConnectorError::SchemaMismatch { .. }));
        assert!(err.to_string().contains("total"));
    }

    #[test]
    fn test_unknown_table_is_schema_mismatch() {
        let list = allow_list();
        let err = QueryBuilder::new(&list)
            .render_select(&QuerySpec::new("users"), None)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_unknown_join_key_is_schema_mismatch() {
        let list = allow_list();
        let spec = QuerySpec::new("orders")
            .with_join(JoinConfig::new("customers", JoinKind::Inner).on("customer_id", "uuid"));
        let err = QueryBuilder::new(&list).render_select(&spec, None).unwrap_err();
        assert!(matches!(err, ConnectorError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_empty_key_pairs_rejected() {
        let list = allow_list();
        let spec =
            QuerySpec::new("orders").with_join(JoinConfig::new("customers", JoinKind::Inner));
        let err = QueryBuilder::new(&list).render_select(&spec, None).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidInput { .. }));
    }

    #[test]
    fn test_self_join_rejected() {
        let list = allow_list();
        let spec = QuerySpec::new("orders")
            .with_join(JoinConfig::new("orders", JoinKind::Inner).on("id", "id"));
        assert!(QueryBuilder::new(&list).render_select(&spec, None).is_err());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let list = allow_list();
        let spec = QuerySpec::new("orders").with_columns(["id", "id"]);
        let err = QueryBuilder::new(&list).render_select(&spec, None).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidInput { .. }));
    }

    #[test]
    fn test_injection_in_column_never_reaches_sql() {
        let list = allow_list();
        let spec = QuerySpec::new("orders").with_columns(["id FROM orders; DROP TABLE orders --"]);
        let err = QueryBuilder::new(&list).render_select(&spec, None).unwrap_err();
        assert!(matches!(err, ConnectorError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_backtick_in_described_table_name() {
        let list = SchemaAllowList::new([
            TableSchema::new("odd`name").with_column("id", ColumnType::Int32),
        ]);
        let builder = QueryBuilder::new(&list);

        let stmt = builder
            .render_select(&QuerySpec::new("odd`name"), Some(10))
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM `odd``name` LIMIT 10");
        assert_eq!(stmt.table(), "odd`name");

        let spec = QuerySpec::new("odd`name").with_columns(["id"]);
        let stmt = builder.render_select(&spec, None).unwrap();
        assert_eq!(stmt.sql(), "SELECT `id` FROM `odd``name`");
    }

    #[test]
    fn test_render_create_one_definition_per_column() {
        let table = Ident::new_object("prices").unwrap();
        let columns = vec![
            ColumnSchema::new("id", ColumnType::Int32),
            ColumnSchema::new("price", ColumnType::Float64.nullable()),
        ];
        let stmt = render_create(&table, &columns).unwrap();
        assert_eq!(
            stmt.sql(),
            "CREATE TABLE `prices` (`id` Int32, `price` Nullable(Float64)) \
             ENGINE = MergeTree() ORDER BY tuple()"
        );
        assert_eq!(stmt.columns(), columns.as_slice());
    }

    #[test]
    fn test_render_create_rejects_bad_columns() {
        let table = Ident::new_object("prices").unwrap();
        assert!(render_create(&table, &[]).is_err());
        assert!(render_create(
            &table,
            &[
                ColumnSchema::new("id", ColumnType::Int32),
                ColumnSchema::new("id", ColumnType::String)
            ]
        )
        .is_err());
        assert!(render_create(&table, &[ColumnSchema::new("a`b", ColumnType::Int32)]).is_err());
    }

    #[test]
    fn test_render_insert() {
        let table = Ident::new_object("prices").unwrap();
        let stmt = render_insert(
            &table,
            &[
                ColumnSchema::new("id", ColumnType::Int32),
                ColumnSchema::new("price", ColumnType::Float64),
            ],
        )
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO `prices` (`id`, `price`) FORMAT JSONEachRow"
        );
        assert_eq!(stmt.table(), "prices");
    }
}

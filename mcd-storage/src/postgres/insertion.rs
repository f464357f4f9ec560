//! Rendering of [`InsertionModel`]s into parameterized upserts.
//!
//! Fact tables are many and structurally similar, so instead of a diesel
//! table definition per table the statement is built from the model.
use std::collections::BTreeMap;

use diesel::{
    pg::Pg,
    query_builder::{BoxedSqlQuery, SqlQuery},
    sql_query,
    sql_types::{BigInt, Text},
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use itertools::Itertools;
use tracing::trace;

use mcd_core::{
    insertion::{ColumnValue, ForeignKeyField, InsertionModel, OnConflict},
    storage::StorageError,
};

use super::{foreign_keys::ForeignKeyResolver, storage_error_from_diesel, PostgresError, PostgresGateway};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Bind {
    Text(String),
    BigInt(i64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl Statement {
    pub fn into_query(self) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
        let mut query = sql_query(self.sql).into_boxed();
        for bind in self.binds {
            query = match bind {
                Bind::Text(v) => query.bind::<Text, _>(v),
                Bind::BigInt(v) => query.bind::<BigInt, _>(v),
            };
        }
        query
    }
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// Adds `value` to the bind list and returns its placeholder.
///
/// NULLs are inlined, a text typed NULL parameter would not be accepted by a
/// numeric column.
pub(crate) fn placeholder(value: &ColumnValue, binds: &mut Vec<Bind>) -> String {
    match value {
        ColumnValue::Null => "NULL".to_string(),
        ColumnValue::Text(v) => {
            binds.push(Bind::Text(v.clone()));
            format!("${}", binds.len())
        }
        ColumnValue::Numeric(v) => {
            binds.push(Bind::Text(v.clone()));
            format!("${}::NUMERIC", binds.len())
        }
        ColumnValue::BigInt(v) => {
            binds.push(Bind::BigInt(*v));
            format!("${}", binds.len())
        }
    }
}

/// Renders the upsert of a model whose foreign keys were resolved to `ids`.
pub(crate) fn render_upsert(
    model: &InsertionModel,
    ids: &BTreeMap<ForeignKeyField, i64>,
) -> Result<Statement, StorageError> {
    let mut binds = Vec::with_capacity(model.ordered_columns.len());
    let mut placeholders = Vec::with_capacity(model.ordered_columns.len());
    for column in model.ordered_columns.iter() {
        let fk = model
            .foreign_keys
            .keys()
            .find(|field| field.column() == *column);
        let value = match fk {
            Some(field) => ColumnValue::BigInt(*ids.get(field).ok_or_else(|| {
                StorageError::NoRelatedEntity(
                    format!("{:?}", field),
                    model.qualified_table(),
                    model.foreign_keys[field].clone(),
                )
            })?),
            None => model
                .column_values
                .get(column)
                .cloned()
                .ok_or_else(|| {
                    StorageError::Unexpected(format!(
                        "No value for column {} of {}",
                        column,
                        model.qualified_table()
                    ))
                })?,
        };
        placeholders.push(placeholder(&value, &mut binds));
    }

    let conflict = match &model.on_conflict {
        OnConflict::DoNothing => "ON CONFLICT DO NOTHING".to_string(),
        OnConflict::Update { key } => {
            let updates = model
                .ordered_columns
                .iter()
                .filter(|c| !key.contains(c))
                .map(|c| format!("{0} = EXCLUDED.{0}", quote(c)))
                .join(", ");
            let target = key.iter().map(|c| quote(c)).join(", ");
            if updates.is_empty() {
                format!("ON CONFLICT ({}) DO NOTHING", target)
            } else {
                format!("ON CONFLICT ({}) DO UPDATE SET {}", target, updates)
            }
        }
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) {}",
        model.qualified_table(),
        model
            .ordered_columns
            .iter()
            .map(|c| quote(c))
            .join(", "),
        placeholders.join(", "),
        conflict
    );
    Ok(Statement { sql, binds })
}

impl PostgresGateway {
    /// Resolves the foreign keys of a model and upserts it.
    ///
    /// Returns the number of inserted or updated rows, zero if the row was
    /// already present and the model's conflict policy is to do nothing.
    pub(crate) async fn upsert_model(
        &self,
        model: &InsertionModel,
        resolver: &mut ForeignKeyResolver,
        conn: &mut AsyncPgConnection,
    ) -> Result<usize, PostgresError> {
        let ids = resolver
            .resolve_model(model, conn)
            .await?;
        let statement = render_upsert(model, &ids)?;
        trace!(sql = %statement.sql, "UpsertModel");
        let affected = statement
            .into_query()
            .execute(conn)
            .await
            .map_err(|err| storage_error_from_diesel(err, model.table, ""))?;
        Ok(affected)
    }
}

//! Unified SQL EntityStore implementation.
//!
//! Entity tables are described at runtime by an [`EntitySchema`], so column
//! identifiers are built with `Alias` rather than `Iden` enums.

use std::marker::PhantomData;

use sea_query::{Alias, ColumnDef, Table, TableCreateStatement};

use super::SqlDatabase;
use crate::entity::{ColumnKind, EntitySchema};

/// SQL-based implementation of EntityStore.
pub struct SqlEntityStore<DB: SqlDatabase> {
    pool: DB::Pool,
    schema: &'static EntitySchema,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlEntityStore<DB> {
    /// Create a new SQL entity store for `schema` with the given pool.
    pub fn new(pool: DB::Pool, schema: &'static EntitySchema) -> Self {
        Self {
            pool,
            schema,
            _marker: PhantomData,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }
}

/// `CREATE TABLE IF NOT EXISTS` for an entity schema, with a surrogate id.
fn create_entity_table(schema: &EntitySchema) -> TableCreateStatement {
    let mut table = Table::create();
    table.table(Alias::new(schema.table)).if_not_exists().col(
        ColumnDef::new(Alias::new("id"))
            .integer()
            .not_null()
            .auto_increment()
            .primary_key(),
    );

    for column in schema.columns {
        let mut def = ColumnDef::new(Alias::new(column.name));
        match column.kind {
            ColumnKind::Text => def.text(),
            ColumnKind::Boolean => def.boolean(),
        };
        if column.name == schema.natural_key {
            def.not_null().unique_key();
        }
        table.col(&mut def);
    }

    table
}

/// Macro to implement EntityStore for a specific SQL backend.
macro_rules! impl_entity_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::EntityStore for SqlEntityStore<$db_type> {
            async fn init(&self) -> crate::storage::Result<()> {
                let sql = <$db_type>::build_table_create(create_entity_table(self.schema));
                sqlx::query(&sql).execute(&self.pool).await?;

                for ddl in <$db_type as SqlDatabase>::CONFLICT_LOG_DDL {
                    sqlx::query(ddl).execute(&self.pool).await?;
                }
                Ok(())
            }

            async fn create_or_log_conflict(
                &self,
                row: &crate::entity::EntityRow,
                conflict: &crate::entity::ConflictLog,
            ) -> crate::storage::Result<crate::entity::CreateOutcome> {
                use sea_query::{OnConflict, Query};

                use crate::entity::{ColumnValue, CreateOutcome};
                use crate::storage::schema::ConflictingUserSyncLog as C;

                // sea-query values are not Send; render before the first await.
                let sql = {
                    let natural_key = self.schema.natural_key;
                    let mut columns = Vec::with_capacity(row.values.len() + 1);
                    let mut values: Vec<sea_query::SimpleExpr> =
                        Vec::with_capacity(row.values.len() + 1);
                    if row.get(natural_key).is_none() {
                        columns.push(Alias::new(natural_key));
                        values.push(ColumnValue::Text(Some(row.natural_key.clone())).into());
                    }
                    for (name, value) in &row.values {
                        columns.push(Alias::new(*name));
                        values.push(sea_query::Value::from(value.clone()).into());
                    }

                    let insert = Query::insert()
                        .into_table(Alias::new(self.schema.table))
                        .columns(columns)
                        .values_panic(values)
                        .on_conflict(
                            OnConflict::column(Alias::new(natural_key))
                                .do_nothing()
                                .to_owned(),
                        )
                        .to_owned();
                    <$db_type>::build_insert(insert)
                };

                let mut tx = self.pool.begin().await?;
                let inserted = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();

                if inserted > 0 {
                    tx.commit().await?;
                    return Ok(CreateOutcome::Created);
                }

                let sql = {
                    let log = Query::insert()
                        .into_table(C::Table)
                        .columns([
                            C::RawMessageBodyJson,
                            C::Comment,
                            C::ExchangeName,
                            C::MessageId,
                            C::Timestamp,
                        ])
                        .values_panic([
                            conflict.raw_payload.as_str().into(),
                            conflict.comment.as_str().into(),
                            conflict.exchange_name.as_str().into(),
                            conflict.message_id.clone().into(),
                            chrono::Utc::now().to_rfc3339().into(),
                        ])
                        .to_owned();
                    <$db_type>::build_insert(log)
                };
                sqlx::query(&sql).execute(&mut *tx).await?;
                tx.commit().await?;

                Ok(CreateOutcome::Conflict)
            }

            async fn update(&self, row: &crate::entity::EntityRow) -> crate::storage::Result<u64> {
                use sea_query::{Expr, Query};

                let sql = {
                    let natural_key = self.schema.natural_key;
                    let changes: Vec<_> = row
                        .values
                        .iter()
                        .filter(|(name, _)| *name != natural_key)
                        .map(|(name, value)| {
                            (
                                Alias::new(*name),
                                sea_query::SimpleExpr::from(sea_query::Value::from(value.clone())),
                            )
                        })
                        .collect();

                    // Nothing to apply
                    if changes.is_empty() {
                        return Ok(0);
                    }

                    let stmt = Query::update()
                        .table(Alias::new(self.schema.table))
                        .values(changes)
                        .and_where(
                            Expr::col(Alias::new(natural_key)).eq(row.natural_key.as_str()),
                        )
                        .to_owned();
                    <$db_type>::build_update(stmt)
                };

                let mut tx = self.pool.begin().await?;
                let updated = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
                tx.commit().await?;

                Ok(updated)
            }

            async fn find(
                &self,
                natural_key: &str,
            ) -> crate::storage::Result<Option<crate::entity::EntityRow>> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::entity::{ColumnValue, EntityRow};

                let sql = {
                    let stmt = Query::select()
                        .columns(self.schema.columns.iter().map(|c| Alias::new(c.name)))
                        .from(Alias::new(self.schema.table))
                        .and_where(Expr::col(Alias::new(self.schema.natural_key)).eq(natural_key))
                        .to_owned();
                    <$db_type>::build_select(stmt)
                };

                let Some(db_row) = sqlx::query(&sql).fetch_optional(&self.pool).await? else {
                    return Ok(None);
                };

                let mut values = Vec::with_capacity(self.schema.columns.len());
                for column in self.schema.columns {
                    let value = match column.kind {
                        ColumnKind::Text => ColumnValue::Text(db_row.try_get(column.name)?),
                        ColumnKind::Boolean => ColumnValue::Boolean(db_row.try_get(column.name)?),
                    };
                    values.push((column.name, value));
                }

                Ok(Some(EntityRow {
                    natural_key: natural_key.to_string(),
                    values,
                }))
            }

            async fn conflicts_for(
                &self,
                message_id: &str,
            ) -> crate::storage::Result<Vec<crate::entity::ConflictLog>> {
                use sea_query::{Expr, Order, Query};
                use sqlx::Row;

                use crate::entity::ConflictLog;
                use crate::storage::schema::ConflictingUserSyncLog as C;

                let sql = {
                    let stmt = Query::select()
                        .columns([
                            C::RawMessageBodyJson,
                            C::Comment,
                            C::ExchangeName,
                            C::MessageId,
                            C::Timestamp,
                        ])
                        .from(C::Table)
                        .and_where(Expr::col(C::MessageId).eq(message_id))
                        .order_by(C::Id, Order::Asc)
                        .to_owned();
                    <$db_type>::build_select(stmt)
                };
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                let mut logs = Vec::with_capacity(rows.len());
                for row in &rows {
                    logs.push(ConflictLog {
                        raw_payload: row.try_get("raw_message_body_json")?,
                        comment: row.try_get("comment")?,
                        exchange_name: row.try_get("exchange_name")?,
                        message_id: row.try_get("message_id")?,
                        timestamp: row.try_get("timestamp")?,
                    });
                }
                Ok(logs)
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_entity_store!(super::postgres::Postgres, "postgres");
impl_entity_store!(super::sqlite::Sqlite, "sqlite");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::USER_DETAIL;

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_create_entity_table_sqlite() {
        let sql = create_entity_table(&USER_DETAIL).to_string(sea_query::SqliteQueryBuilder);
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "user_detail""#));
        assert!(sql.contains("AUTOINCREMENT"));
        assert!(sql.contains("UNIQUE"));
        assert!(sql.contains(r#""deleted_at""#));
    }
}

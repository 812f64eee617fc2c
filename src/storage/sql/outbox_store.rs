//! Unified SQL OutboxStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend.

use std::marker::PhantomData;

use super::SqlDatabase;

/// SQL-based implementation of OutboxStore.
pub struct SqlOutboxStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlOutboxStore<DB> {
    /// Create a new SQL outbox store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

/// Decode an outbox row selected with every column.
macro_rules! outbox_record_from_row {
    ($row:expr) => {{
        use sqlx::Row;

        use crate::outbox::{DeliveryMode, OutboxRecord, OutboxStatus, Route};

        let row = $row;
        let status: String = row.try_get("status")?;
        OutboxRecord {
            id: row.try_get("id")?,
            route: Route::new(
                row.try_get::<String, _>("queue_name")?,
                row.try_get::<String, _>("exchange_name")?,
                row.try_get::<String, _>("deadletter_queue_name")?,
                row.try_get::<String, _>("deadletter_exchange_name")?,
            ),
            message_body: row.try_get("message_body_json")?,
            delivery_mode: DeliveryMode::from_code(row.try_get("delivery_mode")?),
            expiration_secs: row.try_get("expiration_secs")?,
            message_id: row.try_get("message_id")?,
            status: status
                .parse::<OutboxStatus>()
                .map_err(|_| crate::storage::StoreError::InvalidStatus(status.clone()))?,
            error_msg: row.try_get("error_msg")?,
            timestamp: row.try_get("timestamp")?,
        }
    }};
}

fn all_columns() -> [crate::storage::schema::QueuePublishHistory; 12] {
    use crate::storage::schema::QueuePublishHistory as Q;
    [
        Q::Id,
        Q::QueueName,
        Q::ExchangeName,
        Q::DeadletterQueueName,
        Q::DeadletterExchangeName,
        Q::MessageBodyJson,
        Q::DeliveryMode,
        Q::ExpirationSecs,
        Q::MessageId,
        Q::Status,
        Q::ErrorMsg,
        Q::Timestamp,
    ]
}

/// Macro to implement OutboxStore for a specific SQL backend.
macro_rules! impl_outbox_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OutboxStore for SqlOutboxStore<$db_type> {
            async fn init(&self) -> crate::storage::Result<()> {
                for ddl in <$db_type as SqlDatabase>::OUTBOX_DDL {
                    sqlx::query(ddl).execute(&self.pool).await?;
                }
                Ok(())
            }

            async fn enqueue(
                &self,
                record: crate::outbox::NewOutboxRecord,
            ) -> crate::storage::Result<i64> {
                use sea_query::Query;
                use sqlx::Row;

                use crate::outbox::OutboxStatus;
                use crate::storage::schema::QueuePublishHistory as Q;

                let body = serde_json::to_string(&record.message_body)?;
                let timestamp = chrono::Utc::now().to_rfc3339();

                let stmt = Query::insert()
                    .into_table(Q::Table)
                    .columns([
                        Q::QueueName,
                        Q::ExchangeName,
                        Q::DeadletterQueueName,
                        Q::DeadletterExchangeName,
                        Q::MessageBodyJson,
                        Q::DeliveryMode,
                        Q::ExpirationSecs,
                        Q::MessageId,
                        Q::Status,
                        Q::ErrorMsg,
                        Q::Timestamp,
                    ])
                    .values_panic([
                        record.route.queue_name.into(),
                        record.route.exchange_name.into(),
                        record.route.deadletter_queue_name.into(),
                        record.route.deadletter_exchange_name.into(),
                        body.into(),
                        i64::from(record.delivery_mode.code()).into(),
                        record.expiration_secs.into(),
                        record.message_id.to_string().into(),
                        OutboxStatus::Pending.as_str().into(),
                        "".into(),
                        timestamp.into(),
                    ])
                    .returning_col(Q::Id)
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
                Ok(row.try_get("id")?)
            }

            async fn fetch_publishable(
                &self,
            ) -> crate::storage::Result<Vec<crate::outbox::OutboxRecord>> {
                use sea_query::{Expr, Order, Query};

                use crate::outbox::OutboxStatus;
                use crate::storage::schema::QueuePublishHistory as Q;

                let stmt = Query::select()
                    .columns(all_columns())
                    .from(Q::Table)
                    .and_where(
                        Expr::col(Q::Status)
                            .is_in(OutboxStatus::PUBLISHABLE.iter().map(|s| s.as_str())),
                    )
                    .order_by(Q::Id, Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                let mut records = Vec::with_capacity(rows.len());
                for row in &rows {
                    records.push(outbox_record_from_row!(row));
                }
                Ok(records)
            }

            async fn mark_published(&self, id: i64) -> crate::storage::Result<()> {
                use sea_query::{Expr, Query};

                use crate::outbox::OutboxStatus;
                use crate::storage::schema::QueuePublishHistory as Q;

                let stmt = Query::update()
                    .table(Q::Table)
                    .value(Q::Status, OutboxStatus::Published.as_str())
                    .value(Q::ErrorMsg, "")
                    .and_where(Expr::col(Q::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn mark_error(&self, id: i64, error_msg: &str) -> crate::storage::Result<()> {
                use sea_query::{Expr, Query};

                use crate::outbox::OutboxStatus;
                use crate::storage::schema::QueuePublishHistory as Q;

                let stmt = Query::update()
                    .table(Q::Table)
                    .value(Q::Status, OutboxStatus::Error.as_str())
                    .value(Q::ErrorMsg, error_msg)
                    .and_where(Expr::col(Q::Id).eq(id))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok(())
            }

            async fn mark_expired(&self, message_id: &str) -> crate::storage::Result<u64> {
                use sea_query::{Expr, Query};

                use crate::outbox::OutboxStatus;
                use crate::storage::schema::QueuePublishHistory as Q;

                let stmt = Query::update()
                    .table(Q::Table)
                    .value(Q::Status, OutboxStatus::Expired.as_str())
                    .and_where(Expr::col(Q::MessageId).eq(message_id))
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let mut tx = self.pool.begin().await?;
                let result = sqlx::query(&sql).execute(&mut *tx).await?;
                tx.commit().await?;

                Ok(result.rows_affected())
            }

            async fn deadletter_queue_names(&self) -> crate::storage::Result<Vec<String>> {
                use sea_query::{Order, Query};
                use sqlx::Row;

                use crate::storage::schema::QueuePublishHistory as Q;

                let stmt = Query::select()
                    .distinct()
                    .column(Q::DeadletterQueueName)
                    .from(Q::Table)
                    .order_by(Q::DeadletterQueueName, Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                let mut names = Vec::with_capacity(rows.len());
                for row in &rows {
                    let name: String = row.try_get("deadletter_queue_name")?;
                    if !name.is_empty() {
                        names.push(name);
                    }
                }
                Ok(names)
            }

            async fn find_by_message_id(
                &self,
                message_id: &str,
            ) -> crate::storage::Result<Option<crate::outbox::OutboxRecord>> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::QueuePublishHistory as Q;

                let stmt = Query::select()
                    .columns(all_columns())
                    .from(Q::Table)
                    .and_where(Expr::col(Q::MessageId).eq(message_id))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                match sqlx::query(&sql).fetch_optional(&self.pool).await? {
                    Some(row) => Ok(Some(outbox_record_from_row!(&row))),
                    None => Ok(None),
                }
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_outbox_store!(super::postgres::Postgres, "postgres");
impl_outbox_store!(super::sqlite::Sqlite, "sqlite");

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use customers_core::context::RequestContext;
use customers_core::domain::customer::{Customer, CustomerId};

use super::{CustomerFilter, CustomerRepository, RepositoryError};
use crate::DbPool;

const SELECT_ALL: &str = "SELECT id, name, phone, active, created FROM customers";
const SELECT_ACTIVE: &str =
    "SELECT id, name, phone, active, created FROM customers WHERE active = TRUE";

#[derive(Clone)]
pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_customer(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: String =
        row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_str: String =
        row.try_get("created").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            RepositoryError::Decode(format!("invalid created timestamp `{created_str}`: {e}"))
        })?;

    Ok(Customer { id: CustomerId(id), name, phone, active, created })
}

/// Commits only while the context is still live. Returning early drops `tx`,
/// which rolls back whatever the statement did on the connection worker.
async fn commit(
    ctx: &RequestContext,
    tx: Transaction<'static, Sqlite>,
) -> Result<(), RepositoryError> {
    ctx.check()?;
    tx.commit().await?;
    Ok(())
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_id(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = ctx
            .guard(
                sqlx::query(
                    "SELECT id, name, phone, active, created FROM customers WHERE id = ?",
                )
                .bind(id.0)
                .fetch_optional(&self.pool),
            )
            .await??;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: CustomerFilter,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let statement = match filter {
            CustomerFilter::All => SELECT_ALL,
            CustomerFilter::ActiveOnly => SELECT_ACTIVE,
        };

        let rows: Vec<SqliteRow> =
            ctx.guard(sqlx::query(statement).fetch_all(&self.pool)).await??;

        rows.iter().map(row_to_customer).collect()
    }

    async fn insert(
        &self,
        ctx: &RequestContext,
        name: &str,
        phone: &str,
    ) -> Result<Customer, RepositoryError> {
        let mut tx = ctx.guard(self.pool.begin()).await??;
        let row = ctx
            .guard(
                sqlx::query(
                    "INSERT INTO customers (name, phone) VALUES (?, ?)
                     RETURNING id, name, phone, active, created",
                )
                .bind(name)
                .bind(phone)
                .fetch_one(&mut *tx),
            )
            .await??;
        let customer = row_to_customer(&row)?;

        commit(ctx, tx).await?;
        Ok(customer)
    }

    async fn set_active(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
        active: bool,
    ) -> Result<u64, RepositoryError> {
        let mut tx = ctx.guard(self.pool.begin()).await??;
        let result = ctx
            .guard(
                sqlx::query("UPDATE customers SET active = ? WHERE id = ?")
                    .bind(active)
                    .bind(id.0)
                    .execute(&mut *tx),
            )
            .await??;

        commit(ctx, tx).await?;
        Ok(result.rows_affected())
    }

    async fn update_contact(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
        phone: &str,
        name: &str,
    ) -> Result<u64, RepositoryError> {
        let mut tx = ctx.guard(self.pool.begin()).await??;
        let result = ctx
            .guard(
                sqlx::query("UPDATE customers SET phone = ?, name = ? WHERE id = ?")
                    .bind(phone)
                    .bind(name)
                    .bind(id.0)
                    .execute(&mut *tx),
            )
            .await??;

        commit(ctx, tx).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, ctx: &RequestContext, id: CustomerId) -> Result<u64, RepositoryError> {
        let mut tx = ctx.guard(self.pool.begin()).await??;
        let result = ctx
            .guard(sqlx::query("DELETE FROM customers WHERE id = ?").bind(id.0).execute(&mut *tx))
            .await??;

        commit(ctx, tx).await?;
        Ok(result.rows_affected())
    }
}

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use customers_core::context::RequestContext;
use customers_core::domain::customer::{Customer, CustomerId};

use super::{CustomerFilter, CustomerRepository, RepositoryError};

#[derive(Default)]
struct Table {
    rows: BTreeMap<i64, Customer>,
    last_id: i64,
}

/// Process-local customer table. Ids are never reused, matching the SQL
/// schema's AUTOINCREMENT behavior.
#[derive(Default)]
pub struct InMemoryCustomerRepository {
    table: RwLock<Table>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_id(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
    ) -> Result<Option<Customer>, RepositoryError> {
        ctx.check()?;
        let table = self.table.read().await;
        Ok(table.rows.get(&id.0).cloned())
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: CustomerFilter,
    ) -> Result<Vec<Customer>, RepositoryError> {
        ctx.check()?;
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|customer| filter.matches(customer)).cloned().collect())
    }

    async fn insert(
        &self,
        ctx: &RequestContext,
        name: &str,
        phone: &str,
    ) -> Result<Customer, RepositoryError> {
        ctx.check()?;
        let mut table = self.table.write().await;
        table.last_id += 1;
        let customer = Customer {
            id: CustomerId(table.last_id),
            name: name.to_string(),
            phone: phone.to_string(),
            active: true,
            created: Utc::now(),
        };
        table.rows.insert(customer.id.0, customer.clone());
        Ok(customer)
    }

    async fn set_active(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
        active: bool,
    ) -> Result<u64, RepositoryError> {
        ctx.check()?;
        let mut table = self.table.write().await;
        Ok(match table.rows.get_mut(&id.0) {
            Some(customer) => {
                customer.active = active;
                1
            }
            None => 0,
        })
    }

    async fn update_contact(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
        phone: &str,
        name: &str,
    ) -> Result<u64, RepositoryError> {
        ctx.check()?;
        let mut table = self.table.write().await;
        Ok(match table.rows.get_mut(&id.0) {
            Some(customer) => {
                customer.phone = phone.to_string();
                customer.name = name.to_string();
                1
            }
            None => 0,
        })
    }

    async fn delete(&self, ctx: &RequestContext, id: CustomerId) -> Result<u64, RepositoryError> {
        ctx.check()?;
        let mut table = self.table.write().await;
        Ok(u64::from(table.rows.remove(&id.0).is_some()))
    }
}

use async_trait::async_trait;
use thiserror::Error;

use customers_core::context::{Interrupted, RequestContext};
use customers_core::domain::customer::{Customer, CustomerId};

pub mod customer;
pub mod memory;

pub use customer::SqlCustomerRepository;
pub use memory::InMemoryCustomerRepository;

/// Storage-level failure with full diagnostic detail. Stays below the service
/// boundary; callers of `CustomerService` only ever see `ServiceError`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomerFilter {
    All,
    ActiveOnly,
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        match self {
            Self::All => true,
            Self::ActiveOnly => customer.active,
        }
    }
}

/// Single-statement access to the customers table. Mutations report the
/// number of affected rows and never fail on a missing id by themselves.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
    ) -> Result<Option<Customer>, RepositoryError>;

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: CustomerFilter,
    ) -> Result<Vec<Customer>, RepositoryError>;

    async fn insert(
        &self,
        ctx: &RequestContext,
        name: &str,
        phone: &str,
    ) -> Result<Customer, RepositoryError>;

    async fn set_active(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
        active: bool,
    ) -> Result<u64, RepositoryError>;

    async fn update_contact(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
        phone: &str,
        name: &str,
    ) -> Result<u64, RepositoryError>;

    async fn delete(&self, ctx: &RequestContext, id: CustomerId) -> Result<u64, RepositoryError>;
}

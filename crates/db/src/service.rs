//! The customer service: every operation callers use, with storage failures
//! collapsed into [`ServiceError`].
//!
//! Mutations that target an id look the row up first and report
//! [`ServiceError::NotFound`] before touching it. The lookup and the mutation
//! are separate statements, so a concurrent delete in between makes the
//! mutation affect no rows; `save` then reports `NotFound` from its re-fetch.

use tracing::{debug, error};

use customers_core::context::RequestContext;
use customers_core::domain::customer::{Customer, CustomerId};
use customers_core::errors::ServiceError;

use crate::repositories::{
    CustomerFilter, CustomerRepository, RepositoryError, SqlCustomerRepository,
};
use crate::DbPool;

#[derive(Clone)]
pub struct CustomerService<R = SqlCustomerRepository> {
    repository: R,
}

impl CustomerService<SqlCustomerRepository> {
    pub fn new(pool: DbPool) -> Self {
        Self::with_repository(SqlCustomerRepository::new(pool))
    }
}

impl<R: CustomerRepository> CustomerService<R> {
    pub fn with_repository(repository: R) -> Self {
        Self { repository }
    }

    pub async fn by_id(
        &self,
        ctx: &RequestContext,
        id: CustomerId,
    ) -> Result<Customer, ServiceError> {
        self.lookup(ctx, "by_id", id).await
    }

    pub async fn all_active(&self, ctx: &RequestContext) -> Result<Vec<Customer>, ServiceError> {
        self.list(ctx, "all_active", CustomerFilter::ActiveOnly).await
    }

    pub async fn all(&self, ctx: &RequestContext) -> Result<Vec<Customer>, ServiceError> {
        self.list(ctx, "all", CustomerFilter::All).await
    }

    pub async fn block(&self, ctx: &RequestContext, id: CustomerId) -> Result<(), ServiceError> {
        self.set_active(ctx, "block", id, false).await
    }

    pub async fn unblock(&self, ctx: &RequestContext, id: CustomerId) -> Result<(), ServiceError> {
        self.set_active(ctx, "unblock", id, true).await
    }

    pub async fn remove(&self, ctx: &RequestContext, id: CustomerId) -> Result<(), ServiceError> {
        self.lookup(ctx, "remove", id).await?;

        let affected = self
            .repository
            .delete(ctx, id)
            .await
            .map_err(|error| internal(ctx, "remove", Some(id), error))?;
        log_unaffected(ctx, "remove", id, affected);

        Ok(())
    }

    /// Inserts a new customer when `id` is `None`, otherwise replaces the
    /// phone and name of an existing one. Returns the stored row either way.
    pub async fn save(
        &self,
        ctx: &RequestContext,
        id: Option<CustomerId>,
        phone: &str,
        name: &str,
    ) -> Result<Customer, ServiceError> {
        let Some(id) = id else {
            return self
                .repository
                .insert(ctx, name, phone)
                .await
                .map_err(|error| internal(ctx, "save", None, error));
        };

        self.lookup(ctx, "save", id).await?;

        let affected = self
            .repository
            .update_contact(ctx, id, phone, name)
            .await
            .map_err(|error| internal(ctx, "save", Some(id), error))?;
        log_unaffected(ctx, "save", id, affected);

        self.lookup(ctx, "save", id).await
    }

    async fn lookup(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        id: CustomerId,
    ) -> Result<Customer, ServiceError> {
        match self.repository.find_by_id(ctx, id).await {
            Ok(Some(customer)) => Ok(customer),
            Ok(None) => {
                debug!(
                    event_name = "customers.service.not_found",
                    operation,
                    customer_id = id.0,
                    correlation_id = ctx.correlation_id(),
                    "customer not found"
                );
                Err(ServiceError::NotFound)
            }
            Err(error) => Err(internal(ctx, operation, Some(id), error)),
        }
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        filter: CustomerFilter,
    ) -> Result<Vec<Customer>, ServiceError> {
        self.repository.list(ctx, filter).await.map_err(|error| internal(ctx, operation, None, error))
    }

    async fn set_active(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        id: CustomerId,
        active: bool,
    ) -> Result<(), ServiceError> {
        self.lookup(ctx, operation, id).await?;

        let affected = self
            .repository
            .set_active(ctx, id, active)
            .await
            .map_err(|error| internal(ctx, operation, Some(id), error))?;
        log_unaffected(ctx, operation, id, affected);

        Ok(())
    }
}

fn internal(
    ctx: &RequestContext,
    operation: &'static str,
    customer_id: Option<CustomerId>,
    error: RepositoryError,
) -> ServiceError {
    error!(
        event_name = "customers.service.internal_error",
        operation,
        customer_id = customer_id.map(|id| id.0),
        correlation_id = ctx.correlation_id(),
        error = %error,
        "customer storage operation failed"
    );
    ServiceError::Internal
}

fn log_unaffected(ctx: &RequestContext, operation: &'static str, id: CustomerId, affected: u64) {
    if affected == 0 {
        debug!(
            event_name = "customers.service.row_vanished",
            operation,
            customer_id = id.0,
            correlation_id = ctx.correlation_id(),
            "customer disappeared between existence check and mutation"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use customers_core::context::RequestContext;
    use customers_core::domain::customer::{Customer, CustomerId};
    use customers_core::errors::ServiceError;
    use sqlx::{Connection, SqliteConnection};
    use tempfile::TempDir;

    use super::CustomerService;
    use crate::repositories::{
        CustomerFilter, CustomerRepository, InMemoryCustomerRepository, RepositoryError,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> CustomerService {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        CustomerService::new(pool)
    }

    #[tokio::test]
    async fn worked_example_on_empty_store() {
        let service = setup().await;
        let ctx = RequestContext::new();
        let before_ms = Utc::now().timestamp_millis();

        let alice = service.save(&ctx, None, "555-1234", "Alice").await.expect("save");

        assert_eq!(alice.id, CustomerId(1));
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.phone, "555-1234");
        assert!(alice.active);
        assert!(alice.created.timestamp_millis() >= before_ms, "created must not predate call");

        let all = service.all(&ctx).await.expect("all");
        assert_eq!(all, vec![alice.clone()]);

        service.block(&ctx, alice.id).await.expect("block");
        let active = service.all_active(&ctx).await.expect("all_active");
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn missing_id_is_not_found_for_every_targeted_operation() {
        let service = setup().await;
        let ctx = RequestContext::new();
        let missing = CustomerId(77);

        assert_eq!(service.by_id(&ctx, missing).await, Err(ServiceError::NotFound));
        assert_eq!(service.block(&ctx, missing).await, Err(ServiceError::NotFound));
        assert_eq!(service.unblock(&ctx, missing).await, Err(ServiceError::NotFound));
        assert_eq!(service.remove(&ctx, missing).await, Err(ServiceError::NotFound));
        assert_eq!(
            service.save(&ctx, Some(missing), "1", "x").await,
            Err(ServiceError::NotFound)
        );
        assert!(service.all(&ctx).await.expect("all").is_empty(), "nothing should be inserted");
    }

    #[tokio::test]
    async fn all_active_is_the_active_subset_of_all() {
        let service = setup().await;
        let ctx = RequestContext::new();

        let mut ids = Vec::new();
        for (name, phone) in [("Alice", "1"), ("Bob", "2"), ("Carol", "3"), ("Dan", "4")] {
            ids.push(service.save(&ctx, None, phone, name).await.expect("save").id);
        }
        service.block(&ctx, ids[1]).await.expect("block bob");
        service.block(&ctx, ids[3]).await.expect("block dan");

        let all = service.all(&ctx).await.expect("all");
        let active = service.all_active(&ctx).await.expect("all_active");

        assert_eq!(all.len(), 4);
        let expected: Vec<Customer> = all.into_iter().filter(|c| c.active).collect();
        assert_eq!(active, expected);
    }

    #[tokio::test]
    async fn lists_are_empty_not_absent_on_empty_store() {
        let service = setup().await;
        let ctx = RequestContext::new();

        assert_eq!(service.all(&ctx).await, Ok(Vec::new()));
        assert_eq!(service.all_active(&ctx).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn save_existing_updates_only_name_and_phone() {
        let service = setup().await;
        let ctx = RequestContext::new();

        let original = service.save(&ctx, None, "555-1234", "Alice").await.expect("create");
        service.block(&ctx, original.id).await.expect("block");

        let updated =
            service.save(&ctx, Some(original.id), "555-0000", "Alicia").await.expect("update");

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created, original.created);
        assert!(!updated.active, "save must not touch the active flag");
        assert_eq!(updated.name, "Alicia");
        assert_eq!(updated.phone, "555-0000");

        let reloaded = service.by_id(&ctx, original.id).await.expect("by_id");
        assert_eq!(reloaded, updated);
        assert_eq!(service.all(&ctx).await.expect("all").len(), 1);
    }

    #[tokio::test]
    async fn block_and_unblock_are_idempotent() {
        let service = setup().await;
        let ctx = RequestContext::new();
        let id = service.save(&ctx, None, "1", "Alice").await.expect("save").id;

        service.block(&ctx, id).await.expect("first block");
        service.block(&ctx, id).await.expect("second block");
        assert!(!service.by_id(&ctx, id).await.expect("by_id").active);

        service.unblock(&ctx, id).await.expect("first unblock");
        service.unblock(&ctx, id).await.expect("second unblock");
        assert!(service.by_id(&ctx, id).await.expect("by_id").active);
    }

    #[tokio::test]
    async fn removed_customer_is_gone_for_every_operation() {
        let service = setup().await;
        let ctx = RequestContext::new();
        let id = service.save(&ctx, None, "1", "Alice").await.expect("save").id;

        service.remove(&ctx, id).await.expect("remove");

        assert_eq!(service.by_id(&ctx, id).await, Err(ServiceError::NotFound));
        assert_eq!(service.block(&ctx, id).await, Err(ServiceError::NotFound));
        assert_eq!(service.unblock(&ctx, id).await, Err(ServiceError::NotFound));
        assert_eq!(service.remove(&ctx, id).await, Err(ServiceError::NotFound));

        let next = service.save(&ctx, None, "2", "Bob").await.expect("save after remove");
        assert_ne!(next.id, id, "ids must not be reused");
    }

    #[tokio::test]
    async fn storage_failure_maps_to_internal() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let service = CustomerService::new(pool.clone());
        let ctx = RequestContext::new();
        pool.close().await;

        assert_eq!(service.by_id(&ctx, CustomerId(1)).await, Err(ServiceError::Internal));
        assert_eq!(service.all(&ctx).await, Err(ServiceError::Internal));
        assert_eq!(service.all_active(&ctx).await, Err(ServiceError::Internal));
        assert_eq!(service.block(&ctx, CustomerId(1)).await, Err(ServiceError::Internal));
        assert_eq!(service.save(&ctx, None, "1", "x").await, Err(ServiceError::Internal));
    }

    #[tokio::test]
    async fn undecodable_row_maps_to_internal() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query("INSERT INTO customers (name, phone, created) VALUES ('Eve', '1', 'garbage')")
            .execute(&pool)
            .await
            .expect("insert malformed row");
        let service = CustomerService::new(pool);
        let ctx = RequestContext::new();

        assert_eq!(service.by_id(&ctx, CustomerId(1)).await, Err(ServiceError::Internal));
        assert_eq!(service.all(&ctx).await, Err(ServiceError::Internal));
        assert_eq!(service.block(&ctx, CustomerId(1)).await, Err(ServiceError::Internal));
    }

    #[tokio::test]
    async fn cancelled_or_expired_context_maps_to_internal() {
        let service = setup().await;
        let id = service.save(&RequestContext::new(), None, "1", "Alice").await.expect("save").id;

        let cancelled = RequestContext::new();
        cancelled.cancel();
        assert_eq!(service.by_id(&cancelled, id).await, Err(ServiceError::Internal));
        assert_eq!(service.remove(&cancelled, id).await, Err(ServiceError::Internal));

        let expired = RequestContext::new().with_timeout(Duration::ZERO);
        assert_eq!(service.all(&expired).await, Err(ServiceError::Internal));

        let still_there = service.by_id(&RequestContext::new(), id).await;
        assert!(still_there.is_ok(), "interrupted remove must leave the row in place");
    }

    /// File-backed service holding one customer, plus a second connection
    /// that owns the write lock so the next mutation blocks on it.
    async fn service_behind_held_writer(
        dir: &TempDir,
    ) -> (CustomerService, Customer, SqliteConnection) {
        let url = format!("sqlite://{}", dir.path().join("customers.db").display());
        let pool = connect_with_settings(&url, 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let service = CustomerService::new(pool);
        let alice =
            service.save(&RequestContext::new(), None, "555-1234", "Alice").await.expect("save");

        let mut writer = SqliteConnection::connect(&url).await.expect("connect writer");
        sqlx::query("BEGIN IMMEDIATE").execute(&mut writer).await.expect("take write lock");
        (service, alice, writer)
    }

    #[tokio::test]
    async fn cancelling_a_blocked_remove_keeps_the_row() {
        let dir = TempDir::new().expect("tempdir");
        let (service, alice, mut writer) = service_behind_held_writer(&dir).await;

        let ctx = RequestContext::new();
        let token = ctx.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });
        assert_eq!(service.remove(&ctx, alice.id).await, Err(ServiceError::Internal));

        sqlx::query("COMMIT").execute(&mut writer).await.expect("release write lock");
        assert_eq!(service.by_id(&RequestContext::new(), alice.id).await, Ok(alice));
    }

    #[tokio::test]
    async fn deadline_during_blocked_save_keeps_the_old_contact() {
        let dir = TempDir::new().expect("tempdir");
        let (service, alice, mut writer) = service_behind_held_writer(&dir).await;

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(200));
        let result = service.save(&ctx, Some(alice.id), "555-0000", "Alicia").await;
        assert_eq!(result, Err(ServiceError::Internal));

        sqlx::query("COMMIT").execute(&mut writer).await.expect("release write lock");
        assert_eq!(service.by_id(&RequestContext::new(), alice.id).await, Ok(alice));
    }

    #[tokio::test]
    async fn in_memory_repository_honors_the_same_contract() {
        let service = CustomerService::with_repository(InMemoryCustomerRepository::default());
        let ctx = RequestContext::new();

        let alice = service.save(&ctx, None, "555-1234", "Alice").await.expect("save");
        assert_eq!(alice.id, CustomerId(1));
        service.block(&ctx, alice.id).await.expect("block");
        assert!(service.all_active(&ctx).await.expect("all_active").is_empty());
        service.remove(&ctx, alice.id).await.expect("remove");
        assert_eq!(service.remove(&ctx, alice.id).await, Err(ServiceError::NotFound));
    }

    /// Finds the row on the existence check, then loses it to a concurrent
    /// delete before the re-fetch.
    #[derive(Default)]
    struct VanishingRepository {
        lookups: AtomicUsize,
        inner: InMemoryCustomerRepository,
    }

    #[async_trait::async_trait]
    impl CustomerRepository for VanishingRepository {
        async fn find_by_id(
            &self,
            ctx: &RequestContext,
            id: CustomerId,
        ) -> Result<Option<Customer>, RepositoryError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.find_by_id(ctx, id).await
            } else {
                Ok(None)
            }
        }

        async fn list(
            &self,
            ctx: &RequestContext,
            filter: CustomerFilter,
        ) -> Result<Vec<Customer>, RepositoryError> {
            self.inner.list(ctx, filter).await
        }

        async fn insert(
            &self,
            ctx: &RequestContext,
            name: &str,
            phone: &str,
        ) -> Result<Customer, RepositoryError> {
            self.inner.insert(ctx, name, phone).await
        }

        async fn set_active(
            &self,
            ctx: &RequestContext,
            id: CustomerId,
            active: bool,
        ) -> Result<u64, RepositoryError> {
            self.inner.set_active(ctx, id, active).await
        }

        async fn update_contact(
            &self,
            ctx: &RequestContext,
            id: CustomerId,
            phone: &str,
            name: &str,
        ) -> Result<u64, RepositoryError> {
            self.inner.update_contact(ctx, id, phone, name).await
        }

        async fn delete(
            &self,
            ctx: &RequestContext,
            id: CustomerId,
        ) -> Result<u64, RepositoryError> {
            self.inner.delete(ctx, id).await
        }
    }

    #[tokio::test]
    async fn save_reports_not_found_when_row_vanishes_before_refetch() {
        let repository = VanishingRepository::default();
        let ctx = RequestContext::new();
        let existing = repository.inner.insert(&ctx, "Alice", "1").await.expect("seed");
        let service = CustomerService::with_repository(repository);

        let result = service.save(&ctx, Some(existing.id), "2", "Alicia").await;

        assert_eq!(result, Err(ServiceError::NotFound));
    }
}

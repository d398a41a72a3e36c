//! Postgres-backed stores.
//!
//! Expected schema (applied by the surrounding application's migrations):
//!
//! ```sql
//! CREATE TABLE products (
//!     id                  UUID PRIMARY KEY,
//!     stock_quantity      BIGINT NOT NULL DEFAULT 0 CHECK (stock_quantity >= 0),
//!     quantity_in_transit BIGINT NOT NULL DEFAULT 0 CHECK (quantity_in_transit >= 0),
//!     avg_purchase_price  NUMERIC NOT NULL DEFAULT 0,
//!     version             BIGINT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE purchase_orders (
//!     id      UUID PRIMARY KEY,
//!     status  TEXT NOT NULL,
//!     version BIGINT NOT NULL,
//!     payload JSONB NOT NULL
//! );
//! ```
//!
//! ## Concurrency
//!
//! - `apply_transit_delta` is a single guarded `UPDATE` (atomic increment;
//!   the non-negativity invariant sits in the predicate).
//! - `release_transit`/`receive` run in a transaction holding a
//!   `SELECT ... FOR UPDATE` row lock and reuse the domain mutation, so the
//!   Postgres and in-memory backends share one source of truth for the
//!   clamping and averaging rules.
//! - Order writes are version-guarded compare-and-swap updates; a unique
//!   violation or a stale version maps to `StoreError::Concurrency`.
//!
//! ## Runtime bridging
//!
//! The store traits are synchronous; these implementations resolve the
//! current tokio runtime handle and `block_on` the async query. Callers must
//! therefore be running inside a tokio runtime context.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use restock_core::{AggregateId, DomainError, ExpectedVersion};
use restock_inventory::{Product, ProductId};
use restock_purchasing::{PurchaseOrder, PurchaseOrderId};

use super::{ProductLedger, PurchaseOrderStore, StoreError};

const ACTIVE_STATUSES: &str = "('sent', 'supplier_editing', 'awaiting_payment', 'paid', 'shipped')";

fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::backend(
            "Postgres stores require an async runtime (tokio); \
             ensure you're calling from within a runtime context",
        )
    })
}

/// Map sqlx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                // Unique violation: a concurrent writer inserted first.
                StoreError::Concurrency(msg)
            } else {
                StoreError::Backend(msg)
            }
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| StoreError::backend(format!("failed to read product row: {e}")))?;
    let stock_quantity: i64 = row
        .try_get("stock_quantity")
        .map_err(|e| StoreError::backend(format!("failed to read product row: {e}")))?;
    let quantity_in_transit: i64 = row
        .try_get("quantity_in_transit")
        .map_err(|e| StoreError::backend(format!("failed to read product row: {e}")))?;
    let avg_purchase_price: Decimal = row
        .try_get("avg_purchase_price")
        .map_err(|e| StoreError::backend(format!("failed to read product row: {e}")))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::backend(format!("failed to read product row: {e}")))?;

    Product::from_parts(
        ProductId::new(AggregateId::from_uuid(id)),
        stock_quantity,
        quantity_in_transit,
        avg_purchase_price,
        version as u64,
    )
    .map_err(StoreError::Domain)
}

const PRODUCT_COLUMNS: &str =
    "id, stock_quantity, quantity_in_transit, avg_purchase_price, version";

/// Postgres-backed product ledger.
#[derive(Debug, Clone)]
pub struct PostgresProductLedger {
    pool: Arc<PgPool>,
}

impl PostgresProductLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn get_async(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.0.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn insert_async(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(product.id().0.as_uuid())
        .bind(product.stock_quantity())
        .bind(product.quantity_in_transit())
        .bind(product.avg_purchase_price())
        .bind(product.version() as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn list_async(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn apply_transit_delta_async(
        &self,
        id: ProductId,
        delta: i64,
    ) -> Result<Product, StoreError> {
        // Atomic increment; the invariant lives in the predicate so a
        // concurrent writer can never be lost or interleaved past it.
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET quantity_in_transit = quantity_in_transit + $2,
                version = version + 1
            WHERE id = $1 AND quantity_in_transit + $2 >= 0
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.0.as_uuid())
        .bind(delta)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("apply_transit_delta", e))?;

        match row {
            Some(row) => product_from_row(&row),
            // Zero rows hit: missing product or rejected delta.
            None => match self.get_async(id).await? {
                None => Err(StoreError::NotFound(id.to_string())),
                Some(product) => Err(StoreError::Domain(DomainError::invariant(format!(
                    "product {id}: transit delta {delta:+} would drive quantity in transit \
                     negative (currently {})",
                    product.quantity_in_transit()
                )))),
            },
        }
    }

    /// Run a domain mutation under a `FOR UPDATE` row lock.
    async fn mutate_locked<T>(
        &self,
        id: ProductId,
        f: impl FnOnce(&mut Product) -> Result<T, DomainError>,
    ) -> Result<(Product, T), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut product = product_from_row(&row)?;
        let out = f(&mut product).map_err(StoreError::Domain)?;

        sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = $2,
                quantity_in_transit = $3,
                avg_purchase_price = $4,
                version = $5
            WHERE id = $1
            "#,
        )
        .bind(product.id().0.as_uuid())
        .bind(product.stock_quantity())
        .bind(product.quantity_in_transit())
        .bind(product.avg_purchase_price())
        .bind(product.version() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok((product, out))
    }
}

impl ProductLedger for PostgresProductLedger {
    fn get(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        runtime_handle()?.block_on(self.get_async(id))
    }

    fn insert(&self, product: Product) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.insert_async(&product))
    }

    fn list(&self) -> Result<Vec<Product>, StoreError> {
        runtime_handle()?.block_on(self.list_async())
    }

    fn apply_transit_delta(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        runtime_handle()?.block_on(self.apply_transit_delta_async(id, delta))
    }

    fn release_transit(
        &self,
        id: ProductId,
        quantity: i64,
    ) -> Result<(Product, i64), StoreError> {
        runtime_handle()?.block_on(self.mutate_locked(id, |p| p.release_transit(quantity)))
    }

    fn receive(
        &self,
        id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
    ) -> Result<(Product, i64), StoreError> {
        runtime_handle()?.block_on(self.mutate_locked(id, |p| p.receive(quantity, unit_cost)))
    }

    fn set_transit(&self, id: ProductId, value: i64) -> Result<i64, StoreError> {
        let (_, previous) = runtime_handle()?.block_on(self.mutate_locked(id, |p| {
            let previous = p.quantity_in_transit();
            p.set_transit(value)?;
            Ok(previous)
        }))?;
        Ok(previous)
    }
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<PurchaseOrder, StoreError> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| StoreError::backend(format!("failed to read order row: {e}")))?;
    serde_json::from_value(payload)
        .map_err(|e| StoreError::backend(format!("failed to deserialize order payload: {e}")))
}

/// Postgres-backed purchase order store.
///
/// The full order (items, flags, metadata) is persisted as one JSONB payload
/// next to the indexed `status`/`version` columns, so a transition is a
/// single version-guarded row write.
#[derive(Debug, Clone)]
pub struct PostgresPurchaseOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresPurchaseOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn insert_async(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let payload = serde_json::to_value(order)
            .map_err(|e| StoreError::backend(format!("failed to serialize order: {e}")))?;

        sqlx::query(
            "INSERT INTO purchase_orders (id, status, version, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id().0.as_uuid())
        .bind(order.status().as_str())
        .bind(order.version() as i64)
        .bind(&payload)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn get_async(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        let row = sqlx::query("SELECT payload FROM purchase_orders WHERE id = $1")
            .bind(id.0.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_async(
        &self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_value(order)
            .map_err(|e| StoreError::backend(format!("failed to serialize order: {e}")))?;
        let expected_exact: Option<i64> = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v as i64),
        };

        let result = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $2, version = $3, payload = $4
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(order.id().0.as_uuid())
        .bind(order.status().as_str())
        .bind(order.version() as i64)
        .bind(&payload)
        .bind(expected_exact)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            // Zero rows hit: missing order or stale version.
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM purchase_orders WHERE id = $1)")
                    .bind(order.id().0.as_uuid())
                    .fetch_one(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("update_order", e))?;
            if exists {
                return Err(StoreError::concurrency(format!(
                    "purchase order {}: stale version (expected {expected:?})",
                    order.id()
                )));
            }
            return Err(StoreError::NotFound(order.id().to_string()));
        }
        Ok(())
    }

    async fn list_async(&self, active_only: bool) -> Result<Vec<PurchaseOrder>, StoreError> {
        let sql = if active_only {
            format!("SELECT payload FROM purchase_orders WHERE status IN {ACTIVE_STATUSES} ORDER BY id")
        } else {
            "SELECT payload FROM purchase_orders ORDER BY id".to_string()
        };

        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        rows.iter().map(order_from_row).collect()
    }
}

impl PurchaseOrderStore for PostgresPurchaseOrderStore {
    fn insert(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.insert_async(order))
    }

    fn get(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        runtime_handle()?.block_on(self.get_async(id))
    }

    fn update(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.update_async(order, expected))
    }

    fn list(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        runtime_handle()?.block_on(self.list_async(false))
    }

    fn list_active(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        runtime_handle()?.block_on(self.list_async(true))
    }
}

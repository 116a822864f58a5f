//! Postgres-backed stock store.
//!
//! Row locks are real `SELECT ... FOR UPDATE` locks, and the invariants the
//! services check in code are repeated as schema constraints (see
//! [`MIGRATION`]).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (check constraint violation) | `23514` | `CheckViolation` |
//! | Database (foreign key violation) | `23503` | `Backend` |
//! | Database (other), pool, IO, decode | Any other | `Backend` |
//!
//! ## Runtime
//!
//! The [`StockStore`] trait is synchronous. Each call drives the async query
//! with `Handle::block_on`, so callers must run on a thread that is not itself
//! a runtime worker (a plain thread or `spawn_blocking`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use stockcut_core::{Audit, ComponentId, CuttingOrderId, ItemId, StockEventId, UserId};
use stockcut_cutting::{CuttingOrder, CuttingOrderHeader, CuttingOrderStatus, OrderItem};
use stockcut_inventory::{ItemStock, StockEvent, StockEventKind, StockTarget};

use super::{StockStore, StockTx, StoreError};

/// Schema applied by [`PostgresStockStore::migrate`]. Idempotent.
pub const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS item_stocks (
    target_kind     TEXT NOT NULL CHECK (target_kind IN ('item', 'component')),
    target_id       UUID NOT NULL,
    parent_item_id  UUID NULL,
    quantity        NUMERIC(18, 4) NOT NULL CHECK (quantity >= 0),
    active          BOOLEAN NOT NULL,
    created_by      UUID NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    modified_by     UUID NULL,
    modified_at     TIMESTAMPTZ NULL,
    deleted_by      UUID NULL,
    deleted_at      TIMESTAMPTZ NULL,
    PRIMARY KEY (target_kind, target_id),
    CHECK ((target_kind = 'component') = (parent_item_id IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS item_stocks_parent_idx ON item_stocks (parent_item_id);

CREATE TABLE IF NOT EXISTS stock_events (
    seq             BIGSERIAL PRIMARY KEY,
    event_id        UUID NOT NULL UNIQUE,
    target_kind     TEXT NOT NULL,
    target_id       UUID NOT NULL,
    delta           NUMERIC(18, 4) NOT NULL CHECK (delta <> 0),
    kind            TEXT NOT NULL,
    note            TEXT NOT NULL,
    actor           UUID NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    FOREIGN KEY (target_kind, target_id) REFERENCES item_stocks (target_kind, target_id)
);

CREATE INDEX IF NOT EXISTS stock_events_target_idx ON stock_events (target_kind, target_id, seq);

CREATE TABLE IF NOT EXISTS cutting_orders (
    order_id            UUID PRIMARY KEY,
    order_number        TEXT NOT NULL UNIQUE,
    sales_order_id      UUID NULL,
    sales_order_line_id UUID NULL,
    target_item_id      UUID NOT NULL,
    target_quantity     NUMERIC(18, 4) NOT NULL CHECK (target_quantity > 0),
    status              TEXT NOT NULL
        CHECK (status IN ('pending', 'in_process', 'completed', 'cancelled')),
    operator_id         UUID NULL,
    allow_late_items    BOOLEAN NOT NULL,
    notes               TEXT NOT NULL,
    completed_at        TIMESTAMPTZ NULL,
    version             BIGINT NOT NULL,
    active              BOOLEAN NOT NULL,
    created_by          UUID NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    modified_by         UUID NULL,
    modified_at         TIMESTAMPTZ NULL,
    deleted_by          UUID NULL,
    deleted_at          TIMESTAMPTZ NULL
);

CREATE TABLE IF NOT EXISTS cutting_order_items (
    order_id        UUID NOT NULL REFERENCES cutting_orders (order_id),
    component_id    UUID NOT NULL,
    quantity        NUMERIC(18, 4) NOT NULL CHECK (quantity > 0),
    PRIMARY KEY (order_id, component_id)
);

CREATE INDEX IF NOT EXISTS cutting_order_items_component_idx
    ON cutting_order_items (component_id);
"#;

const STOCK_COLUMNS: &str = "target_kind, target_id, parent_item_id, quantity, active, \
     created_by, created_at, modified_by, modified_at, deleted_by, deleted_at";

const EVENT_COLUMNS: &str =
    "event_id, target_kind, target_id, delta, kind, note, actor, created_at";

const ORDER_COLUMNS: &str = "order_id, order_number, sales_order_id, sales_order_line_id, \
     target_item_id, target_quantity, status, operator_id, allow_late_items, notes, \
     completed_at, version, active, created_by, created_at, modified_by, modified_at, \
     deleted_by, deleted_at";

/// Postgres-backed [`StockStore`].
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    handle: Handle,
}

impl PostgresStockStore {
    /// Wrap an existing pool. `handle` is the runtime that drives its connections.
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    /// Connect to `database_url` on the given runtime.
    pub fn connect(database_url: &str, handle: Handle) -> Result<Self, StoreError> {
        let pool = handle
            .block_on(
                PgPoolOptions::new()
                    .max_connections(10)
                    .connect(database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, handle))
    }

    /// Create tables, constraints and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub fn migrate(&self) -> Result<(), StoreError> {
        self.handle
            .block_on(sqlx::raw_sql(MIGRATION).execute(&self.pool))
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

impl StockStore for PostgresStockStore {
    type Tx<'a> = PostgresTx<'a>;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        let tx = self
            .handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PostgresTx {
            handle: &self.handle,
            tx,
        })
    }
}

/// Open Postgres transaction. Dropping it without commit rolls back.
pub struct PostgresTx<'a> {
    handle: &'a Handle,
    tx: Transaction<'static, Postgres>,
}

impl PostgresTx<'_> {
    fn fetch_optional(
        &mut self,
        operation: &str,
        sql: &str,
        kind: &str,
        id: Uuid,
    ) -> Result<Option<PgRow>, StoreError> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(sql)
                    .bind(kind)
                    .bind(id)
                    .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error(operation, e))
    }

    fn load_items(&mut self, order_id: CuttingOrderId) -> Result<Vec<OrderItem>, StoreError> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT component_id, quantity FROM cutting_order_items \
                     WHERE order_id = $1 ORDER BY component_id",
                )
                .bind(order_id.as_uuid())
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("load_items", e))?;

        rows.iter()
            .map(|row| {
                Ok(OrderItem {
                    component_id: ComponentId::from_uuid(get(row, "component_id")?),
                    quantity: get(row, "quantity")?,
                })
            })
            .collect()
    }

    fn load_order(&mut self, row: Option<PgRow>) -> Result<Option<CuttingOrder>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let (header, version) = order_header_from_row(&row)?;
        let items = self.load_items(header.id)?;
        Ok(Some(CuttingOrder::restore(header, items, version)))
    }

    fn write_items(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
        let order_id = *order.id_typed().as_uuid();
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query("DELETE FROM cutting_order_items WHERE order_id = $1")
                    .bind(order_id)
                    .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("delete_items", e))?;

        for item in order.items() {
            self.handle
                .block_on(
                    sqlx::query(
                        "INSERT INTO cutting_order_items (order_id, component_id, quantity) \
                         VALUES ($1, $2, $3)",
                    )
                    .bind(order_id)
                    .bind(item.component_id.as_uuid())
                    .bind(item.quantity)
                    .execute(&mut **tx),
                )
                .map_err(|e| map_sqlx_error("insert_item", e))?;
        }
        Ok(())
    }
}

impl StockTx for PostgresTx<'_> {
    fn find_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError> {
        let (kind, id) = target_key(target);
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM item_stocks WHERE target_kind = $1 AND target_id = $2"
        );
        self.fetch_optional("find_stock", &sql, kind, id)?
            .map(|row| stock_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self), err)]
    fn lock_stock(&mut self, target: StockTarget) -> Result<Option<ItemStock>, StoreError> {
        let (kind, id) = target_key(target);
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM item_stocks \
             WHERE target_kind = $1 AND target_id = $2 FOR UPDATE"
        );
        self.fetch_optional("lock_stock", &sql, kind, id)?
            .map(|row| stock_from_row(&row))
            .transpose()
    }

    fn insert_stock(&mut self, stock: &ItemStock) -> Result<bool, StoreError> {
        let (kind, id) = target_key(stock.target());
        let audit = stock.audit();
        let tx = &mut self.tx;
        let result = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "INSERT INTO item_stocks ({STOCK_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                     ON CONFLICT (target_kind, target_id) DO NOTHING"
                ))
                .bind(kind)
                .bind(id)
                .bind(stock.parent_item().map(|p| *p.as_uuid()))
                .bind(stock.quantity())
                .bind(audit.active)
                .bind(audit.created_by.as_uuid())
                .bind(audit.created_at)
                .bind(audit.modified_by.map(|u| *u.as_uuid()))
                .bind(audit.modified_at)
                .bind(audit.deleted_by.map(|u| *u.as_uuid()))
                .bind(audit.deleted_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("insert_stock", e))?;
        Ok(result.rows_affected() == 1)
    }

    fn save_stock(&mut self, stock: &ItemStock) -> Result<(), StoreError> {
        let (kind, id) = target_key(stock.target());
        let audit = stock.audit();
        let tx = &mut self.tx;
        let result = self
            .handle
            .block_on(
                sqlx::query(
                    "UPDATE item_stocks SET quantity = $3, active = $4, \
                     modified_by = $5, modified_at = $6, deleted_by = $7, deleted_at = $8 \
                     WHERE target_kind = $1 AND target_id = $2",
                )
                .bind(kind)
                .bind(id)
                .bind(stock.quantity())
                .bind(audit.active)
                .bind(audit.modified_by.map(|u| *u.as_uuid()))
                .bind(audit.modified_at)
                .bind(audit.deleted_by.map(|u| *u.as_uuid()))
                .bind(audit.deleted_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("save_stock", e))?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "no stock row for {}",
                stock.target()
            )));
        }
        Ok(())
    }

    fn component_stocks_of(&mut self, item: ItemId) -> Result<Vec<ItemStock>, StoreError> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "SELECT {STOCK_COLUMNS} FROM item_stocks \
                     WHERE parent_item_id = $1 ORDER BY target_id"
                ))
                .bind(item.as_uuid())
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("component_stocks_of", e))?;
        rows.iter().map(stock_from_row).collect()
    }

    fn list_stocks(&mut self) -> Result<Vec<ItemStock>, StoreError> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(&format!("SELECT {STOCK_COLUMNS} FROM item_stocks"))
                    .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("list_stocks", e))?;
        let mut stocks = rows
            .iter()
            .map(stock_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        stocks.sort_by_key(|s| s.target());
        Ok(stocks)
    }

    fn insert_stock_event(&mut self, event: &StockEvent) -> Result<(), StoreError> {
        let (kind, id) = target_key(event.target);
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(&format!(
                    "INSERT INTO stock_events ({EVENT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
                ))
                .bind(event.id.as_uuid())
                .bind(kind)
                .bind(id)
                .bind(event.delta)
                .bind(event.kind.as_str())
                .bind(&event.note)
                .bind(event.actor.as_uuid())
                .bind(event.created_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("insert_stock_event", e))?;
        Ok(())
    }

    fn stock_events(&mut self, target: StockTarget) -> Result<Vec<StockEvent>, StoreError> {
        let (kind, id) = target_key(target);
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "SELECT {EVENT_COLUMNS} FROM stock_events \
                     WHERE target_kind = $1 AND target_id = $2 ORDER BY seq ASC"
                ))
                .bind(kind)
                .bind(id)
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("stock_events", e))?;
        rows.iter().map(event_from_row).collect()
    }

    fn find_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM cutting_orders WHERE order_id = $1"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("find_order", e))?;
        self.load_order(row)
    }

    fn find_order_by_number(
        &mut self,
        order_number: &str,
    ) -> Result<Option<CuttingOrderId>, StoreError> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query("SELECT order_id FROM cutting_orders WHERE order_number = $1")
                    .bind(order_number)
                    .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("find_order_by_number", e))?;
        row.map(|r| get::<Uuid>(&r, "order_id").map(CuttingOrderId::from_uuid))
            .transpose()
    }

    #[instrument(skip(self), err)]
    fn lock_order(&mut self, id: CuttingOrderId) -> Result<Option<CuttingOrder>, StoreError> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM cutting_orders WHERE order_id = $1 FOR UPDATE"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("lock_order", e))?;
        self.load_order(row)
    }

    fn insert_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
        let header = order
            .header()
            .ok_or_else(|| StoreError::Backend("cannot insert an uncreated order".to_string()))?;
        let version = version_column(order.version())?;
        let audit = &header.audit;
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(&format!(
                    "INSERT INTO cutting_orders ({ORDER_COLUMNS}) VALUES \
                     ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                      $11, $12, $13, $14, $15, $16, $17, $18, $19)"
                ))
                .bind(header.id.as_uuid())
                .bind(&header.order_number)
                .bind(header.sales_order_id)
                .bind(header.sales_order_line_id)
                .bind(header.target_item.as_uuid())
                .bind(header.target_quantity)
                .bind(header.status.as_str())
                .bind(header.operator.map(|u| *u.as_uuid()))
                .bind(header.allow_late_items)
                .bind(&header.notes)
                .bind(header.completed_at)
                .bind(version)
                .bind(audit.active)
                .bind(audit.created_by.as_uuid())
                .bind(audit.created_at)
                .bind(audit.modified_by.map(|u| *u.as_uuid()))
                .bind(audit.modified_at)
                .bind(audit.deleted_by.map(|u| *u.as_uuid()))
                .bind(audit.deleted_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        self.write_items(order)
    }

    fn save_order(&mut self, order: &CuttingOrder) -> Result<(), StoreError> {
        let header = order
            .header()
            .ok_or_else(|| StoreError::Backend("cannot save an uncreated order".to_string()))?;
        let version = version_column(order.version())?;
        let audit = &header.audit;
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(
                    "UPDATE cutting_orders SET target_quantity = $2, status = $3, \
                     operator_id = $4, allow_late_items = $5, notes = $6, completed_at = $7, \
                     version = $8, active = $9, modified_by = $10, modified_at = $11, \
                     deleted_by = $12, deleted_at = $13 \
                     WHERE order_id = $1",
                )
                .bind(header.id.as_uuid())
                .bind(header.target_quantity)
                .bind(header.status.as_str())
                .bind(header.operator.map(|u| *u.as_uuid()))
                .bind(header.allow_late_items)
                .bind(&header.notes)
                .bind(header.completed_at)
                .bind(version)
                .bind(audit.active)
                .bind(audit.modified_by.map(|u| *u.as_uuid()))
                .bind(audit.modified_at)
                .bind(audit.deleted_by.map(|u| *u.as_uuid()))
                .bind(audit.deleted_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("save_order", e))?;
        self.write_items(order)
    }

    fn reserved_quantity(
        &mut self,
        component: ComponentId,
        excluding: Option<CuttingOrderId>,
    ) -> Result<Decimal, StoreError> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query(
                    "SELECT COALESCE(SUM(i.quantity), 0) AS reserved \
                     FROM cutting_order_items i \
                     JOIN cutting_orders o ON o.order_id = i.order_id \
                     WHERE i.component_id = $1 \
                       AND o.status IN ('pending', 'in_process') \
                       AND ($2::uuid IS NULL OR o.order_id <> $2)",
                )
                .bind(component.as_uuid())
                .bind(excluding.map(|id| *id.as_uuid()))
                .fetch_one(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("reserved_quantity", e))?;
        get(&row, "reserved")
    }

    fn list_orders(&mut self) -> Result<Vec<CuttingOrder>, StoreError> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM cutting_orders ORDER BY order_id"
                ))
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("list_orders", e))?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(order) = self.load_order(Some(row))? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.handle
            .block_on(self.tx.commit())
            .map_err(|e| map_sqlx_error("commit", e))
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.handle
            .block_on(self.tx.rollback())
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn target_key(target: StockTarget) -> (&'static str, Uuid) {
    match target {
        StockTarget::Item(id) => ("item", *id.as_uuid()),
        StockTarget::Component(id) => ("component", *id.as_uuid()),
    }
}

fn target_from_key(kind: &str, id: Uuid) -> Result<StockTarget, StoreError> {
    match kind {
        "item" => Ok(StockTarget::Item(ItemId::from_uuid(id))),
        "component" => Ok(StockTarget::Component(ComponentId::from_uuid(id))),
        other => Err(StoreError::Backend(format!("unknown target kind '{other}'"))),
    }
}

fn version_column(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Backend(format!("version {version} overflows")))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn audit_from_row(row: &PgRow) -> Result<Audit, StoreError> {
    Ok(Audit {
        active: get(row, "active")?,
        created_by: UserId::from_uuid(get(row, "created_by")?),
        created_at: get::<DateTime<Utc>>(row, "created_at")?,
        modified_by: get::<Option<Uuid>>(row, "modified_by")?.map(UserId::from_uuid),
        modified_at: get(row, "modified_at")?,
        deleted_by: get::<Option<Uuid>>(row, "deleted_by")?.map(UserId::from_uuid),
        deleted_at: get(row, "deleted_at")?,
    })
}

fn stock_from_row(row: &PgRow) -> Result<ItemStock, StoreError> {
    let kind: String = get(row, "target_kind")?;
    let target = target_from_key(&kind, get(row, "target_id")?)?;
    let parent = get::<Option<Uuid>>(row, "parent_item_id")?.map(ItemId::from_uuid);
    ItemStock::restore(target, parent, get(row, "quantity")?, audit_from_row(row)?)
        .map_err(|e| StoreError::Backend(format!("invalid stock row: {e}")))
}

fn event_from_row(row: &PgRow) -> Result<StockEvent, StoreError> {
    let target_kind: String = get(row, "target_kind")?;
    let kind: String = get(row, "kind")?;
    Ok(StockEvent {
        id: StockEventId::from_uuid(get(row, "event_id")?),
        target: target_from_key(&target_kind, get(row, "target_id")?)?,
        delta: get(row, "delta")?,
        kind: kind
            .parse::<StockEventKind>()
            .map_err(|e| StoreError::Backend(format!("invalid stock event row: {e}")))?,
        note: get(row, "note")?,
        actor: UserId::from_uuid(get(row, "actor")?),
        created_at: get(row, "created_at")?,
    })
}

fn order_header_from_row(row: &PgRow) -> Result<(CuttingOrderHeader, u64), StoreError> {
    let status: String = get(row, "status")?;
    let version: i64 = get(row, "version")?;
    let header = CuttingOrderHeader {
        id: CuttingOrderId::from_uuid(get(row, "order_id")?),
        order_number: get(row, "order_number")?,
        sales_order_id: get(row, "sales_order_id")?,
        sales_order_line_id: get(row, "sales_order_line_id")?,
        target_item: ItemId::from_uuid(get(row, "target_item_id")?),
        target_quantity: get(row, "target_quantity")?,
        status: status
            .parse::<CuttingOrderStatus>()
            .map_err(|e| StoreError::Backend(format!("invalid order row: {e}")))?,
        operator: get::<Option<Uuid>>(row, "operator_id")?.map(UserId::from_uuid),
        allow_late_items: get(row, "allow_late_items")?,
        notes: get(row, "notes")?,
        completed_at: get(row, "completed_at")?,
        audit: audit_from_row(row)?,
    };
    let version = u64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("negative order version {version}")))?;
    Ok((header, version))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("23514") => StoreError::CheckViolation(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed during {operation}"))
        }
        other => StoreError::Backend(format!("{operation} failed: {other}")),
    }
}

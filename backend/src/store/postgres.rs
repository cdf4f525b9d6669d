//! PostgreSQL ledger store
//!
//! Allocation commits run in one transaction: the batch-mode flag is read
//! under a share lock, the remision material row is locked, and each lot is
//! decremented with a version check. A lot that moved since planning makes
//! the update touch zero rows, which surfaces as `VersionConflict` and rolls
//! the whole transaction back. Adjustments draw lots the same way.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::fifo::FifoPlan;
use shared::{
    format_adjustment_number, format_entry_number, next_daily_sequence, AdjustmentType,
    DailyInventoryLog, DailyTotals, LedgerBalance, LedgerEvent, LedgerEventKind, LedgerQuery,
    Material, MaterialAdjustment, MaterialConsumptionAllocation, MaterialEntry, MaterialInventory,
    MaterialPrice, NewMaterial, NewMaterialEntry, NewMaterialPrice, NewPlant, NewRemision, Plant,
    Remision, RemisionMaterial, StockKey, StockStatus, TableStats,
};
use sqlx::{Executor, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{AdjustmentCommit, AllocationCommit, LedgerStore, EVENT_RETENTION_DAYS, LEDGER_TABLES};
use crate::error::{AppError, AppResult};

const ENTRY_COLUMNS: &str = "id, entry_number, plant_id, material_id, supplier_id, entry_date, \
     quantity_received_kg, unit_price, remaining_quantity_kg, inventory_before, inventory_after, \
     sequence, version, supplier_invoice, notes, entered_by, created_at";

const ALLOCATION_COLUMNS: &str = "id, remision_id, remision_material_id, entry_id, entry_number, \
     material_id, plant_id, quantity_consumed_kg, unit_price, total_cost, consumption_date, \
     created_by, created_at";

const INVENTORY_COLUMNS: &str = "plant_id, material_id, current_stock, minimum_stock, \
     maximum_stock, stock_status, last_entry_date, last_consumption_date, updated_at";

const REMISION_MATERIAL_COLUMNS: &str = "id, remision_id, material_id, cantidad_real, \
     line_number, unit_cost_weighted, total_cost_fifo, fifo_allocated_at";

const ADJUSTMENT_COLUMNS: &str = "id, adjustment_number, plant_id, material_id, adjustment_date, \
     adjustment_type, quantity_adjusted_kg, inventory_before, inventory_after, total_cost, \
     reference_type, reference_notes, adjusted_by, created_at";

const DAILY_LOG_COLUMNS: &str = "plant_id, log_date, total_entries, total_adjustments, \
     total_consumption, is_closed, closed_by, closed_at, daily_notes, updated_at";

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct PlantRow {
    id: Uuid,
    code: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<PlantRow> for Plant {
    fn from(row: PlantRow) -> Self {
        Plant {
            id: row.id,
            code: row.code,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MaterialRow {
    id: Uuid,
    material_code: String,
    material_name: String,
    category: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            material_code: row.material_code,
            material_name: row.material_name,
            category: row.category,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    id: Uuid,
    entry_number: String,
    plant_id: Uuid,
    material_id: Uuid,
    supplier_id: Option<Uuid>,
    entry_date: NaiveDate,
    quantity_received_kg: Decimal,
    unit_price: Option<Decimal>,
    remaining_quantity_kg: Decimal,
    inventory_before: Decimal,
    inventory_after: Decimal,
    sequence: i64,
    version: i64,
    supplier_invoice: Option<String>,
    notes: Option<String>,
    entered_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<EntryRow> for MaterialEntry {
    fn from(row: EntryRow) -> Self {
        MaterialEntry {
            id: row.id,
            entry_number: row.entry_number,
            plant_id: row.plant_id,
            material_id: row.material_id,
            supplier_id: row.supplier_id,
            entry_date: row.entry_date,
            quantity_received_kg: row.quantity_received_kg,
            unit_price: row.unit_price,
            remaining_quantity_kg: row.remaining_quantity_kg,
            inventory_before: row.inventory_before,
            inventory_after: row.inventory_after,
            sequence: row.sequence,
            version: row.version,
            supplier_invoice: row.supplier_invoice,
            notes: row.notes,
            entered_by: row.entered_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PriceRow {
    id: Uuid,
    material_id: Uuid,
    plant_id: Uuid,
    price_per_unit: Decimal,
    effective_date: NaiveDate,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<PriceRow> for MaterialPrice {
    fn from(row: PriceRow) -> Self {
        MaterialPrice {
            id: row.id,
            material_id: row.material_id,
            plant_id: row.plant_id,
            price_per_unit: row.price_per_unit,
            effective_date: row.effective_date,
            end_date: row.end_date,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AllocationRow {
    id: Uuid,
    remision_id: Uuid,
    remision_material_id: Uuid,
    entry_id: Uuid,
    entry_number: String,
    material_id: Uuid,
    plant_id: Uuid,
    quantity_consumed_kg: Decimal,
    unit_price: Decimal,
    total_cost: Decimal,
    consumption_date: NaiveDate,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<AllocationRow> for MaterialConsumptionAllocation {
    fn from(row: AllocationRow) -> Self {
        MaterialConsumptionAllocation {
            id: row.id,
            remision_id: row.remision_id,
            remision_material_id: row.remision_material_id,
            entry_id: row.entry_id,
            entry_number: row.entry_number,
            material_id: row.material_id,
            plant_id: row.plant_id,
            quantity_consumed_kg: row.quantity_consumed_kg,
            unit_price: row.unit_price,
            total_cost: row.total_cost,
            consumption_date: row.consumption_date,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InventoryRow {
    plant_id: Uuid,
    material_id: Uuid,
    current_stock: Decimal,
    minimum_stock: Decimal,
    maximum_stock: Option<Decimal>,
    stock_status: String,
    last_entry_date: Option<NaiveDate>,
    last_consumption_date: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InventoryRow> for MaterialInventory {
    type Error = AppError;

    fn try_from(row: InventoryRow) -> Result<Self, Self::Error> {
        let stock_status = row
            .stock_status
            .parse::<StockStatus>()
            .map_err(AppError::Internal)?;
        Ok(MaterialInventory {
            plant_id: row.plant_id,
            material_id: row.material_id,
            current_stock: row.current_stock,
            minimum_stock: row.minimum_stock,
            maximum_stock: row.maximum_stock,
            stock_status,
            last_entry_date: row.last_entry_date,
            last_consumption_date: row.last_consumption_date,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RemisionRow {
    id: Uuid,
    remision_number: String,
    plant_id: Uuid,
    fecha: NaiveDate,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RemisionMaterialRow {
    id: Uuid,
    remision_id: Uuid,
    material_id: Uuid,
    cantidad_real: Decimal,
    line_number: i32,
    unit_cost_weighted: Option<Decimal>,
    total_cost_fifo: Option<Decimal>,
    fifo_allocated_at: Option<DateTime<Utc>>,
}

impl From<RemisionMaterialRow> for RemisionMaterial {
    fn from(row: RemisionMaterialRow) -> Self {
        RemisionMaterial {
            id: row.id,
            remision_id: row.remision_id,
            material_id: row.material_id,
            cantidad_real: row.cantidad_real,
            line_number: row.line_number,
            unit_cost_weighted: row.unit_cost_weighted,
            total_cost_fifo: row.total_cost_fifo,
            fifo_allocated_at: row.fifo_allocated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DailyLogRow {
    plant_id: Uuid,
    log_date: NaiveDate,
    total_entries: Decimal,
    total_adjustments: Decimal,
    total_consumption: Decimal,
    is_closed: bool,
    closed_by: Option<Uuid>,
    closed_at: Option<DateTime<Utc>>,
    daily_notes: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<DailyLogRow> for DailyInventoryLog {
    fn from(row: DailyLogRow) -> Self {
        DailyInventoryLog {
            plant_id: row.plant_id,
            log_date: row.log_date,
            total_entries: row.total_entries,
            total_adjustments: row.total_adjustments,
            total_consumption: row.total_consumption,
            is_closed: row.is_closed,
            closed_by: row.closed_by,
            closed_at: row.closed_at,
            daily_notes: row.daily_notes,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AdjustmentRow {
    id: Uuid,
    adjustment_number: String,
    plant_id: Uuid,
    material_id: Uuid,
    adjustment_date: NaiveDate,
    adjustment_type: String,
    quantity_adjusted_kg: Decimal,
    inventory_before: Decimal,
    inventory_after: Decimal,
    total_cost: Decimal,
    reference_type: Option<String>,
    reference_notes: String,
    adjusted_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<AdjustmentRow> for MaterialAdjustment {
    type Error = AppError;

    fn try_from(row: AdjustmentRow) -> Result<Self, Self::Error> {
        Ok(MaterialAdjustment {
            id: row.id,
            adjustment_number: row.adjustment_number,
            plant_id: row.plant_id,
            material_id: row.material_id,
            adjustment_date: row.adjustment_date,
            adjustment_type: row
                .adjustment_type
                .parse::<AdjustmentType>()
                .map_err(AppError::Internal)?,
            quantity_adjusted_kg: row.quantity_adjusted_kg,
            inventory_before: row.inventory_before,
            inventory_after: row.inventory_after,
            total_cost: row.total_cost,
            reference_type: row.reference_type,
            reference_notes: row.reference_notes,
            adjusted_by: row.adjusted_by,
            created_at: row.created_at,
        })
    }
}

/// Row for ledger balance queries
#[derive(Debug, FromRow)]
struct BalanceRow {
    plant_id: Uuid,
    material_id: Uuid,
    total_received_kg: Decimal,
    total_consumed_kg: Decimal,
    total_adjusted_kg: Decimal,
    last_entry_date: Option<NaiveDate>,
    last_consumption_date: Option<NaiveDate>,
}

impl From<BalanceRow> for LedgerBalance {
    fn from(row: BalanceRow) -> Self {
        LedgerBalance {
            plant_id: row.plant_id,
            material_id: row.material_id,
            total_received_kg: row.total_received_kg,
            total_consumed_kg: row.total_consumed_kg,
            total_adjusted_kg: row.total_adjusted_kg,
            last_entry_date: row.last_entry_date,
            last_consumption_date: row.last_consumption_date,
        }
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    plant_id: Uuid,
    material_id: Uuid,
    kind: String,
    occurred_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct TableStatsRow {
    table_name: String,
    live_rows: i64,
    dead_rows: i64,
}

async fn fetch_balance(conn: &mut PgConnection, key: StockKey) -> AppResult<LedgerBalance> {
    let row = sqlx::query_as::<_, BalanceRow>(
        r#"
        SELECT $1::uuid AS plant_id, $2::uuid AS material_id,
               r.total_received_kg, c.total_consumed_kg, a.total_adjusted_kg,
               r.last_entry_date, c.last_consumption_date
        FROM (
            SELECT COALESCE(SUM(quantity_received_kg), 0) AS total_received_kg,
                   MAX(entry_date) AS last_entry_date
            FROM material_entries
            WHERE plant_id = $1 AND material_id = $2
        ) r,
        (
            SELECT COALESCE(SUM(quantity_consumed_kg), 0) AS total_consumed_kg,
                   MAX(consumption_date) AS last_consumption_date
            FROM material_consumption_allocations
            WHERE plant_id = $1 AND material_id = $2
        ) c,
        (
            SELECT COALESCE(SUM(quantity_adjusted_kg), 0) AS total_adjusted_kg
            FROM material_adjustments
            WHERE plant_id = $1 AND material_id = $2
        ) a
        "#,
    )
    .bind(key.plant_id)
    .bind(key.material_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

async fn fetch_inventory_for_update(
    conn: &mut PgConnection,
    key: StockKey,
) -> AppResult<Option<MaterialInventory>> {
    let row = sqlx::query_as::<_, InventoryRow>(&format!(
        "SELECT {} FROM material_inventory WHERE plant_id = $1 AND material_id = $2 FOR UPDATE",
        INVENTORY_COLUMNS
    ))
    .bind(key.plant_id)
    .bind(key.material_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(MaterialInventory::try_from).transpose()
}

async fn save_inventory(conn: &mut PgConnection, row: &MaterialInventory) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO material_inventory (
            plant_id, material_id, current_stock, minimum_stock, maximum_stock,
            stock_status, last_entry_date, last_consumption_date, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (plant_id, material_id) DO UPDATE SET
            current_stock = EXCLUDED.current_stock,
            minimum_stock = EXCLUDED.minimum_stock,
            maximum_stock = EXCLUDED.maximum_stock,
            stock_status = EXCLUDED.stock_status,
            last_entry_date = EXCLUDED.last_entry_date,
            last_consumption_date = EXCLUDED.last_consumption_date,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(row.plant_id)
    .bind(row.material_id)
    .bind(row.current_stock)
    .bind(row.minimum_stock)
    .bind(row.maximum_stock)
    .bind(row.stock_status.as_str())
    .bind(row.last_entry_date)
    .bind(row.last_consumption_date)
    .bind(row.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn record_event(
    conn: &mut PgConnection,
    key: StockKey,
    kind: LedgerEventKind,
    at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO ledger_events (plant_id, material_id, kind, occurred_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(key.plant_id)
    .bind(key.material_id)
    .bind(kind.as_str())
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rebuild one materialized balance from the ledger, keeping its thresholds
async fn recompute_position(
    conn: &mut PgConnection,
    key: StockKey,
    now: DateTime<Utc>,
) -> AppResult<MaterialInventory> {
    let mut row = fetch_inventory_for_update(conn, key)
        .await?
        .unwrap_or_else(|| MaterialInventory::empty(key, now));
    let balance = fetch_balance(conn, key).await?;
    row.apply_balance(&balance, now);
    save_inventory(conn, &row).await?;
    record_event(conn, key, LedgerEventKind::InventoryRecomputed, now).await?;
    Ok(row)
}

/// Decrement every planned lot, failing on the first one that moved
async fn draw_lots(conn: &mut PgConnection, key: StockKey, plan: &FifoPlan) -> AppResult<()> {
    for draw in &plan.draws {
        let updated = sqlx::query(
            r#"
            UPDATE material_entries
            SET remaining_quantity_kg = remaining_quantity_kg - $1,
                version = version + 1
            WHERE id = $2 AND version = $3
              AND remaining_quantity_kg >= $1
              AND plant_id = $4 AND material_id = $5
            "#,
        )
        .bind(draw.quantity_kg)
        .bind(draw.entry_id)
        .bind(draw.expected_version)
        .bind(key.plant_id)
        .bind(key.material_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::VersionConflict {
                entry_id: draw.entry_id,
            });
        }
    }
    Ok(())
}

async fn fetch_remision_materials(
    conn: &mut PgConnection,
    remision_id: Uuid,
) -> AppResult<Vec<RemisionMaterial>> {
    let rows = sqlx::query_as::<_, RemisionMaterialRow>(&format!(
        "SELECT {} FROM remision_materiales WHERE remision_id = $1 ORDER BY line_number",
        REMISION_MATERIAL_COLUMNS
    ))
    .bind(remision_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn upsert_plant(&self, input: NewPlant) -> AppResult<Plant> {
        let row = sqlx::query_as::<_, PlantRow>(
            r#"
            INSERT INTO plants (id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET code = EXCLUDED.code, name = EXCLUDED.name
            RETURNING id, code, name, created_at
            "#,
        )
        .bind(input.id.unwrap_or_else(Uuid::new_v4))
        .bind(&input.code)
        .bind(&input.name)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn upsert_material(&self, input: NewMaterial) -> AppResult<Material> {
        let row = sqlx::query_as::<_, MaterialRow>(
            r#"
            INSERT INTO materials (id, material_code, material_name, category)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                material_code = EXCLUDED.material_code,
                material_name = EXCLUDED.material_name,
                category = EXCLUDED.category
            RETURNING id, material_code, material_name, category, created_at
            "#,
        )
        .bind(input.id.unwrap_or_else(Uuid::new_v4))
        .bind(&input.material_code)
        .bind(&input.material_name)
        .bind(&input.category)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn plant_exists(&self, plant_id: Uuid) -> AppResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM plants WHERE id = $1)")
                .bind(plant_id)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn material_exists(&self, material_id: Uuid) -> AppResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM materials WHERE id = $1)")
                .bind(material_id)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn insert_entry(
        &self,
        input: NewMaterialEntry,
        entry_date: NaiveDate,
        entered_by: Uuid,
    ) -> AppResult<MaterialEntry> {
        let key = StockKey::new(input.plant_id, input.material_id);
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Entry numbers are issued per plant per day
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(input.plant_id)
            .execute(&mut *tx)
            .await?;

        let issued = sqlx::query_scalar::<_, String>(
            "SELECT entry_number FROM material_entries WHERE plant_id = $1 AND entry_date = $2",
        )
        .bind(input.plant_id)
        .bind(entry_date)
        .fetch_all(&mut *tx)
        .await?;
        let entry_number =
            format_entry_number(entry_date, next_daily_sequence(issued.iter().map(String::as_str)));

        let inventory_before = fetch_balance(&mut tx, key).await?.current_stock();

        let row = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            INSERT INTO material_entries (
                id, entry_number, plant_id, material_id, supplier_id, entry_date,
                quantity_received_kg, unit_price, remaining_quantity_kg,
                inventory_before, inventory_after, supplier_invoice, notes, entered_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $7, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&entry_number)
        .bind(input.plant_id)
        .bind(input.material_id)
        .bind(input.supplier_id)
        .bind(entry_date)
        .bind(input.quantity_received_kg)
        .bind(input.unit_price)
        .bind(inventory_before)
        .bind(inventory_before + input.quantity_received_kg)
        .bind(&input.supplier_invoice)
        .bind(&input.notes)
        .bind(entered_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        record_event(&mut tx, key, LedgerEventKind::EntryRecorded, now).await?;
        recompute_position(&mut tx, key, now).await?;
        tx.commit().await?;

        Ok(row.into())
    }

    async fn open_layers(
        &self,
        key: StockKey,
        as_of: Option<NaiveDate>,
    ) -> AppResult<Vec<MaterialEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {}
            FROM material_entries
            WHERE plant_id = $1 AND material_id = $2
              AND remaining_quantity_kg > 0
              AND ($3::date IS NULL OR entry_date <= $3)
            ORDER BY entry_date, sequence
            "#,
            ENTRY_COLUMNS
        ))
        .bind(key.plant_id)
        .bind(key.material_id)
        .bind(as_of)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_entries(&self, query: &LedgerQuery) -> AppResult<Vec<MaterialEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {}
            FROM material_entries
            WHERE plant_id = $1
              AND ($2::uuid IS NULL OR material_id = $2)
              AND ($3::date IS NULL OR entry_date >= $3)
              AND ($4::date IS NULL OR entry_date <= $4)
            ORDER BY entry_date DESC, sequence DESC
            LIMIT $5 OFFSET $6
            "#,
            ENTRY_COLUMNS
        ))
        .bind(query.plant_id)
        .bind(query.material_id)
        .bind(query.date_from)
        .bind(query.date_to)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_price(&self, input: NewMaterialPrice) -> AppResult<MaterialPrice> {
        let row = sqlx::query_as::<_, PriceRow>(
            r#"
            INSERT INTO material_prices (id, material_id, plant_id, price_per_unit, effective_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, material_id, plant_id, price_per_unit, effective_date, end_date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.material_id)
        .bind(input.plant_id)
        .bind(input.price_per_unit)
        .bind(input.effective_date)
        .bind(input.end_date)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn prices_for(&self, key: StockKey) -> AppResult<Vec<MaterialPrice>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT id, material_id, plant_id, price_per_unit, effective_date, end_date, created_at
            FROM material_prices
            WHERE plant_id = $1 AND material_id = $2
            ORDER BY effective_date
            "#,
        )
        .bind(key.plant_id)
        .bind(key.material_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_remision(&self, input: NewRemision) -> AppResult<Remision> {
        let remision_id = input.id.unwrap_or_else(Uuid::new_v4);
        let mut tx = self.db.begin().await?;

        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM remisiones WHERE id = $1)")
                .bind(remision_id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(AppError::Conflict {
                resource: "remision".to_string(),
                message: format!("Remision {} already exists", remision_id),
                message_es: format!("La remisión {} ya existe", remision_id),
            });
        }

        let header = sqlx::query_as::<_, RemisionRow>(
            r#"
            INSERT INTO remisiones (id, remision_number, plant_id, fecha)
            VALUES ($1, $2, $3, $4)
            RETURNING id, remision_number, plant_id, fecha, created_at
            "#,
        )
        .bind(remision_id)
        .bind(&input.remision_number)
        .bind(input.plant_id)
        .bind(input.fecha)
        .fetch_one(&mut *tx)
        .await?;

        let mut materials = Vec::with_capacity(input.materials.len());
        for (i, material) in input.materials.iter().enumerate() {
            let row = sqlx::query_as::<_, RemisionMaterialRow>(&format!(
                r#"
                INSERT INTO remision_materiales (id, remision_id, material_id, cantidad_real, line_number)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                REMISION_MATERIAL_COLUMNS
            ))
            .bind(material.id.unwrap_or_else(Uuid::new_v4))
            .bind(remision_id)
            .bind(material.material_id)
            .bind(material.cantidad_real)
            .bind(i as i32 + 1)
            .fetch_one(&mut *tx)
            .await?;
            materials.push(row.into());
        }

        tx.commit().await?;

        Ok(Remision {
            id: header.id,
            remision_number: header.remision_number,
            plant_id: header.plant_id,
            fecha: header.fecha,
            materials,
            created_at: header.created_at,
        })
    }

    async fn get_remision(&self, remision_id: Uuid) -> AppResult<Option<Remision>> {
        let mut conn = self.db.acquire().await?;
        let header = sqlx::query_as::<_, RemisionRow>(
            "SELECT id, remision_number, plant_id, fecha, created_at FROM remisiones WHERE id = $1",
        )
        .bind(remision_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let materials = fetch_remision_materials(&mut conn, header.id).await?;

        Ok(Some(Remision {
            id: header.id,
            remision_number: header.remision_number,
            plant_id: header.plant_id,
            fecha: header.fecha,
            materials,
            created_at: header.created_at,
        }))
    }

    async fn get_remision_material(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<Option<RemisionMaterial>> {
        let row = sqlx::query_as::<_, RemisionMaterialRow>(&format!(
            "SELECT {} FROM remision_materiales WHERE id = $1",
            REMISION_MATERIAL_COLUMNS
        ))
        .bind(remision_material_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn allocations_for(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<Vec<MaterialConsumptionAllocation>> {
        let rows = sqlx::query_as::<_, AllocationRow>(&format!(
            r#"
            SELECT {}
            FROM material_consumption_allocations
            WHERE remision_material_id = $1
            ORDER BY created_at, entry_number
            "#,
            ALLOCATION_COLUMNS
        ))
        .bind(remision_material_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn commit_allocation(
        &self,
        commit: AllocationCommit,
    ) -> AppResult<Vec<MaterialConsumptionAllocation>> {
        let AllocationCommit {
            request,
            plan,
            performed_by,
            recompute,
        } = commit;
        let key = request.stock_key();
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Share lock: disabling triggers waits for in-flight commits
        let enabled = sqlx::query_scalar::<_, bool>(
            "SELECT bool_value FROM ledger_settings WHERE key = 'triggers_enabled' FOR SHARE",
        )
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(true);
        if !enabled {
            return Err(AppError::TriggersDisabled);
        }

        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM remision_materiales WHERE id = $1 FOR UPDATE",
        )
        .bind(request.remision_material_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(AppError::NotFound("Remision material".to_string()));
        }

        let already = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM material_consumption_allocations WHERE remision_material_id = $1)",
        )
        .bind(request.remision_material_id)
        .fetch_one(&mut *tx)
        .await?;
        if already {
            return Err(AppError::AlreadyAllocated {
                remision_material_id: request.remision_material_id,
            });
        }

        draw_lots(&mut tx, key, &plan).await?;

        let mut rows = Vec::with_capacity(plan.draws.len());
        for draw in &plan.draws {
            let row = sqlx::query_as::<_, AllocationRow>(&format!(
                r#"
                INSERT INTO material_consumption_allocations (
                    id, remision_id, remision_material_id, entry_id, entry_number,
                    material_id, plant_id, quantity_consumed_kg, unit_price, total_cost,
                    consumption_date, created_by, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING {}
                "#,
                ALLOCATION_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(request.remision_id)
            .bind(request.remision_material_id)
            .bind(draw.entry_id)
            .bind(&draw.entry_number)
            .bind(request.material_id)
            .bind(request.plant_id)
            .bind(draw.quantity_kg)
            .bind(draw.unit_price)
            .bind(draw.cost)
            .bind(request.consumption_date)
            .bind(performed_by)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            record_event(&mut tx, key, LedgerEventKind::AllocationRecorded, now).await?;
            rows.push(row.into());
        }

        sqlx::query(
            r#"
            UPDATE remision_materiales
            SET unit_cost_weighted = $1, total_cost_fifo = $2, fifo_allocated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(plan.weighted_unit_cost())
        .bind(plan.total_cost)
        .bind(now)
        .bind(request.remision_material_id)
        .execute(&mut *tx)
        .await?;

        if recompute {
            recompute_position(&mut tx, key, now).await?;
        }
        tx.commit().await?;

        Ok(rows)
    }

    async fn commit_adjustment(&self, commit: AdjustmentCommit) -> AppResult<MaterialAdjustment> {
        let AdjustmentCommit {
            input,
            adjustment_date,
            plan,
            performed_by,
        } = commit;
        let key = StockKey::new(input.plant_id, input.material_id);
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Adjustment numbers are issued per plant per day, apart from entries
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('adj:' || $1::text))")
            .bind(input.plant_id)
            .execute(&mut *tx)
            .await?;

        let issued = sqlx::query_scalar::<_, String>(
            "SELECT adjustment_number FROM material_adjustments WHERE plant_id = $1 AND adjustment_date = $2",
        )
        .bind(input.plant_id)
        .bind(adjustment_date)
        .fetch_all(&mut *tx)
        .await?;
        let adjustment_number = format_adjustment_number(
            adjustment_date,
            next_daily_sequence(issued.iter().map(String::as_str)),
        );

        let inventory_before = fetch_balance(&mut tx, key).await?.current_stock();
        draw_lots(&mut tx, key, &plan).await?;

        let row = sqlx::query_as::<_, AdjustmentRow>(&format!(
            r#"
            INSERT INTO material_adjustments (
                id, adjustment_number, plant_id, material_id, adjustment_date,
                adjustment_type, quantity_adjusted_kg, inventory_before, inventory_after,
                total_cost, reference_type, reference_notes, adjusted_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            ADJUSTMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&adjustment_number)
        .bind(input.plant_id)
        .bind(input.material_id)
        .bind(adjustment_date)
        .bind(input.adjustment_type.as_str())
        .bind(input.quantity_adjusted_kg)
        .bind(inventory_before)
        .bind(inventory_before - input.quantity_adjusted_kg)
        .bind(plan.total_cost)
        .bind(&input.reference_type)
        .bind(&input.reference_notes)
        .bind(performed_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        record_event(&mut tx, key, LedgerEventKind::AdjustmentRecorded, now).await?;
        recompute_position(&mut tx, key, now).await?;
        tx.commit().await?;

        row.try_into()
    }

    async fn list_adjustments(&self, query: &LedgerQuery) -> AppResult<Vec<MaterialAdjustment>> {
        let rows = sqlx::query_as::<_, AdjustmentRow>(&format!(
            r#"
            SELECT {}
            FROM material_adjustments
            WHERE plant_id = $1
              AND ($2::uuid IS NULL OR material_id = $2)
              AND ($3::date IS NULL OR adjustment_date >= $3)
              AND ($4::date IS NULL OR adjustment_date <= $4)
            ORDER BY adjustment_date DESC, created_at DESC, adjustment_number DESC
            LIMIT $5 OFFSET $6
            "#,
            ADJUSTMENT_COLUMNS
        ))
        .bind(query.plant_id)
        .bind(query.material_id)
        .bind(query.date_from)
        .bind(query.date_to)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MaterialAdjustment::try_from).collect()
    }

    async fn inventory(&self, key: StockKey) -> AppResult<Option<MaterialInventory>> {
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            "SELECT {} FROM material_inventory WHERE plant_id = $1 AND material_id = $2",
            INVENTORY_COLUMNS
        ))
        .bind(key.plant_id)
        .bind(key.material_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(MaterialInventory::try_from).transpose()
    }

    async fn list_inventory(&self, plant_id: Option<Uuid>) -> AppResult<Vec<MaterialInventory>> {
        let rows = sqlx::query_as::<_, InventoryRow>(&format!(
            r#"
            SELECT {}
            FROM material_inventory
            WHERE ($1::uuid IS NULL OR plant_id = $1)
            ORDER BY current_stock, plant_id, material_id
            "#,
            INVENTORY_COLUMNS
        ))
        .bind(plant_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MaterialInventory::try_from).collect()
    }

    async fn set_thresholds(
        &self,
        key: StockKey,
        minimum: Decimal,
        maximum: Option<Decimal>,
    ) -> AppResult<MaterialInventory> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut row = fetch_inventory_for_update(&mut tx, key)
            .await?
            .unwrap_or_else(|| MaterialInventory::empty(key, now));
        row.minimum_stock = minimum;
        row.maximum_stock = maximum;
        let balance = fetch_balance(&mut tx, key).await?;
        row.apply_balance(&balance, now);
        save_inventory(&mut tx, &row).await?;
        tx.commit().await?;

        Ok(row)
    }

    async fn recompute_inventory(&self, key: StockKey) -> AppResult<MaterialInventory> {
        let mut tx = self.db.begin().await?;
        let row = recompute_position(&mut tx, key, Utc::now()).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn ledger_balances(&self) -> AppResult<Vec<LedgerBalance>> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT k.plant_id, k.material_id,
                   COALESCE(r.total_received_kg, 0) AS total_received_kg,
                   COALESCE(c.total_consumed_kg, 0) AS total_consumed_kg,
                   COALESCE(a.total_adjusted_kg, 0) AS total_adjusted_kg,
                   r.last_entry_date, c.last_consumption_date
            FROM (
                SELECT plant_id, material_id FROM material_entries
                UNION
                SELECT plant_id, material_id FROM material_consumption_allocations
                UNION
                SELECT plant_id, material_id FROM material_adjustments
                UNION
                SELECT plant_id, material_id FROM material_inventory
            ) k
            LEFT JOIN (
                SELECT plant_id, material_id,
                       SUM(quantity_received_kg) AS total_received_kg,
                       MAX(entry_date) AS last_entry_date
                FROM material_entries
                GROUP BY plant_id, material_id
            ) r ON r.plant_id = k.plant_id AND r.material_id = k.material_id
            LEFT JOIN (
                SELECT plant_id, material_id,
                       SUM(quantity_consumed_kg) AS total_consumed_kg,
                       MAX(consumption_date) AS last_consumption_date
                FROM material_consumption_allocations
                GROUP BY plant_id, material_id
            ) c ON c.plant_id = k.plant_id AND c.material_id = k.material_id
            LEFT JOIN (
                SELECT plant_id, material_id, SUM(quantity_adjusted_kg) AS total_adjusted_kg
                FROM material_adjustments
                GROUP BY plant_id, material_id
            ) a ON a.plant_id = k.plant_id AND a.material_id = k.material_id
            ORDER BY k.plant_id, k.material_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn daily_totals(&self, plant_id: Uuid, date: NaiveDate) -> AppResult<DailyTotals> {
        let (received_kg, consumed_kg, adjusted_kg) =
            sqlx::query_as::<_, (Decimal, Decimal, Decimal)>(
                r#"
                SELECT
                    (SELECT COALESCE(SUM(quantity_received_kg), 0)
                     FROM material_entries
                     WHERE plant_id = $1 AND entry_date = $2),
                    (SELECT COALESCE(SUM(quantity_consumed_kg), 0)
                     FROM material_consumption_allocations
                     WHERE plant_id = $1 AND consumption_date = $2),
                    (SELECT COALESCE(SUM(quantity_adjusted_kg), 0)
                     FROM material_adjustments
                     WHERE plant_id = $1 AND adjustment_date = $2)
                "#,
            )
            .bind(plant_id)
            .bind(date)
            .fetch_one(&self.db)
            .await?;

        Ok(DailyTotals {
            received_kg,
            consumed_kg,
            adjusted_kg,
        })
    }

    async fn get_daily_log(
        &self,
        plant_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Option<DailyInventoryLog>> {
        let row = sqlx::query_as::<_, DailyLogRow>(&format!(
            "SELECT {} FROM daily_inventory_log WHERE plant_id = $1 AND log_date = $2",
            DAILY_LOG_COLUMNS
        ))
        .bind(plant_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn save_daily_log(&self, log: DailyInventoryLog) -> AppResult<DailyInventoryLog> {
        let row = sqlx::query_as::<_, DailyLogRow>(&format!(
            r#"
            INSERT INTO daily_inventory_log (
                plant_id, log_date, total_entries, total_adjustments, total_consumption,
                is_closed, closed_by, closed_at, daily_notes, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (plant_id, log_date) DO UPDATE SET
                total_entries = EXCLUDED.total_entries,
                total_adjustments = EXCLUDED.total_adjustments,
                total_consumption = EXCLUDED.total_consumption,
                is_closed = EXCLUDED.is_closed,
                closed_by = EXCLUDED.closed_by,
                closed_at = EXCLUDED.closed_at,
                daily_notes = EXCLUDED.daily_notes,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            DAILY_LOG_COLUMNS
        ))
        .bind(log.plant_id)
        .bind(log.log_date)
        .bind(log.total_entries)
        .bind(log.total_adjustments)
        .bind(log.total_consumption)
        .bind(log.is_closed)
        .bind(log.closed_by)
        .bind(log.closed_at)
        .bind(&log.daily_notes)
        .bind(log.updated_at)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn triggers_enabled(&self) -> AppResult<bool> {
        let enabled = sqlx::query_scalar::<_, bool>(
            "SELECT bool_value FROM ledger_settings WHERE key = 'triggers_enabled'",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(enabled.unwrap_or(true))
    }

    async fn set_triggers_enabled(&self, enabled: bool) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let previous = sqlx::query_scalar::<_, bool>(
            "SELECT bool_value FROM ledger_settings WHERE key = 'triggers_enabled' FOR UPDATE",
        )
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(true);

        sqlx::query(
            r#"
            INSERT INTO ledger_settings (key, bool_value, updated_at)
            VALUES ('triggers_enabled', $1, NOW())
            ON CONFLICT (key) DO UPDATE SET bool_value = EXCLUDED.bool_value, updated_at = NOW()
            "#,
        )
        .bind(enabled)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn count_unallocated_remision_materials(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM remision_materiales
            WHERE cantidad_real > 0 AND fifo_allocated_at IS NULL
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    async fn ledger_events_since(&self, since: DateTime<Utc>) -> AppResult<Vec<LedgerEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT plant_id, material_id, kind, occurred_at
            FROM ledger_events
            WHERE occurred_at >= $1
            ORDER BY occurred_at
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let kind = row.kind.parse::<LedgerEventKind>().map_err(AppError::Internal)?;
                Ok(LedgerEvent::new(
                    StockKey::new(row.plant_id, row.material_id),
                    kind,
                    row.occurred_at,
                ))
            })
            .collect()
    }

    async fn table_stats(&self) -> AppResult<Vec<TableStats>> {
        let tables: Vec<String> = LEDGER_TABLES.iter().map(|t| t.to_string()).collect();
        let rows = sqlx::query_as::<_, TableStatsRow>(
            r#"
            SELECT relname::text AS table_name,
                   n_live_tup AS live_rows,
                   n_dead_tup AS dead_rows
            FROM pg_stat_user_tables
            WHERE relname = ANY($1)
            ORDER BY relname
            "#,
        )
        .bind(&tables)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TableStats {
                table_name: row.table_name,
                live_rows: row.live_rows,
                dead_rows: row.dead_rows,
            })
            .collect())
    }

    async fn vacuum(&self) -> AppResult<()> {
        sqlx::query("DELETE FROM ledger_events WHERE occurred_at < NOW() - make_interval(days => $1)")
            .bind(EVENT_RETENTION_DAYS as i32)
            .execute(&self.db)
            .await?;

        // VACUUM cannot run inside a transaction; plain string queries use
        // the simple protocol
        for table in LEDGER_TABLES {
            let statement = format!("VACUUM (ANALYZE) {}", table);
            self.db.execute(statement.as_str()).await?;
        }
        Ok(())
    }
}

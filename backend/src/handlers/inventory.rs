//! HTTP handlers for ledger and inventory endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    DailyInventoryLog, LedgerQuery, Material, MaterialAdjustment, MaterialEntry,
    MaterialInventory, MaterialPrice, NewMaterial, NewMaterialAdjustment, NewMaterialEntry,
    NewMaterialPrice, NewPlant, NewRemision, Plant, RecordedRemision, DEFAULT_PAGE_SIZE,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::InventoryLedgerService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub low_stock_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct StockThresholdsInput {
    pub minimum_stock: Decimal,
    pub maximum_stock: Option<Decimal>,
}

/// Date range and paging for ledger listings
#[derive(Debug, Deserialize)]
pub struct LedgerListQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub material_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl LedgerListQuery {
    fn for_plant(self, plant_id: Uuid) -> LedgerQuery {
        LedgerQuery {
            plant_id,
            date_from: self.date_from,
            date_to: self.date_to,
            material_id: self.material_id,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseDayInput {
    pub notes: Option<String>,
}

fn ledger_service(state: &AppState) -> InventoryLedgerService {
    InventoryLedgerService::new(state.store.clone(), state.config.fifo.clone())
}

/// Register or update a plant
pub async fn register_plant(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Json(input): Json<NewPlant>,
) -> AppResult<Json<Plant>> {
    let plant = ledger_service(&state).register_plant(input).await?;
    Ok(Json(plant))
}

/// Register or update a material
pub async fn register_material(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Json(input): Json<NewMaterial>,
) -> AppResult<Json<Material>> {
    let material = ledger_service(&state).register_material(input).await?;
    Ok(Json(material))
}

/// Record a received lot
pub async fn record_material_entry(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<NewMaterialEntry>,
) -> AppResult<Json<MaterialEntry>> {
    let entry = ledger_service(&state)
        .record_material_entry(input, current_user.0)
        .await?;
    Ok(Json(entry))
}

/// Write stock off a position
pub async fn record_material_adjustment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<NewMaterialAdjustment>,
) -> AppResult<Json<MaterialAdjustment>> {
    let adjustment = ledger_service(&state)
        .record_material_adjustment(input, current_user.0)
        .await?;
    Ok(Json(adjustment))
}

pub async fn list_material_entries(
    State(state): State<AppState>,
    Path(plant_id): Path<Uuid>,
    Query(query): Query<LedgerListQuery>,
) -> AppResult<Json<Vec<MaterialEntry>>> {
    let rows = ledger_service(&state)
        .list_material_entries(query.for_plant(plant_id))
        .await?;
    Ok(Json(rows))
}

pub async fn list_material_adjustments(
    State(state): State<AppState>,
    Path(plant_id): Path<Uuid>,
    Query(query): Query<LedgerListQuery>,
) -> AppResult<Json<Vec<MaterialAdjustment>>> {
    let rows = ledger_service(&state)
        .list_material_adjustments(query.for_plant(plant_id))
        .await?;
    Ok(Json(rows))
}

/// Record a remision, allocating its rows unless batch mode is on
pub async fn record_remision(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<NewRemision>,
) -> AppResult<Json<RecordedRemision>> {
    let recorded = ledger_service(&state)
        .record_remision(input, current_user.0)
        .await?;
    Ok(Json(recorded))
}

/// Record a price list row
pub async fn record_material_price(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Json(input): Json<NewMaterialPrice>,
) -> AppResult<Json<MaterialPrice>> {
    let price = ledger_service(&state).record_material_price(input).await?;
    Ok(Json(price))
}

/// Current balances of a plant
pub async fn get_current_inventory(
    State(state): State<AppState>,
    Path(plant_id): Path<Uuid>,
    Query(query): Query<InventoryQuery>,
) -> AppResult<Json<Vec<MaterialInventory>>> {
    let rows = ledger_service(&state)
        .current_inventory(plant_id, query.low_stock_only)
        .await?;
    Ok(Json(rows))
}

pub async fn set_stock_thresholds(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((plant_id, material_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<StockThresholdsInput>,
) -> AppResult<Json<MaterialInventory>> {
    let row = ledger_service(&state)
        .set_stock_thresholds(plant_id, material_id, input.minimum_stock, input.maximum_stock)
        .await?;
    Ok(Json(row))
}

/// Rebuild one balance from the ledger
pub async fn recompute_inventory(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((plant_id, material_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MaterialInventory>> {
    let row = ledger_service(&state)
        .recompute_inventory(plant_id, material_id)
        .await?;
    Ok(Json(row))
}

pub async fn get_daily_log(
    State(state): State<AppState>,
    Path((plant_id, date)): Path<(Uuid, NaiveDate)>,
) -> AppResult<Json<DailyInventoryLog>> {
    let log = ledger_service(&state).get_daily_log(plant_id, date).await?;
    Ok(Json(log))
}

pub async fn rebuild_daily_log(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((plant_id, date)): Path<(Uuid, NaiveDate)>,
) -> AppResult<Json<DailyInventoryLog>> {
    let log = ledger_service(&state)
        .rebuild_daily_log(plant_id, date)
        .await?;
    Ok(Json(log))
}

/// Close an inventory day
pub async fn close_daily_log(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((plant_id, date)): Path<(Uuid, NaiveDate)>,
    Json(input): Json<CloseDayInput>,
) -> AppResult<Json<DailyInventoryLog>> {
    let log = ledger_service(&state)
        .close_daily_log(plant_id, date, current_user.0, input.notes)
        .await?;
    Ok(Json(log))
}

//! HTTP handlers for FIFO allocation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{AutoAllocateResult, FifoAllocationRequest, FifoAllocationResult, InventoryValuation};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::FifoAllocationService;
use crate::AppState;

fn fifo_service(state: &AppState) -> FifoAllocationService {
    FifoAllocationService::new(state.store.clone(), state.config.fifo.clone())
}

/// Allocate consumption for one remision material row
pub async fn allocate_fifo(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<FifoAllocationRequest>,
) -> AppResult<Json<FifoAllocationResult>> {
    let result = fifo_service(&state)
        .allocate_fifo_consumption(request, current_user.0)
        .await?;
    Ok(Json(result))
}

/// Stored FIFO cost of a remision material row
pub async fn get_remision_material_cost(
    State(state): State<AppState>,
    Path(remision_material_id): Path<Uuid>,
) -> AppResult<Json<FifoAllocationResult>> {
    let result = fifo_service(&state)
        .get_fifo_cost_for_remision_material(remision_material_id)
        .await?;
    Ok(Json(result))
}

/// Value the open layers of a plant's material
pub async fn get_inventory_valuation(
    State(state): State<AppState>,
    Path((plant_id, material_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<InventoryValuation>> {
    let valuation = fifo_service(&state)
        .calculate_inventory_valuation(material_id, plant_id)
        .await?;
    Ok(Json(valuation))
}

/// Allocate every material row of a remision
pub async fn auto_allocate_remision(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(remision_id): Path<Uuid>,
) -> AppResult<Json<AutoAllocateResult>> {
    let result = fifo_service(&state)
        .auto_allocate_remision(remision_id, current_user.0)
        .await?;
    Ok(Json(result))
}

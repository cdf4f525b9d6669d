//! HTTP handlers for the inventory health monitor

use axum::{extract::State, Json};
use shared::{HealthMetric, MaterialUpdateFrequency, TableMaintenance};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::InventoryMonitoringService;
use crate::AppState;

fn monitoring_service(state: &AppState) -> InventoryMonitoringService {
    InventoryMonitoringService::new(state.store.clone(), state.config.monitoring.clone())
}

pub async fn get_system_health(State(state): State<AppState>) -> Json<Vec<HealthMetric>> {
    Json(monitoring_service(&state).system_health().await)
}

pub async fn get_update_frequency(
    State(state): State<AppState>,
) -> Json<Vec<MaterialUpdateFrequency>> {
    Json(monitoring_service(&state).material_update_frequency().await)
}

pub async fn get_maintenance_check(State(state): State<AppState>) -> Json<Vec<TableMaintenance>> {
    Json(monitoring_service(&state).maintenance_check().await)
}

/// Reclaim dead rows in the ledger tables
pub async fn compact_storage(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<TableMaintenance>>> {
    let tables = monitoring_service(&state).compact_storage().await?;
    Ok(Json(tables))
}

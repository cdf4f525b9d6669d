//! HTTP handlers for bulk import reconciliation

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use shared::{BatchInventoryResult, NewRemision};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::{BatchInventoryService, InventoryLedgerService};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BatchModeResponse {
    pub triggers_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProcessBulkImportInput {
    pub remision_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BulkImportInput {
    pub remisiones: Vec<NewRemision>,
}

#[derive(Debug, Serialize)]
pub struct BulkImportResponse {
    pub remisiones_received: usize,
    pub result: BatchInventoryResult,
}

fn batch_service(state: &AppState) -> BatchInventoryService {
    BatchInventoryService::new(state.store.clone(), state.config.fifo.clone())
}

/// Enter batch mode before inserting remisiones in bulk
pub async fn disable_triggers(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<BatchModeResponse>> {
    batch_service(&state).disable_triggers().await?;
    Ok(Json(BatchModeResponse {
        triggers_enabled: false,
    }))
}

/// Leave batch mode without reconciling
pub async fn enable_triggers(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<BatchModeResponse>> {
    batch_service(&state).enable_triggers().await?;
    Ok(Json(BatchModeResponse {
        triggers_enabled: true,
    }))
}

/// Leave batch mode and reconcile the imported remisiones
pub async fn process_bulk_import(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ProcessBulkImportInput>,
) -> Json<BatchInventoryResult> {
    let result = batch_service(&state)
        .process_bulk_import(&input.remision_ids, current_user.0)
        .await;
    Json(result)
}

/// Insert remisiones and reconcile them in one request
pub async fn bulk_import_remisiones(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<BulkImportInput>,
) -> AppResult<Json<BulkImportResponse>> {
    let ledger = InventoryLedgerService::new(state.store.clone(), state.config.fifo.clone());
    let remisiones_received = input.remisiones.len();
    let performed_by = current_user.0;

    let result = batch_service(&state)
        .run_bulk_import(performed_by, move || async move {
            let mut ids = Vec::with_capacity(input.remisiones.len());
            for remision in input.remisiones {
                let recorded = ledger.record_remision(remision, performed_by).await?;
                ids.push(recorded.remision.id);
            }
            Ok::<_, AppError>(ids)
        })
        .await?;

    Ok(Json(BulkImportResponse {
        remisiones_received,
        result,
    }))
}

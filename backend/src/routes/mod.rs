//! Route definitions for the material ledger API

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/catalog", catalog_routes())
        .nest("/fifo", fifo_routes())
        .nest("/inventory", inventory_routes())
        .nest("/batch", batch_routes())
        .nest("/monitoring", monitoring_routes())
}

/// Plant and material registration
fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/plants", post(handlers::register_plant))
        .route("/materials", post(handlers::register_material))
}

/// FIFO allocation engine
fn fifo_routes() -> Router<AppState> {
    Router::new()
        .route("/allocate", post(handlers::allocate_fifo))
        .route(
            "/remision-materials/:remision_material_id/cost",
            get(handlers::get_remision_material_cost),
        )
        .route(
            "/valuation/:plant_id/:material_id",
            get(handlers::get_inventory_valuation),
        )
        .route(
            "/remisiones/:remision_id/allocate",
            post(handlers::auto_allocate_remision),
        )
}

/// Ledger writes, balances and the daily log
fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/entries", post(handlers::record_material_entry))
        .route("/adjustments", post(handlers::record_material_adjustment))
        .route("/remisiones", post(handlers::record_remision))
        .route("/prices", post(handlers::record_material_price))
        .route("/:plant_id", get(handlers::get_current_inventory))
        .route("/:plant_id/entries", get(handlers::list_material_entries))
        .route("/:plant_id/adjustments", get(handlers::list_material_adjustments))
        .route(
            "/:plant_id/materials/:material_id/thresholds",
            put(handlers::set_stock_thresholds),
        )
        .route(
            "/:plant_id/materials/:material_id/recompute",
            post(handlers::recompute_inventory),
        )
        .route("/:plant_id/daily-log/:date", get(handlers::get_daily_log))
        .route(
            "/:plant_id/daily-log/:date/rebuild",
            post(handlers::rebuild_daily_log),
        )
        .route(
            "/:plant_id/daily-log/:date/close",
            post(handlers::close_daily_log),
        )
}

/// Bulk import reconciliation
fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/triggers/disable", post(handlers::disable_triggers))
        .route("/triggers/enable", post(handlers::enable_triggers))
        .route("/process", post(handlers::process_bulk_import))
        .route("/import", post(handlers::bulk_import_remisiones))
}

/// Health monitor
fn monitoring_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::get_system_health))
        .route("/frequency", get(handlers::get_update_frequency))
        .route("/maintenance", get(handlers::get_maintenance_check))
        .route("/maintenance/vacuum", post(handlers::compact_storage))
}

//! Inventory health monitor tests
//!
//! Tests for the monitoring views including:
//! - Health metric statuses
//! - Update frequency windows
//! - Dead-row maintenance report and compaction
//! - Empty views when the store is unreachable

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::faulty::FaultyStore;
use common::{date, dec, Fixture};
use material_ledger_backend::config::Config;
use material_ledger_backend::services::InventoryMonitoringService;
use material_ledger_backend::AppError;
use rust_decimal::Decimal;
use shared::{HealthMetric, HealthStatus};

fn metric<'a>(metrics: &'a [HealthMetric], name: &str) -> &'a HealthMetric {
    metrics
        .iter()
        .find(|m| m.metric_name == name)
        .unwrap_or_else(|| panic!("missing metric {name}"))
}

// ============================================================================
// Health Metrics
// ============================================================================

#[tokio::test]
async fn test_empty_ledger_health() {
    let fx = Fixture::new().await;
    let metrics = fx.monitoring().system_health().await;

    assert_eq!(metrics.len(), 8);

    let tracked = metric(&metrics, "tracked_materials");
    assert_eq!(tracked.status, HealthStatus::Info);
    assert_eq!(tracked.metric_value, Decimal::ZERO);

    assert_eq!(metric(&metrics, "low_stock_materials").status, HealthStatus::Ok);
    assert_eq!(metric(&metrics, "negative_stock_materials").status, HealthStatus::Ok);
    assert_eq!(metric(&metrics, "inventory_drift").status, HealthStatus::Ok);
    assert_eq!(
        metric(&metrics, "unallocated_remision_materials").status,
        HealthStatus::Ok
    );
    assert_eq!(metric(&metrics, "ledger_updates_24h").status, HealthStatus::Low);
    assert_eq!(metric(&metrics, "max_dead_row_ratio_pct").status, HealthStatus::Ok);
    assert_eq!(metric(&metrics, "triggers_enabled").status, HealthStatus::Ok);
}

#[tokio::test]
async fn test_low_stock_is_warning() {
    let fx = Fixture::new().await;
    fx.receive("100", "1.00", date(2024, 1, 1)).await;
    fx.ledger()
        .set_stock_thresholds(fx.plant.id, fx.material.id, dec("500"), None)
        .await
        .unwrap();

    let metrics = fx.monitoring().system_health().await;

    let low = metric(&metrics, "low_stock_materials");
    assert_eq!(low.status, HealthStatus::Warning);
    assert_eq!(low.metric_value, Decimal::ONE);
    assert_eq!(metric(&metrics, "tracked_materials").metric_value, Decimal::ONE);
    assert_eq!(metric(&metrics, "ledger_updates_24h").status, HealthStatus::Ok);
    assert_eq!(metric(&metrics, "inventory_drift").metric_value, Decimal::ZERO);
}

#[tokio::test]
async fn test_unallocated_rows_are_caution() {
    let fx = Fixture::new().await;
    fx.remision(
        "R-0001",
        date(2024, 1, 2),
        &[(fx.material.id, "100"), (fx.material.id, "0")],
    )
    .await;

    let metrics = fx.monitoring().system_health().await;

    let unallocated = metric(&metrics, "unallocated_remision_materials");
    assert_eq!(unallocated.status, HealthStatus::Caution);
    // Zero-quantity rows never need a cost
    assert_eq!(unallocated.metric_value, Decimal::ONE);
}

#[tokio::test]
async fn test_disabled_triggers_are_warning() {
    let fx = Fixture::new().await;
    fx.batch().disable_triggers().await.unwrap();

    let metrics = fx.monitoring().system_health().await;
    let triggers = metric(&metrics, "triggers_enabled");
    assert_eq!(triggers.status, HealthStatus::Warning);
    assert_eq!(triggers.metric_value, Decimal::ZERO);

    fx.batch().enable_triggers().await.unwrap();
    let metrics = fx.monitoring().system_health().await;
    assert_eq!(metric(&metrics, "triggers_enabled").status, HealthStatus::Ok);
}

#[tokio::test]
async fn test_runaway_updates_are_high() {
    let mut config = Config::default();
    config.monitoring.runaway_update_threshold = 3;
    let fx = Fixture::with_config(config).await;
    fx.receive("100", "1.00", date(2024, 1, 1)).await;
    fx.receive("100", "1.00", date(2024, 1, 2)).await;

    let metrics = fx.monitoring().system_health().await;
    let updates = metric(&metrics, "ledger_updates_24h");
    assert_eq!(updates.status, HealthStatus::High);
    assert!(updates.message.contains("runaway"));
}

#[tokio::test]
async fn test_old_activity_leaves_the_24h_window() {
    let fx = Fixture::new().await;
    fx.receive("100", "1.00", date(2024, 1, 1)).await;

    let later = Utc::now() + Duration::days(2);
    let metrics = fx.monitoring().system_health_at(later).await;
    assert_eq!(metric(&metrics, "ledger_updates_24h").status, HealthStatus::Low);
}

// ============================================================================
// Update Frequency
// ============================================================================

#[tokio::test]
async fn test_update_frequency_busiest_first() {
    let fx = Fixture::new().await;
    let sand = fx.add_material("ARENA").await;
    fx.receive("100", "1.00", date(2024, 1, 1)).await;
    fx.receive("100", "1.00", date(2024, 1, 2)).await;
    fx.receive_material(sand.id, "100", Some("0.30"), date(2024, 1, 1))
        .await;

    let monitoring = fx.monitoring();
    let rows = monitoring.material_update_frequency().await;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].material_id, fx.material.id);
    assert!(rows[0].updates_last_24h > rows[1].updates_last_24h);
    assert!(rows[0].last_update_at.is_some());

    let later = monitoring
        .material_update_frequency_at(Utc::now() + Duration::days(2))
        .await;
    assert_eq!(later.len(), 2);
    assert!(later.iter().all(|r| r.updates_last_24h == 0));
    assert_eq!(later[0].updates_last_7d, rows[0].updates_last_7d);

    let gone = monitoring
        .material_update_frequency_at(Utc::now() + Duration::days(8))
        .await;
    assert!(gone.is_empty());
}

// ============================================================================
// Maintenance
// ============================================================================

#[tokio::test]
async fn test_dead_rows_flag_tables_until_compacted() {
    let fx = Fixture::new().await;
    fx.receive("100", "1.00", date(2024, 1, 1)).await;
    fx.receive("100", "1.00", date(2024, 1, 2)).await;

    let monitoring = fx.monitoring();
    let report = monitoring.maintenance_check().await;
    let inventory = report
        .iter()
        .find(|t| t.table_name == "material_inventory")
        .unwrap();
    assert_eq!(inventory.live_rows, 1);
    assert!(inventory.dead_rows >= 1);
    assert!(inventory.needs_vacuum);

    let metrics = monitoring.system_health().await;
    assert_eq!(
        metric(&metrics, "max_dead_row_ratio_pct").status,
        HealthStatus::Caution
    );

    let compacted = monitoring.compact_storage().await.unwrap();
    assert!(compacted.iter().all(|t| t.dead_rows == 0 && !t.needs_vacuum));
    let entries = compacted
        .iter()
        .find(|t| t.table_name == "material_entries")
        .unwrap();
    assert_eq!(entries.live_rows, 2);
}

#[tokio::test]
async fn test_unreachable_store_yields_empty_views() {
    let monitoring = InventoryMonitoringService::new(
        Arc::new(FaultyStore::unreachable()),
        Config::default().monitoring,
    );

    assert!(monitoring.system_health().await.is_empty());
    assert!(monitoring.material_update_frequency().await.is_empty());
    assert!(monitoring.maintenance_check().await.is_empty());

    // Compaction is a command, so its failure is reported
    let err = monitoring.compact_storage().await.unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));
}

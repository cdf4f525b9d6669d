//! Batch reconciliation tests
//!
//! Tests for bulk remision imports including:
//! - Bulk import matches per-row allocation
//! - Batch mode gating and trigger state handling
//! - Before/after snapshots of each touched position
//! - Delivery order regardless of insertion order
//! - Partial passes and one recompute per position

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::faulty::FaultyStore;
use common::{date, dec, Fixture};
use material_ledger_backend::config::Config;
use material_ledger_backend::AppError;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{LedgerEventKind, NewRemision, NewRemisionMaterial, Remision};
use uuid::Uuid;

/// Lots shared by the equivalence fixtures: three cement and three sand lots
async fn stocked_fixture() -> (Fixture, Uuid) {
    let fx = Fixture::new().await;
    let sand = fx.add_material("ARENA").await;
    fx.receive("1000", "1.00", date(2024, 2, 1)).await;
    fx.receive("1000", "1.10", date(2024, 2, 2)).await;
    fx.receive("1000", "1.25", date(2024, 2, 3)).await;
    for (day, price) in [(1, "0.30"), (2, "0.32"), (3, "0.35")] {
        fx.receive_material(sand.id, "3000", Some(price), date(2024, 2, day))
            .await;
    }
    (fx, sand.id)
}

/// Fifty deliveries spread over two weeks
fn delivery_plan(fx: &Fixture, sand_id: Uuid) -> Vec<NewRemision> {
    (0..50u32)
        .map(|i| NewRemision {
            id: None,
            remision_number: format!("R-{:04}", i),
            plant_id: fx.plant.id,
            fecha: date(2024, 2, 5 + i / 5),
            materials: vec![
                NewRemisionMaterial {
                    id: None,
                    material_id: fx.material.id,
                    cantidad_real: Decimal::from(20 + (i % 7) * 5),
                },
                NewRemisionMaterial {
                    id: None,
                    material_id: sand_id,
                    cantidad_real: Decimal::from(100 + (i % 3) * 50),
                },
            ],
        })
        .collect()
}

/// FIFO cost of every row, keyed by (remision number, line)
async fn costs_by_number(fx: &Fixture, ids: &[Uuid]) -> HashMap<(String, i32), Option<Decimal>> {
    let mut costs = HashMap::new();
    for id in ids {
        let remision: Remision = fx.store.get_remision(*id).await.unwrap().unwrap();
        for row in &remision.materials {
            costs.insert(
                (remision.remision_number.clone(), row.line_number),
                row.total_cost_fifo,
            );
        }
    }
    costs
}

// ============================================================================
// Unit Tests
// ============================================================================

#[tokio::test]
async fn test_bulk_import_matches_sequential_allocation() {
    // Sequential: every remision allocated as it is recorded
    let (sequential, seq_sand) = stocked_fixture().await;
    let mut seq_ids = Vec::new();
    for remision in delivery_plan(&sequential, seq_sand) {
        let recorded = sequential
            .ledger()
            .record_remision(remision, sequential.user)
            .await
            .unwrap();
        assert!(recorded.allocation.unwrap().success);
        seq_ids.push(recorded.remision.id);
    }

    // Bulk: inserted newest first in batch mode, reconciled in one pass
    let (bulk, bulk_sand) = stocked_fixture().await;
    let batch = bulk.batch();
    batch.disable_triggers().await.unwrap();
    let mut bulk_ids = Vec::new();
    for remision in delivery_plan(&bulk, bulk_sand).into_iter().rev() {
        let recorded = bulk
            .ledger()
            .record_remision(remision, bulk.user)
            .await
            .unwrap();
        assert!(recorded.allocation.is_none());
        bulk_ids.push(recorded.remision.id);
    }
    let result = batch.process_bulk_import(&bulk_ids, bulk.user).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.materials_updated, 2);
    assert!(bulk.store.triggers_enabled().await.unwrap());

    assert_eq!(
        bulk.current_stock(bulk.material.id).await,
        sequential.current_stock(sequential.material.id).await
    );
    assert_eq!(
        bulk.current_stock(bulk_sand).await,
        sequential.current_stock(seq_sand).await
    );

    let expected = costs_by_number(&sequential, &seq_ids).await;
    let actual = costs_by_number(&bulk, &bulk_ids).await;
    assert_eq!(actual.len(), 100);
    assert_eq!(actual, expected);
    assert!(actual.values().all(Option::is_some));
}

#[tokio::test]
async fn test_batch_mode_defers_allocation() {
    let fx = Fixture::new().await;
    fx.receive("1000", "1.00", date(2024, 1, 1)).await;
    fx.batch().disable_triggers().await.unwrap();

    let recorded = fx
        .ledger()
        .record_remision(
            NewRemision {
                id: None,
                remision_number: "R-0001".to_string(),
                plant_id: fx.plant.id,
                fecha: date(2024, 1, 2),
                materials: vec![NewRemisionMaterial {
                    id: None,
                    material_id: fx.material.id,
                    cantidad_real: dec("250"),
                }],
            },
            fx.user,
        )
        .await
        .unwrap();

    assert!(recorded.allocation.is_none());
    assert!(!recorded.remision.materials[0].is_allocated());
    assert_eq!(fx.current_stock(fx.material.id).await, dec("1000"));

    let err = fx
        .fifo()
        .allocate_fifo_consumption(fx.request_for(&recorded.remision, 0), fx.user)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TriggersDisabled));
}

#[tokio::test]
async fn test_double_disable_is_conflict() {
    let fx = Fixture::new().await;
    let batch = fx.batch();

    batch.disable_triggers().await.unwrap();
    let err = batch.disable_triggers().await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    batch.enable_triggers().await.unwrap();
    // Re-enabling twice is harmless
    batch.enable_triggers().await.unwrap();
    assert!(fx.store.triggers_enabled().await.unwrap());
}

#[tokio::test]
async fn test_failed_pass_reports_error_and_reenables() {
    let fx = Fixture::new().await;
    fx.receive("1000", "1.00", date(2024, 1, 1)).await;
    let known = fx
        .remision("R-0001", date(2024, 1, 2), &[(fx.material.id, "100")])
        .await;
    let batch = fx.batch();
    batch.disable_triggers().await.unwrap();

    let result = batch
        .process_bulk_import(&[known.id, Uuid::new_v4()], fx.user)
        .await;

    assert!(!result.success);
    assert_eq!(result.materials_updated, 0);
    assert!(result.inventory_changes.is_empty());
    assert!(result.error.is_some());
    assert!(fx.store.triggers_enabled().await.unwrap());
    // The unknown id aborts before anything is allocated
    assert_eq!(fx.current_stock(fx.material.id).await, dec("1000"));
}

#[tokio::test]
async fn test_aborted_pass_reports_committed_rows() {
    let store = Arc::new(FaultyStore::disabling_triggers_before_commit(2));
    let fx = Fixture::over(store.clone(), Config::default()).await;
    fx.receive("1000", "1.00", date(2024, 1, 1)).await;
    let mut ids = Vec::new();
    for number in ["R-0001", "R-0002", "R-0003"] {
        let remision = fx
            .remision(number, date(2024, 1, 2), &[(fx.material.id, "100")])
            .await;
        ids.push(remision.id);
    }
    let batch = fx.batch();
    batch.disable_triggers().await.unwrap();

    let result = batch.process_bulk_import(&ids, fx.user).await;

    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(store.commits(), 2);
    // The first row stayed committed and its position was recomputed
    assert_eq!(result.materials_updated, 1);
    let change = &result.inventory_changes[0];
    assert_eq!(change.inventory_before, dec("1000"));
    assert_eq!(change.total_consumption, dec("100"));
    assert_eq!(change.inventory_after, dec("900"));
    assert_eq!(fx.current_stock(fx.material.id).await, dec("900"));
    assert_eq!(
        fx.store.count_unallocated_remision_materials().await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_pass_recomputes_each_position_once() {
    let fx = Fixture::new().await;
    let sand = fx.add_material("ARENA").await;
    fx.receive("1000", "1.00", date(2024, 1, 1)).await;
    fx.receive_material(sand.id, "5000", Some("0.30"), date(2024, 1, 1))
        .await;
    let mut ids = Vec::new();
    for number in ["R-0001", "R-0002", "R-0003"] {
        let remision = fx
            .remision(
                number,
                date(2024, 1, 2),
                &[(fx.material.id, "100"), (sand.id, "400")],
            )
            .await;
        ids.push(remision.id);
    }
    let batch = fx.batch();
    batch.disable_triggers().await.unwrap();

    let result = batch.process_bulk_import(&ids, fx.user).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.materials_updated, 2);

    let events = fx
        .store
        .ledger_events_since(DateTime::<Utc>::MIN_UTC)
        .await
        .unwrap();
    let count = |kind: LedgerEventKind| events.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(LedgerEventKind::AllocationRecorded), 6);
    // One per entry plus one per position in the pass
    assert_eq!(count(LedgerEventKind::InventoryRecomputed), 2 + 2);
    assert_eq!(fx.current_stock(fx.material.id).await, dec("700"));
    assert_eq!(fx.current_stock(sand.id).await, dec("3800"));
}

#[tokio::test]
async fn test_snapshot_before_and_after() {
    let fx = Fixture::new().await;
    fx.receive("1000", "1.00", date(2024, 1, 1)).await;
    fx.receive("500", "1.20", date(2024, 1, 5)).await;
    let remision = fx
        .remision("R-0001", date(2024, 1, 10), &[(fx.material.id, "1200")])
        .await;
    let batch = fx.batch();
    batch.disable_triggers().await.unwrap();

    let result = batch.process_bulk_import(&[remision.id], fx.user).await;

    assert!(result.success);
    assert_eq!(result.materials_updated, 1);
    let change = &result.inventory_changes[0];
    assert_eq!(change.material_id, fx.material.id);
    assert_eq!(change.inventory_before, dec("1500"));
    assert_eq!(change.total_consumption, dec("1200"));
    assert_eq!(change.inventory_after, dec("300"));

    let cost = fx
        .fifo()
        .get_fifo_cost_for_remision_material(remision.materials[0].id)
        .await
        .unwrap();
    assert_eq!(cost.total_cost, dec("1240.00"));
}

#[tokio::test]
async fn test_short_rows_stay_pending() {
    let fx = Fixture::new().await;
    fx.receive("100", "1.00", date(2024, 1, 1)).await;
    let covered = fx
        .remision("R-0001", date(2024, 1, 2), &[(fx.material.id, "80")])
        .await;
    let short = fx
        .remision("R-0002", date(2024, 1, 2), &[(fx.material.id, "50")])
        .await;
    let batch = fx.batch();
    batch.disable_triggers().await.unwrap();

    let result = batch
        .process_bulk_import(&[short.id, covered.id], fx.user)
        .await;

    assert!(result.success);
    assert_eq!(result.inventory_changes[0].total_consumption, dec("80"));
    assert_eq!(result.inventory_changes[0].inventory_after, dec("20"));
    assert_eq!(
        fx.store.count_unallocated_remision_materials().await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_run_bulk_import_reenables_on_insert_failure() {
    let fx = Fixture::new().await;
    let batch = fx.batch();

    let result = batch
        .run_bulk_import(fx.user, || async {
            Err::<Vec<Uuid>, _>(AppError::Persistence("connection reset".to_string()))
        })
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.materials_updated, 0);
    assert!(result.error.unwrap().contains("connection reset"));
    assert!(fx.store.triggers_enabled().await.unwrap());
}

#[tokio::test]
async fn test_run_bulk_import_rejected_while_active() {
    let fx = Fixture::new().await;
    let batch = fx.batch();
    batch.disable_triggers().await.unwrap();

    let err = batch
        .run_bulk_import(fx.user, || async { Ok(Vec::new()) })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict { .. }));
    // The running import still owns batch mode
    assert!(!fx.store.triggers_enabled().await.unwrap());
}

#[tokio::test]
async fn test_run_bulk_import_success() {
    let fx = Fixture::new().await;
    fx.receive("1000", "1.00", date(2024, 1, 1)).await;
    let ledger = fx.ledger();

    let result = fx
        .batch()
        .run_bulk_import(fx.user, || async {
            let mut ids = Vec::new();
            for (number, kg) in [("R-0002", "300"), ("R-0001", "200")] {
                let recorded = ledger
                    .record_remision(
                        NewRemision {
                            id: None,
                            remision_number: number.to_string(),
                            plant_id: fx.plant.id,
                            fecha: date(2024, 1, 3),
                            materials: vec![NewRemisionMaterial {
                                id: None,
                                material_id: fx.material.id,
                                cantidad_real: dec(kg),
                            }],
                        },
                        fx.user,
                    )
                    .await?;
                ids.push(recorded.remision.id);
            }
            Ok::<_, AppError>(ids)
        })
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.inventory_changes[0].inventory_before, dec("1000"));
    assert_eq!(result.inventory_changes[0].inventory_after, dec("500"));
    assert!(fx.store.triggers_enabled().await.unwrap());
    assert_eq!(
        fx.store.count_unallocated_remision_materials().await.unwrap(),
        0
    );
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Lots are priced higher with each day, so delivery order shows up as
    /// non-decreasing unit costs along the remision numbers
    #[test]
    fn prop_bulk_pass_follows_delivery_order(
        (quantities, insert_order) in prop::collection::vec(10u32..300, 1..7)
            .prop_flat_map(|q| {
                let n = q.len();
                (Just(q), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
            })
    ) {
        tokio_test::block_on(async {
            let fx = Fixture::new().await;
            fx.receive("500", "1.00", date(2024, 1, 1)).await;
            fx.receive("500", "2.00", date(2024, 1, 2)).await;
            fx.receive("500", "3.00", date(2024, 1, 3)).await;

            let batch = fx.batch();
            batch.disable_triggers().await.unwrap();

            let mut by_number = Vec::with_capacity(quantities.len());
            let mut ids = Vec::with_capacity(quantities.len());
            for &i in &insert_order {
                let kg = quantities[i].to_string();
                let remision = fx
                    .remision(
                        &format!("R-{:04}", i),
                        date(2024, 1, 10),
                        &[(fx.material.id, kg.as_str())],
                    )
                    .await;
                ids.push(remision.id);
                by_number.push((i, remision.materials[0].id));
            }
            by_number.sort();

            let result = batch.process_bulk_import(&ids, fx.user).await;
            assert!(result.success);

            let mut last_unit_cost = Decimal::ZERO;
            let mut allocated = Decimal::ZERO;
            for (_, row_id) in by_number {
                let row = fx.store.get_remision_material(row_id).await.unwrap().unwrap();
                if let Some(unit_cost) = row.unit_cost_weighted {
                    assert!(unit_cost >= last_unit_cost);
                    last_unit_cost = unit_cost;
                    allocated += row.cantidad_real;
                }
            }
            assert_eq!(fx.current_stock(fx.material.id).await, dec("1500") - allocated);
        });
    }
}

//! FIFO planner properties
//!
//! - Allocations are drawn oldest layer first
//! - The allocated quantity equals the requested quantity exactly
//! - No layer is drawn beyond its remaining quantity
//! - A request larger than the open stock is rejected whole

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::fifo::{plan_fifo_allocation, round_cost, OpenLayer, PlanError};
use uuid::Uuid;

/// (day of month, remaining in grams, price in cents)
fn layers_strategy() -> impl Strategy<Value = Vec<(u32, i64, i64)>> {
    prop::collection::vec((1u32..=28, 1i64..5_000_000, 0i64..10_000), 1..25)
}

fn build_layers(raw: &[(u32, i64, i64)]) -> Vec<OpenLayer> {
    raw.iter()
        .enumerate()
        .map(|(i, (day, grams, cents))| OpenLayer {
            entry_id: Uuid::new_v4(),
            entry_number: format!("ENT-{:03}", i + 1),
            entry_date: NaiveDate::from_ymd_opt(2024, 1, *day).unwrap(),
            sequence: i as i64 + 1,
            version: 0,
            remaining_kg: Decimal::new(*grams, 3),
            unit_price: Decimal::new(*cents, 2),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Draws follow (entry_date, sequence) order and sum to the request
    #[test]
    fn property_fifo_order_and_conservation(
        raw in layers_strategy(),
        fraction in 1u32..=1000,
    ) {
        let layers = build_layers(&raw);
        let available: Decimal = layers.iter().map(|l| l.remaining_kg).sum();
        let quantity = (available * Decimal::from(fraction) / Decimal::from(1000)).round_dp(3);
        prop_assume!(quantity > Decimal::ZERO);

        let plan = plan_fifo_allocation(&layers, quantity, usize::MAX).unwrap();

        let drawn: Decimal = plan.draws.iter().map(|d| d.quantity_kg).sum();
        prop_assert_eq!(drawn, quantity);

        let position = |id: Uuid| layers.iter().position(|l| l.entry_id == id).unwrap();
        let keys: Vec<(NaiveDate, i64)> = plan
            .draws
            .iter()
            .map(|d| {
                let layer = &layers[position(d.entry_id)];
                (layer.entry_date, layer.sequence)
            })
            .collect();
        prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));

        // Every layer older than the last one drawn is exhausted
        for draw in &plan.draws[..plan.draws.len() - 1] {
            prop_assert_eq!(draw.remaining_after, Decimal::ZERO);
        }
        let last = plan.draws.last().unwrap();
        let last_key = (layers[position(last.entry_id)].entry_date, layers[position(last.entry_id)].sequence);
        for layer in &layers {
            if (layer.entry_date, layer.sequence) < last_key {
                prop_assert!(plan.draws.iter().any(|d| d.entry_id == layer.entry_id));
            }
        }

        for draw in &plan.draws {
            let layer = &layers[position(draw.entry_id)];
            prop_assert!(draw.quantity_kg <= layer.remaining_kg);
            prop_assert_eq!(draw.remaining_after, layer.remaining_kg - draw.quantity_kg);
            prop_assert_eq!(draw.unit_price, layer.unit_price);
        }

        let expected_cost = round_cost(plan.draws.iter().map(|d| d.quantity_kg * d.unit_price).sum());
        prop_assert_eq!(plan.total_cost, expected_cost);
    }

    /// More than the open stock is rejected with the exact availability
    #[test]
    fn property_shortfall_rejected(
        raw in layers_strategy(),
        extra_grams in 1i64..1_000_000,
    ) {
        let layers = build_layers(&raw);
        let available: Decimal = layers.iter().map(|l| l.remaining_kg).sum();
        let quantity = available + Decimal::new(extra_grams, 3);

        let err = plan_fifo_allocation(&layers, quantity, usize::MAX).unwrap_err();
        prop_assert_eq!(err, PlanError::InsufficientStock { requested: quantity, available });
    }
}

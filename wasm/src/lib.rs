//! WebAssembly module for the Material Ledger
//!
//! Provides client-side computation for:
//! - FIFO cost previews before a remision is submitted
//! - Stock status classification
//! - Offline input validation

use std::str::FromStr;

use rust_decimal::Decimal;
use shared::fifo::{plan_fifo_allocation, OpenLayer, DEFAULT_MAX_LOTS_PER_RUN};
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn parse_decimal(value: &str, what: &str) -> Result<Decimal, JsValue> {
    Decimal::from_str(value.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

/// Preview the FIFO draw for `quantity` kg over the given open layers.
///
/// `layers_json` is an array of open layers; the returned JSON is the plan
/// with per-lot draws and the total cost. Nothing is reserved: the server
/// plans again against live stock when the remision is recorded.
#[wasm_bindgen]
pub fn preview_fifo_cost(layers_json: &str, quantity: &str) -> Result<String, JsValue> {
    let layers: Vec<OpenLayer> = serde_json::from_str(layers_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid layers JSON: {}", e)))?;
    let quantity = parse_decimal(quantity, "quantity")?;

    let plan = plan_fifo_allocation(&layers, quantity, DEFAULT_MAX_LOTS_PER_RUN)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    serde_json::to_string(&plan).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Weighted cost per kg of a preview, four decimals
#[wasm_bindgen]
pub fn preview_unit_cost(layers_json: &str, quantity: &str) -> Result<String, JsValue> {
    let plan: shared::fifo::FifoPlan = serde_json::from_str(&preview_fifo_cost(layers_json, quantity)?)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(plan.weighted_unit_cost().to_string())
}

/// Classify a balance against its thresholds: LOW, OK or EXCESS
#[wasm_bindgen]
pub fn classify_stock_status(current: &str, minimum: &str, maximum: Option<String>) -> Result<String, JsValue> {
    let current = parse_decimal(current, "current stock")?;
    let minimum = parse_decimal(minimum, "minimum stock")?;
    let maximum = maximum
        .as_deref()
        .map(|m| parse_decimal(m, "maximum stock"))
        .transpose()?;
    Ok(StockStatus::classify(current, minimum, maximum).as_str().to_string())
}

/// Check a plant or material code before submitting it
#[wasm_bindgen]
pub fn is_valid_code(code: &str) -> bool {
    validate_code(code).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layers() -> String {
        json!([
            {
                "entry_id": "00000000-0000-0000-0000-000000000002",
                "entry_number": "ENT-20240105-001",
                "entry_date": "2024-01-05",
                "sequence": 2,
                "version": 0,
                "remaining_kg": "500",
                "unit_price": "1.20"
            },
            {
                "entry_id": "00000000-0000-0000-0000-000000000001",
                "entry_number": "ENT-20240101-001",
                "entry_date": "2024-01-01",
                "sequence": 1,
                "version": 0,
                "remaining_kg": "1000",
                "unit_price": "1.00"
            }
        ])
        .to_string()
    }

    #[test]
    fn test_preview_draws_oldest_first() {
        let plan: shared::fifo::FifoPlan =
            serde_json::from_str(&preview_fifo_cost(&layers(), "1200").unwrap()).unwrap();

        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].entry_number, "ENT-20240101-001");
        assert_eq!(plan.total_cost, Decimal::from(1240));
    }

    #[test]
    fn test_preview_unit_cost() {
        assert_eq!(preview_unit_cost(&layers(), "1200").unwrap(), "1.0333");
    }

    #[test]
    fn test_classify_stock_status() {
        assert_eq!(classify_stock_status("100", "500", None).unwrap(), "LOW");
        assert_eq!(classify_stock_status("600", "500", Some("1000".into())).unwrap(), "OK");
        assert_eq!(classify_stock_status("1500", "500", Some("1000".into())).unwrap(), "EXCESS");
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("CEM-CPC40"));
        assert!(!is_valid_code("bad code"));
    }
}

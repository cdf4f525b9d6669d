//! Inventory adjustments: stock written off outside remision consumption

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockKey;

/// Default page size for ledger listings
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page a ledger listing returns
pub const MAX_PAGE_SIZE: i64 = 200;

/// Why stock left the yard without a remision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Consumption,
    Waste,
    Correction,
    Transfer,
    Loss,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Consumption => "consumption",
            AdjustmentType::Waste => "waste",
            AdjustmentType::Correction => "correction",
            AdjustmentType::Transfer => "transfer",
            AdjustmentType::Loss => "loss",
        }
    }
}

impl FromStr for AdjustmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumption" => Ok(AdjustmentType::Consumption),
            "waste" => Ok(AdjustmentType::Waste),
            "correction" => Ok(AdjustmentType::Correction),
            "transfer" => Ok(AdjustmentType::Transfer),
            "loss" => Ok(AdjustmentType::Loss),
            other => Err(format!("unknown adjustment type: {}", other)),
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded write-off.
///
/// The quantity is drawn from the open lots oldest first, exactly like a
/// remision allocation, so lots keep summing to the balance. Adjustments
/// only ever reduce stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialAdjustment {
    pub id: Uuid,
    /// Per plant per day, e.g. "ADJ-20240105-001"
    pub adjustment_number: String,
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub adjustment_date: NaiveDate,
    pub adjustment_type: AdjustmentType,
    pub quantity_adjusted_kg: Decimal,
    pub inventory_before: Decimal,
    pub inventory_after: Decimal,
    /// FIFO value of the stock written off, rounded to cents
    pub total_cost: Decimal,
    pub reference_type: Option<String>,
    pub reference_notes: String,
    pub adjusted_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl MaterialAdjustment {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.plant_id, self.material_id)
    }
}

/// Input for recording an adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterialAdjustment {
    pub plant_id: Uuid,
    pub material_id: Uuid,
    /// Defaults to today
    pub adjustment_date: Option<NaiveDate>,
    pub adjustment_type: AdjustmentType,
    pub quantity_adjusted_kg: Decimal,
    pub reference_type: Option<String>,
    pub reference_notes: String,
}

/// Format an adjustment number from its date and daily sequence
pub fn format_adjustment_number(date: NaiveDate, sequence: u32) -> String {
    format!("ADJ-{}-{:03}", date.format("%Y%m%d"), sequence)
}

/// Page of a plant's ledger rows, optionally narrowed by date and material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerQuery {
    pub plant_id: Uuid,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub material_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl LedgerQuery {
    /// First page of everything recorded at a plant
    pub fn for_plant(plant_id: Uuid) -> Self {
        Self {
            plant_id,
            date_from: None,
            date_to: None,
            material_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    /// Whether a row dated `date` for `material_id` falls inside the filter
    pub fn matches(&self, plant_id: Uuid, material_id: Uuid, date: NaiveDate) -> bool {
        plant_id == self.plant_id
            && self.material_id.map_or(true, |id| id == material_id)
            && self.date_from.map_or(true, |from| date >= from)
            && self.date_to.map_or(true, |to| date <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_format_adjustment_number() {
        assert_eq!(format_adjustment_number(date(5), 1), "ADJ-20240105-001");
    }

    #[test]
    fn test_adjustment_type_round_trips_its_name() {
        let json = serde_json::to_string(&AdjustmentType::Waste).unwrap();
        assert_eq!(json, "\"waste\"");
        assert_eq!("loss".parse::<AdjustmentType>(), Ok(AdjustmentType::Loss));
        assert!("manual_in".parse::<AdjustmentType>().is_err());
    }

    #[test]
    fn test_ledger_query_matches() {
        let plant = Uuid::new_v4();
        let material = Uuid::new_v4();
        let mut query = LedgerQuery::for_plant(plant);
        query.date_from = Some(date(2));
        query.date_to = Some(date(4));

        assert!(query.matches(plant, material, date(2)));
        assert!(query.matches(plant, material, date(4)));
        assert!(!query.matches(plant, material, date(5)));
        assert!(!query.matches(Uuid::new_v4(), material, date(3)));

        query.material_id = Some(Uuid::new_v4());
        assert!(!query.matches(plant, material, date(3)));
    }
}

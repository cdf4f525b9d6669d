//! Material entries (inventory lots / FIFO cost layers) and price lists

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockKey;

/// A dated lot of physical material received at a plant.
///
/// Each entry is one FIFO cost layer. Only `remaining_quantity_kg` and
/// `version` ever change after creation, and the remaining quantity only
/// goes down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialEntry {
    pub id: Uuid,
    /// Per plant per day, e.g. "ENT-20240105-002"
    pub entry_number: String,
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub entry_date: NaiveDate,
    pub quantity_received_kg: Decimal,
    /// None when the lot was received before pricing review
    pub unit_price: Option<Decimal>,
    pub remaining_quantity_kg: Decimal,
    pub inventory_before: Decimal,
    pub inventory_after: Decimal,
    /// Insertion order; breaks ties between lots of the same date
    pub sequence: i64,
    pub version: i64,
    pub supplier_invoice: Option<String>,
    pub notes: Option<String>,
    pub entered_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl MaterialEntry {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.plant_id, self.material_id)
    }

    /// Quantity already drawn from this lot by allocations
    pub fn consumed_kg(&self) -> Decimal {
        self.quantity_received_kg - self.remaining_quantity_kg
    }

    pub fn is_open(&self) -> bool {
        self.remaining_quantity_kg > Decimal::ZERO
    }
}

/// Input for recording a material entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterialEntry {
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub supplier_id: Option<Uuid>,
    /// Defaults to today
    pub entry_date: Option<NaiveDate>,
    pub quantity_received_kg: Decimal,
    pub unit_price: Option<Decimal>,
    pub supplier_invoice: Option<String>,
    pub notes: Option<String>,
}

/// A plant price list row, used when a lot carries no unit price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialPrice {
    pub id: Uuid,
    pub material_id: Uuid,
    pub plant_id: Uuid,
    pub price_per_unit: Decimal,
    pub effective_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl MaterialPrice {
    /// Whether this price applies on `date`
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.effective_date <= date && self.end_date.map_or(true, |end| end >= date)
    }
}

/// Input for recording a price list row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterialPrice {
    pub material_id: Uuid,
    pub plant_id: Uuid,
    pub price_per_unit: Decimal,
    pub effective_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Pick the price in force on `date`: the latest effective date wins.
pub fn effective_price(prices: &[MaterialPrice], date: NaiveDate) -> Option<Decimal> {
    prices
        .iter()
        .filter(|p| p.applies_on(date))
        .max_by_key(|p| (p.effective_date, p.created_at))
        .map(|p| p.price_per_unit)
}

/// Format an entry number from its date and daily sequence
pub fn format_entry_number(date: NaiveDate, sequence: u32) -> String {
    format!("ENT-{}-{:03}", date.format("%Y%m%d"), sequence)
}

/// Next daily sequence given the numbers already issued for that plant and
/// day. Works for entry and adjustment numbers alike.
pub fn next_daily_sequence<'a, I>(existing: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|number| number.rsplit('-').next()?.parse::<u32>().ok())
        .max()
        .map_or(1, |last| last + 1)
}

//! FIFO cost-layer planner
//!
//! Pure allocation logic: given the open lots of one stock position and a
//! quantity to consume, decide how much to draw from each lot and at what
//! cost. Lots are drawn oldest first by `(entry_date, sequence)`. Storage,
//! locking and retries live in the backend; this module never mutates
//! anything it is handed.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::MaterialEntry;

/// Default cap on lots touched by one allocation run
pub const DEFAULT_MAX_LOTS_PER_RUN: usize = 500;

/// An open lot as seen by the planner, with its price already resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenLayer {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub sequence: i64,
    pub version: i64,
    pub remaining_kg: Decimal,
    pub unit_price: Decimal,
}

impl OpenLayer {
    /// Build a layer from a stored entry; `fallback_price` applies when the
    /// entry was recorded without a unit price.
    pub fn from_entry(entry: &MaterialEntry, fallback_price: Decimal) -> Self {
        Self {
            entry_id: entry.id,
            entry_number: entry.entry_number.clone(),
            entry_date: entry.entry_date,
            sequence: entry.sequence,
            version: entry.version,
            remaining_kg: entry.remaining_quantity_kg,
            unit_price: entry.unit_price.unwrap_or(fallback_price),
        }
    }
}

/// Quantity drawn from one lot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerDraw {
    pub entry_id: Uuid,
    pub entry_number: String,
    /// Lot version the plan was computed against
    pub expected_version: i64,
    pub quantity_kg: Decimal,
    pub unit_price: Decimal,
    pub cost: Decimal,
    pub remaining_after: Decimal,
}

/// A complete allocation plan for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FifoPlan {
    pub quantity_kg: Decimal,
    pub draws: Vec<LayerDraw>,
    /// Sum of draw costs, rounded to cents
    pub total_cost: Decimal,
}

impl FifoPlan {
    /// Cost per kg across all draws, four decimals
    pub fn weighted_unit_cost(&self) -> Decimal {
        weighted_unit_cost(self.total_cost, self.quantity_kg)
    }
}

/// Reasons a plan cannot be produced
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("quantity to consume must be positive")]
    NonPositiveQuantity,

    #[error("insufficient inventory: requested {requested}kg, available {available}kg")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    #[error("allocation would touch more than {max_lots} lots")]
    TooFragmented { max_lots: usize },

    #[error("cost of the allocation is too large to represent")]
    AmountOverflow,
}

/// Round a money amount to cents, midpoint away from zero
pub fn round_cost(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Cost per kg with four decimals; zero for an empty quantity
pub fn weighted_unit_cost(total_cost: Decimal, quantity_kg: Decimal) -> Decimal {
    if quantity_kg <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (total_cost / quantity_kg).round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Total quantity still available across the open layers
pub fn available_kg(layers: &[OpenLayer]) -> Decimal {
    layers
        .iter()
        .filter(|layer| layer.remaining_kg > Decimal::ZERO)
        .map(|layer| layer.remaining_kg)
        .sum()
}

/// Value of `quantity` kg at `unit_price`, rounded to cents
pub fn layer_value(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, PlanError> {
    quantity
        .checked_mul(unit_price)
        .map(round_cost)
        .ok_or(PlanError::AmountOverflow)
}

/// Sum money amounts, failing instead of panicking on overflow
pub fn checked_sum<I>(amounts: I) -> Result<Decimal, PlanError>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or(PlanError::AmountOverflow)
}

/// Plan a FIFO draw of `quantity` kg across `layers`.
///
/// The whole request is rejected when the open layers cannot cover it;
/// a plan never leaves a shortfall.
pub fn plan_fifo_allocation(
    layers: &[OpenLayer],
    quantity: Decimal,
    max_lots: usize,
) -> Result<FifoPlan, PlanError> {
    if quantity <= Decimal::ZERO {
        return Err(PlanError::NonPositiveQuantity);
    }

    let available = available_kg(layers);
    if available < quantity {
        return Err(PlanError::InsufficientStock {
            requested: quantity,
            available,
        });
    }

    let mut ordered: Vec<&OpenLayer> = layers
        .iter()
        .filter(|layer| layer.remaining_kg > Decimal::ZERO)
        .collect();
    ordered.sort_by(|a, b| (a.entry_date, a.sequence).cmp(&(b.entry_date, b.sequence)));

    let mut still_needed = quantity;
    let mut draws = Vec::new();

    for layer in ordered {
        if still_needed <= Decimal::ZERO {
            break;
        }
        if draws.len() == max_lots {
            return Err(PlanError::TooFragmented { max_lots });
        }

        let take = still_needed.min(layer.remaining_kg);
        let cost = take
            .checked_mul(layer.unit_price)
            .ok_or(PlanError::AmountOverflow)?;
        draws.push(LayerDraw {
            entry_id: layer.entry_id,
            entry_number: layer.entry_number.clone(),
            expected_version: layer.version,
            quantity_kg: take,
            unit_price: layer.unit_price,
            cost,
            remaining_after: layer.remaining_kg - take,
        });
        still_needed -= take;
    }

    let total_cost = round_cost(checked_sum(draws.iter().map(|d| d.cost))?);

    Ok(FifoPlan {
        quantity_kg: quantity,
        draws,
        total_cost,
    })
}

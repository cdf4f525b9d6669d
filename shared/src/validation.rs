//! Input validation shared by the backend and the WASM preview

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    FifoAllocationRequest, LedgerQuery, NewMaterialAdjustment, NewMaterialEntry, NewRemision,
    MAX_PAGE_SIZE,
};

/// Upper bound for a single quantity, kg
pub const MAX_QUANTITY_KG: i64 = 1_000_000_000;

/// Upper bound for a unit price per kg
pub const MAX_UNIT_PRICE: i64 = 1_000_000_000;

/// Quantities are stored with gram precision
pub const QUANTITY_SCALE: u32 = 3;

/// Unit prices are stored with four decimals
pub const PRICE_SCALE: u32 = 4;

/// Validate a quantity consumed or received (must be positive)
pub fn validate_quantity_kg(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    if quantity > Decimal::from(MAX_QUANTITY_KG) {
        return Err("Quantity exceeds the maximum allowed");
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("Quantity allows at most 3 decimals");
    }
    Ok(())
}

/// Validate a unit price (zero allowed for donated or unpriced stock)
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    if price > Decimal::from(MAX_UNIT_PRICE) {
        return Err("Unit price exceeds the maximum allowed");
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err("Unit price allows at most 4 decimals");
    }
    Ok(())
}

/// Validate minimum/maximum stock thresholds
pub fn validate_stock_thresholds(
    minimum: Decimal,
    maximum: Option<Decimal>,
) -> Result<(), &'static str> {
    if minimum < Decimal::ZERO {
        return Err("Minimum stock cannot be negative");
    }
    if let Some(max) = maximum {
        if max < minimum {
            return Err("Maximum stock must be at least the minimum stock");
        }
    }
    Ok(())
}

/// Validate a required identifier
pub fn validate_id(id: Uuid) -> Result<(), &'static str> {
    if id.is_nil() {
        return Err("Identifier is required");
    }
    Ok(())
}

/// Validate a plant or material code: 1-20 chars of A-Z, 0-9, '-' or '_'
pub fn validate_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() || code.len() > 20 {
        return Err("Code must be 1-20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("Code may only contain A-Z, 0-9, '-' and '_'");
    }
    Ok(())
}

/// Validate a FIFO allocation request before any ledger access.
///
/// Returns the offending field with the message.
pub fn validate_allocation_request(
    request: &FifoAllocationRequest,
) -> Result<(), (&'static str, &'static str)> {
    validate_id(request.remision_id).map_err(|m| ("remision_id", m))?;
    validate_id(request.remision_material_id).map_err(|m| ("remision_material_id", m))?;
    validate_id(request.material_id).map_err(|m| ("material_id", m))?;
    validate_id(request.plant_id).map_err(|m| ("plant_id", m))?;
    validate_quantity_kg(request.quantity_to_consume).map_err(|m| ("quantity_to_consume", m))?;
    Ok(())
}

/// Validate a material entry before it becomes a lot
pub fn validate_new_entry(input: &NewMaterialEntry) -> Result<(), (&'static str, &'static str)> {
    validate_id(input.plant_id).map_err(|m| ("plant_id", m))?;
    validate_id(input.material_id).map_err(|m| ("material_id", m))?;
    validate_quantity_kg(input.quantity_received_kg).map_err(|m| ("quantity_received_kg", m))?;
    if let Some(price) = input.unit_price {
        validate_unit_price(price).map_err(|m| ("unit_price", m))?;
    }
    Ok(())
}

/// Validate an adjustment before any lot is touched
pub fn validate_new_adjustment(
    input: &NewMaterialAdjustment,
) -> Result<(), (&'static str, &'static str)> {
    validate_id(input.plant_id).map_err(|m| ("plant_id", m))?;
    validate_id(input.material_id).map_err(|m| ("material_id", m))?;
    validate_quantity_kg(input.quantity_adjusted_kg).map_err(|m| ("quantity_adjusted_kg", m))?;
    if input.reference_notes.trim().is_empty() {
        return Err(("reference_notes", "A reason for the adjustment is required"));
    }
    if input.reference_notes.len() > 500 {
        return Err(("reference_notes", "Reference notes must be at most 500 characters"));
    }
    if input.reference_type.as_ref().is_some_and(|t| t.len() > 50) {
        return Err(("reference_type", "Reference type must be at most 50 characters"));
    }
    Ok(())
}

/// Validate a ledger listing filter
pub fn validate_ledger_query(query: &LedgerQuery) -> Result<(), (&'static str, &'static str)> {
    validate_id(query.plant_id).map_err(|m| ("plant_id", m))?;
    if query.limit < 1 || query.limit > MAX_PAGE_SIZE {
        return Err(("limit", "Limit must be between 1 and 200"));
    }
    if query.offset < 0 {
        return Err(("offset", "Offset cannot be negative"));
    }
    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(("date_from", "Start date cannot be after the end date"));
        }
    }
    Ok(())
}

/// Validate a remision and its material rows.
///
/// Zero quantities are accepted (the row is simply never allocated).
pub fn validate_new_remision(input: &NewRemision) -> Result<(), (&'static str, &'static str)> {
    if input.remision_number.trim().is_empty() || input.remision_number.len() > 50 {
        return Err(("remision_number", "Remision number must be 1-50 characters"));
    }
    validate_id(input.plant_id).map_err(|m| ("plant_id", m))?;
    for material in &input.materials {
        validate_id(material.material_id).map_err(|m| ("materials.material_id", m))?;
        if material.cantidad_real < Decimal::ZERO {
            return Err(("materials.cantidad_real", "Quantity cannot be negative"));
        }
        if !material.cantidad_real.is_zero() {
            validate_quantity_kg(material.cantidad_real)
                .map_err(|m| ("materials.cantidad_real", m))?;
        }
    }
    Ok(())
}

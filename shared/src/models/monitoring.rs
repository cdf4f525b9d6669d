//! Inventory health signals and ledger activity records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockKey;

/// Health signal level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Ok,
    Caution,
    Warning,
    High,
    Low,
    Info,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Caution => "CAUTION",
            HealthStatus::Warning => "WARNING",
            HealthStatus::High => "HIGH",
            HealthStatus::Low => "LOW",
            HealthStatus::Info => "INFO",
        }
    }
}

/// One row of the system health view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthMetric {
    pub metric_name: String,
    pub metric_value: Decimal,
    pub status: HealthStatus,
    pub message: String,
}

impl HealthMetric {
    pub fn new(
        metric_name: &str,
        metric_value: impl Into<Decimal>,
        status: HealthStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            metric_value: metric_value.into(),
            status,
            message: message.into(),
        }
    }
}

/// Ledger mutation counts for one stock position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialUpdateFrequency {
    pub material_id: Uuid,
    pub plant_id: Uuid,
    pub updates_last_24h: i64,
    pub updates_last_7d: i64,
    pub last_update_at: Option<DateTime<Utc>>,
}

/// Dead-row report for one storage table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMaintenance {
    pub table_name: String,
    pub live_rows: i64,
    pub dead_rows: i64,
    pub dead_row_ratio_pct: Decimal,
    pub needs_vacuum: bool,
}

/// Raw row counters for a storage table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableStats {
    pub table_name: String,
    pub live_rows: i64,
    /// Superseded or deleted row versions not yet reclaimed
    pub dead_rows: i64,
}

impl TableStats {
    /// dead / (live + dead), as a percentage with two decimals
    pub fn dead_row_ratio_pct(&self) -> Decimal {
        let total = self.live_rows + self.dead_rows;
        if total <= 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.dead_rows) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
    }
}

/// Kind of ledger mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    EntryRecorded,
    AllocationRecorded,
    AdjustmentRecorded,
    InventoryRecomputed,
}

impl LedgerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventKind::EntryRecorded => "entry_recorded",
            LedgerEventKind::AllocationRecorded => "allocation_recorded",
            LedgerEventKind::AdjustmentRecorded => "adjustment_recorded",
            LedgerEventKind::InventoryRecomputed => "inventory_recomputed",
        }
    }
}

impl std::str::FromStr for LedgerEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry_recorded" => Ok(LedgerEventKind::EntryRecorded),
            "allocation_recorded" => Ok(LedgerEventKind::AllocationRecorded),
            "adjustment_recorded" => Ok(LedgerEventKind::AdjustmentRecorded),
            "inventory_recomputed" => Ok(LedgerEventKind::InventoryRecomputed),
            other => Err(format!("unknown ledger event kind: {}", other)),
        }
    }
}

/// A ledger mutation, kept for update-frequency monitoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEvent {
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub kind: LedgerEventKind,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEvent {
    pub fn new(key: StockKey, kind: LedgerEventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            plant_id: key.plant_id,
            material_id: key.material_id,
            kind,
            occurred_at,
        }
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.plant_id, self.material_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_row_ratio() {
        let stats = |live, dead| TableStats {
            table_name: "material_entries".to_string(),
            live_rows: live,
            dead_rows: dead,
        };

        assert_eq!(stats(0, 0).dead_row_ratio_pct(), Decimal::ZERO);
        assert_eq!(stats(90, 10).dead_row_ratio_pct(), Decimal::from(10));
        assert_eq!(stats(2, 1).dead_row_ratio_pct().to_string(), "33.33");
    }

    #[test]
    fn test_health_status_serialization() {
        let json = serde_json::to_string(&HealthStatus::Caution).unwrap();
        assert_eq!(json, "\"CAUTION\"");
    }
}

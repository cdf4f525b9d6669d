//! Shared fixtures for backend integration tests

#![allow(dead_code)]

pub mod faulty;

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use material_ledger_backend::config::Config;
use material_ledger_backend::services::{
    BatchInventoryService, FifoAllocationService, InventoryLedgerService,
    InventoryMonitoringService,
};
use material_ledger_backend::{InMemoryLedgerStore, LedgerStore};
use rust_decimal::Decimal;
use shared::{
    FifoAllocationRequest, Material, MaterialEntry, NewMaterial, NewMaterialEntry, NewPlant,
    NewRemision, NewRemisionMaterial, Plant, Remision, StockKey,
};
use uuid::Uuid;

// Helper to create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One in-memory ledger with a plant and a material registered
pub struct Fixture {
    pub store: Arc<dyn LedgerStore>,
    pub config: Config,
    pub plant: Plant,
    pub material: Material,
    pub user: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::over(Arc::new(InMemoryLedgerStore::new()), config).await
    }

    /// Same fixture over any store
    pub async fn over(store: Arc<dyn LedgerStore>, config: Config) -> Self {
        let plant = store
            .upsert_plant(NewPlant {
                id: None,
                code: "P001".to_string(),
                name: "Planta Norte".to_string(),
            })
            .await
            .unwrap();
        let material = store
            .upsert_material(NewMaterial {
                id: None,
                material_code: "CEM-CPC40".to_string(),
                material_name: "Cemento CPC 40".to_string(),
                category: Some("cemento".to_string()),
            })
            .await
            .unwrap();

        Self {
            store,
            config,
            plant,
            material,
            user: Uuid::new_v4(),
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.plant.id, self.material.id)
    }

    pub fn fifo(&self) -> FifoAllocationService {
        FifoAllocationService::new(self.store.clone(), self.config.fifo.clone())
    }

    pub fn ledger(&self) -> InventoryLedgerService {
        InventoryLedgerService::new(self.store.clone(), self.config.fifo.clone())
    }

    pub fn batch(&self) -> BatchInventoryService {
        BatchInventoryService::new(self.store.clone(), self.config.fifo.clone())
    }

    pub fn monitoring(&self) -> InventoryMonitoringService {
        InventoryMonitoringService::new(self.store.clone(), self.config.monitoring.clone())
    }

    /// Register another material at the same plant
    pub async fn add_material(&self, code: &str) -> Material {
        self.store
            .upsert_material(NewMaterial {
                id: None,
                material_code: code.to_string(),
                material_name: code.to_string(),
                category: None,
            })
            .await
            .unwrap()
    }

    /// Receive a priced lot of the fixture material
    pub async fn receive(&self, kg: &str, price: &str, on: NaiveDate) -> MaterialEntry {
        self.receive_material(self.material.id, kg, Some(price), on).await
    }

    pub async fn receive_material(
        &self,
        material_id: Uuid,
        kg: &str,
        price: Option<&str>,
        on: NaiveDate,
    ) -> MaterialEntry {
        self.ledger()
            .record_material_entry(
                NewMaterialEntry {
                    plant_id: self.plant.id,
                    material_id,
                    supplier_id: None,
                    entry_date: Some(on),
                    quantity_received_kg: dec(kg),
                    unit_price: price.map(dec),
                    supplier_invoice: None,
                    notes: None,
                },
                self.user,
            )
            .await
            .unwrap()
    }

    /// Store a remision without allocating it
    pub async fn remision(&self, number: &str, fecha: NaiveDate, rows: &[(Uuid, &str)]) -> Remision {
        self.store
            .insert_remision(NewRemision {
                id: None,
                remision_number: number.to_string(),
                plant_id: self.plant.id,
                fecha,
                materials: rows
                    .iter()
                    .map(|(material_id, kg)| NewRemisionMaterial {
                        id: None,
                        material_id: *material_id,
                        cantidad_real: dec(kg),
                    })
                    .collect(),
            })
            .await
            .unwrap()
    }

    /// Allocation request for one row of a stored remision
    pub fn request_for(&self, remision: &Remision, row: usize) -> FifoAllocationRequest {
        let material = &remision.materials[row];
        FifoAllocationRequest {
            remision_id: remision.id,
            remision_material_id: material.id,
            material_id: material.material_id,
            plant_id: remision.plant_id,
            quantity_to_consume: material.cantidad_real,
            consumption_date: remision.fecha,
        }
    }

    pub async fn current_stock(&self, material_id: Uuid) -> Decimal {
        self.store
            .inventory(StockKey::new(self.plant.id, material_id))
            .await
            .unwrap()
            .map_or(Decimal::ZERO, |row| row.current_stock)
    }
}

//! Error handling for the material ledger
//!
//! Provides consistent error responses in English and Spanish

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::fifo::PlanError;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_es: String,
    },

    // Allocation errors
    #[error("Remision material {remision_material_id} is already allocated with a different quantity")]
    AlreadyAllocated { remision_material_id: Uuid },

    #[error("Insufficient stock: requested {requested}kg, available {available}kg")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Allocation would touch more than {max_lots} lots")]
    AllocationTooFragmented { max_lots: usize },

    #[error("Inventory triggers are disabled for a bulk import")]
    TriggersDisabled,

    /// A lot changed between read and commit; the engine retries these
    #[error("Lot {entry_id} changed during allocation")]
    VersionConflict { entry_id: Uuid },

    #[error("Allocation still contended after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    // Storage errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Trigger state error: {0}")]
    TriggerState(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Build a field validation error
    pub fn validation(field: &str, message: &str, message_es: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_es: message_es.to_string(),
        }
    }

    /// Wrap a failure from `shared::validation`, which only carries English text
    pub fn invalid_field((field, message): (&str, &str)) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_es: format!("Valor inválido en el campo {}", field),
        }
    }

    /// Transient errors a caller may retry as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrencyConflict { .. } | AppError::VersionConflict { .. }
        )
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::NonPositiveQuantity => AppError::validation(
                "quantity_to_consume",
                "Quantity to consume must be positive",
                "La cantidad a consumir debe ser positiva",
            ),
            PlanError::InsufficientStock {
                requested,
                available,
            } => AppError::InsufficientStock {
                requested,
                available,
            },
            PlanError::TooFragmented { max_lots } => AppError::AllocationTooFragmented { max_lots },
            PlanError::AmountOverflow => AppError::validation(
                "quantity_to_consume",
                "Cost of the quantity at these lot prices is too large",
                "El costo de la cantidad a estos precios de lote es demasiado grande",
            ),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, code, message_en, message_es, field) = match &self {
            AppError::Validation {
                field,
                message,
                message_es,
            } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                message.clone(),
                message_es.clone(),
                Some(field.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                format!("No se encontró {}", resource),
                None,
            ),
            AppError::Conflict {
                resource,
                message,
                message_es,
            } => (
                StatusCode::CONFLICT,
                "CONFLICT",
                message.clone(),
                message_es.clone(),
                Some(resource.clone()),
            ),
            AppError::AlreadyAllocated {
                remision_material_id,
            } => (
                StatusCode::CONFLICT,
                "ALREADY_ALLOCATED",
                format!(
                    "Remision material {} was already allocated with a different quantity",
                    remision_material_id
                ),
                format!(
                    "El material de remisión {} ya fue asignado con otra cantidad",
                    remision_material_id
                ),
                Some("remision_material_id".to_string()),
            ),
            AppError::InsufficientStock {
                requested,
                available,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_STOCK",
                format!(
                    "Insufficient inventory: requested {}kg, available {}kg",
                    requested, available
                ),
                format!(
                    "Inventario insuficiente: solicitado {}kg, disponible {}kg",
                    requested, available
                ),
                Some("quantity_to_consume".to_string()),
            ),
            AppError::AllocationTooFragmented { max_lots } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ALLOCATION_TOO_FRAGMENTED",
                format!("Allocation would touch more than {} lots", max_lots),
                format!("La asignación tocaría más de {} lotes", max_lots),
                None,
            ),
            AppError::TriggersDisabled => (
                StatusCode::LOCKED,
                "TRIGGERS_DISABLED",
                "A bulk import is in progress; try again when it finishes".to_string(),
                "Hay una importación masiva en curso; intente de nuevo al terminar".to_string(),
                None,
            ),
            AppError::VersionConflict { .. } | AppError::ConcurrencyConflict { .. } => (
                StatusCode::CONFLICT,
                "CONCURRENCY_CONFLICT",
                "The stock changed while allocating; please retry".to_string(),
                "El inventario cambió durante la asignación; intente de nuevo".to_string(),
                None,
            ),
            AppError::Persistence(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PERSISTENCE_ERROR",
                "The ledger store rejected the operation; nothing was committed".to_string(),
                "El almacén rechazó la operación; no se guardó nada".to_string(),
                None,
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                "A database error occurred; nothing was committed".to_string(),
                "Ocurrió un error de base de datos; no se guardó nada".to_string(),
                None,
            ),
            AppError::TriggerState(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TRIGGER_STATE_ERROR",
                format!("Inventory trigger state error: {}", msg),
                format!("Error en el estado de los disparadores de inventario: {}", msg),
                None,
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                format!("Configuration error: {}", msg),
                format!("Error de configuración: {}", msg),
                None,
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                "Error interno del servidor".to_string(),
                None,
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                "Error interno del servidor".to_string(),
                None,
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let detail = ErrorDetail {
            code: code.to_string(),
            message_en,
            message_es,
            field,
            retryable,
        };

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

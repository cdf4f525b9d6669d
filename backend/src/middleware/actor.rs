//! Acting user extraction
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in the `x-user-id` header and every ledger mutation records it.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::error::{ErrorDetail, ErrorResponse};

/// Header carrying the acting user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the acting user
/// Use this in handlers that write to the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .filter(|id| !id.is_nil())
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail {
                        code: "UNAUTHORIZED".to_string(),
                        message_en: "A valid x-user-id header is required".to_string(),
                        message_es: "Se requiere un encabezado x-user-id válido".to_string(),
                        field: Some(USER_ID_HEADER.to_string()),
                        retryable: false,
                    },
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{AppState, error::AppError};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

const ANONYMOUS: &str = "anonymous";

/// Caller identity as forwarded by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
}

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let tenant_id = header(parts, TENANT_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {TENANT_HEADER} header")))?;
        let user_id = header(parts, USER_HEADER).unwrap_or_else(|| ANONYMOUS.to_string());

        tracing::Span::current().record("tenant_id", tenant_id.as_str());

        Ok(TenantContext { tenant_id, user_id })
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

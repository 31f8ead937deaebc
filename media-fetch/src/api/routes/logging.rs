//! Runtime log filter routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::AuthUser;
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/logging", get(get_logging_config).put(update_logging_config))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    /// e.g. `media_fetch=debug,sqlx=warn`
    pub filter: String,
}

async fn get_logging_config(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;
    tracing::info!(user = %claims.sub, filter = %request.filter, "Log filter changed");

    Ok(Json(LoggingConfigResponse {
        filter: request.filter,
    }))
}

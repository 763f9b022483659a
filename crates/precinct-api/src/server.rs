//! HTTP control surface over the service facade. Thin by design: handlers
//! parse, delegate, and translate `ServiceError` into the shared error
//! envelope. Rendering is the presentation layer's job.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use contracts::{ApiError, ErrorCode, ProfileId};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;

use crate::{load_catalog, GameService, ServiceError};

#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Clone)]
struct AppState {
    service: Arc<GameService>,
    content_dir: Option<PathBuf>,
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn invalid_command(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidCommand, message, None),
        }
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, details),
        }
    }
}

impl From<ServiceError> for HttpApiError {
    fn from(err: ServiceError) -> Self {
        let (status, code) = match &err {
            ServiceError::ProfileNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::ProfileNotFound),
            ServiceError::UnknownId { .. } => (StatusCode::NOT_FOUND, ErrorCode::UnknownId),
            ServiceError::Ineligible(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidCommand),
            ServiceError::InsufficientFunds { .. } => {
                (StatusCode::CONFLICT, ErrorCode::InsufficientFunds)
            }
            ServiceError::InvalidState(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InvalidState)
            }
            ServiceError::Store(_) | ServiceError::Ledger(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::CollaboratorFailure,
            ),
        };
        Self {
            status,
            error: ApiError::new(code, err.to_string(), None),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

pub async fn serve(
    addr: SocketAddr,
    service: Arc<GameService>,
    content_dir: Option<PathBuf>,
) -> Result<(), ServerError> {
    let state = AppState {
        service,
        content_dir,
    };
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/profiles", post(create_profile))
        .route("/api/v1/profiles/{profile_id}", get(get_profile))
        .route("/api/v1/profiles/{profile_id}/tick", post(process_ticks))
        .route(
            "/api/v1/profiles/{profile_id}/dispatch",
            post(dispatch_mission),
        )
        .route(
            "/api/v1/profiles/{profile_id}/automation",
            post(set_automation),
        )
        .route(
            "/api/v1/profiles/{profile_id}/vehicles",
            post(purchase_vehicle),
        )
        .route("/api/v1/profiles/{profile_id}/staff", post(hire_staff))
        .route(
            "/api/v1/profiles/{profile_id}/units/{unit_id}",
            delete(sell_unit),
        )
        .route(
            "/api/v1/profiles/{profile_id}/upgrades",
            post(purchase_upgrade),
        )
        .route(
            "/api/v1/profiles/{profile_id}/districts",
            post(unlock_district),
        )
        .route(
            "/api/v1/admin/profiles/{profile_id}",
            post(admin_edit_profile),
        )
        .route(
            "/api/v1/admin/profiles/{profile_id}/reset",
            post(admin_reset_profile),
        )
        .route("/api/v1/admin/reload", post(admin_reload_content))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateProfileRequest {
    #[serde(with = "contracts::serde_u64_string")]
    profile_id: ProfileId,
}

async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .get_or_create_profile(request.profile_id)
        .await?;
    Ok(Json(profile))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
) -> Result<impl IntoResponse, HttpApiError> {
    let report = state.service.profile_report(profile_id, Utc::now()).await?;
    Ok(Json(report))
}

async fn process_ticks(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
) -> Result<impl IntoResponse, HttpApiError> {
    let report = state
        .service
        .process_pending_ticks(profile_id, Utc::now())
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
    mission_id: String,
}

async fn dispatch_mission(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<DispatchRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let record = state
        .service
        .dispatch_mission(profile_id, &request.mission_id, Utc::now())
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct AutomationRequest {
    enabled: bool,
    #[serde(default)]
    policy_id: Option<String>,
}

async fn set_automation(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<AutomationRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .set_automation(profile_id, request.enabled, request.policy_id.as_deref())
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct TypeRequest {
    type_id: String,
}

async fn purchase_vehicle(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<TypeRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .purchase_vehicle(profile_id, &request.type_id)
        .await?;
    Ok(Json(profile))
}

async fn hire_staff(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<TypeRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .hire_staff(profile_id, &request.type_id)
        .await?;
    Ok(Json(profile))
}

async fn sell_unit(
    State(state): State<AppState>,
    Path((profile_id, unit_id)): Path<(ProfileId, String)>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .sell_unit(profile_id, &unit_id, Utc::now())
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct UpgradeRequest {
    upgrade_id: String,
}

async fn purchase_upgrade(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<UpgradeRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .purchase_upgrade(profile_id, &request.upgrade_id)
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct DistrictRequest {
    district_id: String,
}

async fn unlock_district(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<DistrictRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state
        .service
        .unlock_district(profile_id, &request.district_id)
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
struct AdminEditRequest {
    field: String,
    value: Value,
}

async fn admin_edit_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
    Json(request): Json<AdminEditRequest>,
) -> Result<impl IntoResponse, HttpApiError> {
    let service = &state.service;
    let profile = match request.field.as_str() {
        "station_level" => {
            let level = require_u64(&request.value)? as u32;
            service.admin_set_station_level(profile_id, level).await?
        }
        "station_name" => {
            let name = require_str(&request.value)?;
            service.admin_set_station_name(profile_id, name).await?
        }
        "reputation" => {
            let reputation = require_i64(&request.value)?;
            service.admin_set_reputation(profile_id, reputation).await?
        }
        "heat" => {
            let heat = require_i64(&request.value)?;
            service.admin_set_heat(profile_id, heat).await?
        }
        "home_district" => {
            let district = require_str(&request.value)?;
            service.admin_set_home_district(profile_id, district).await?
        }
        "release_unit" => {
            let unit_id = require_str(&request.value)?;
            service.admin_release_unit(profile_id, unit_id).await?
        }
        "grant_credits" => {
            let amount = require_i64(&request.value)?;
            let balance = service
                .admin_grant_credits(profile_id, amount, Utc::now())
                .await?;
            return Ok(Json(serde_json::json!({ "balance": balance })));
        }
        other => {
            return Err(HttpApiError::invalid_command(format!(
                "unknown field {other}; use one of: station_level, station_name, \
                 reputation, heat, home_district, release_unit, grant_credits"
            )))
        }
    };
    Ok(Json(serde_json::json!(profile)))
}

async fn admin_reset_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<ProfileId>,
) -> Result<impl IntoResponse, HttpApiError> {
    let profile = state.service.admin_reset_profile(profile_id).await?;
    Ok(Json(profile))
}

async fn admin_reload_content(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, HttpApiError> {
    let Some(dir) = state.content_dir.as_deref() else {
        return Err(HttpApiError::invalid_command(
            "server was started without a content directory",
        ));
    };
    let catalog =
        load_catalog(dir).map_err(|err| HttpApiError::internal("reload failed", Some(err.to_string())))?;
    let missions = catalog.mission_count();
    let districts = catalog.district_count();
    state.service.swap_catalog(catalog);
    Ok(Json(serde_json::json!({
        "missions": missions,
        "districts": districts,
    })))
}

fn require_u64(value: &Value) -> Result<u64, HttpApiError> {
    value
        .as_u64()
        .ok_or_else(|| HttpApiError::invalid_command("value must be a non-negative integer"))
}

fn require_i64(value: &Value) -> Result<i64, HttpApiError> {
    value
        .as_i64()
        .ok_or_else(|| HttpApiError::invalid_command("value must be an integer"))
}

fn require_str(value: &Value) -> Result<&str, HttpApiError> {
    value
        .as_str()
        .ok_or_else(|| HttpApiError::invalid_command("value must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_expected_statuses() {
        let cases = [
            (
                HttpApiError::from(ServiceError::ProfileNotFound(9)),
                StatusCode::NOT_FOUND,
                ErrorCode::ProfileNotFound,
            ),
            (
                HttpApiError::from(ServiceError::InsufficientFunds {
                    balance: 10,
                    required: 110,
                }),
                StatusCode::CONFLICT,
                ErrorCode::InsufficientFunds,
            ),
            (
                HttpApiError::from(ServiceError::Ledger(crate::LedgerError::Unavailable(
                    "down".to_string(),
                ))),
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::CollaboratorFailure,
            ),
            (
                HttpApiError::from(ServiceError::Ineligible("nope".to_string())),
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidCommand,
            ),
        ];

        for (mapped, status, code) in cases {
            assert_eq!(mapped.status, status);
            assert_eq!(mapped.error.code, code);
        }
    }

    #[test]
    fn admin_values_are_type_checked() {
        assert_eq!(require_i64(&serde_json::json!(42)).expect("int"), 42);
        assert!(require_i64(&serde_json::json!("42")).is_err());
        assert_eq!(require_str(&serde_json::json!("harbor")).expect("str"), "harbor");
        assert!(require_str(&serde_json::json!(7)).is_err());
    }
}

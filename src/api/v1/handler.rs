use super::error::*;
use crate::application_impl::SessionRegistry;
use crate::application_port::*;
use crate::domain_model::ClientId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn lookup(
    registry: &SessionRegistry,
    client_id: String,
) -> Result<Arc<dyn SessionLifecycle>, warp::Rejection> {
    let manager = registry
        .get(&ClientId::new(client_id))
        .ok_or_else(|| reject::custom(ApiErrorCode::SessionNotFound))?;
    Ok(manager)
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub client_id: ClientId,
    pub phase: LifecyclePhase,
}

pub async fn list_sessions(
    registry: Arc<SessionRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sessions: Vec<SessionSummary> = registry
        .client_ids()
        .into_iter()
        .filter_map(|client_id| {
            let phase = registry.get(&client_id)?.phase();
            Some(SessionSummary { client_id, phase })
        })
        .collect();
    Ok(warp::reply::json(&ApiResponse::ok(sessions)))
}

/// Everything about a session except its tokens.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub client_id: ClientId,
    pub phase: LifecyclePhase,
    pub expires_at: Option<DateTime<Utc>>,
    pub time_until_expiry_ms: u64,
    pub needs_refresh: bool,
    pub is_expired: bool,
    pub has_refresh_token: bool,
}

pub async fn session_status(
    client_id: String,
    registry: Arc<SessionRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let manager = lookup(&registry, client_id.clone())?;

    let info = manager.get_session_info().await;
    let status = SessionStatus {
        client_id: ClientId::new(client_id),
        phase: manager.phase(),
        expires_at: info.as_ref().map(|info| info.expires_at),
        time_until_expiry_ms: manager.get_time_until_expiry().await.as_millis() as u64,
        needs_refresh: manager.needs_refresh().await,
        is_expired: manager.is_expired().await,
        has_refresh_token: info.is_some_and(|info| info.refresh_token.is_some()),
    };
    Ok(warp::reply::json(&ApiResponse::ok(status)))
}

#[derive(Debug, Serialize)]
pub struct EnsureFreshResponse {
    pub usable: bool,
}

pub async fn ensure_fresh(
    client_id: String,
    registry: Arc<SessionRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let manager = lookup(&registry, client_id)?;
    let usable = manager.ensure_fresh_session().await;
    Ok(warp::reply::json(&ApiResponse::ok(EnsureFreshResponse { usable })))
}

#[derive(Debug, Serialize)]
pub struct PhaseResponse {
    pub phase: LifecyclePhase,
}

pub async fn start_monitoring(
    client_id: String,
    registry: Arc<SessionRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let manager = lookup(&registry, client_id)?;
    manager.start_monitoring().await;
    let phase = manager.phase();
    Ok(warp::reply::json(&ApiResponse::ok(PhaseResponse { phase })))
}

pub async fn stop_monitoring(
    client_id: String,
    registry: Arc<SessionRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let manager = lookup(&registry, client_id)?;
    manager.stop_monitoring();
    let phase = manager.phase();
    Ok(warp::reply::json(&ApiResponse::ok(PhaseResponse { phase })))
}

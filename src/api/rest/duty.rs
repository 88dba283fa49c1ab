use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::backend::PushStatus;
use crate::error::AppError;
use crate::geo::PositionSample;
use crate::models::nurse::{DutyState, NurseProfile};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/duty", post(set_duty))
        .route("/position", post(report_position))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub profile: NurseProfile,
    pub duty: DutyState,
    pub push_status: PushStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyRequest {
    pub on_duty: bool,
}

async fn get_profile(State(state): State<Arc<AppState>>) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        profile: state.profile.read().await.clone(),
        duty: state.duty.read().await.clone(),
        push_status: state.push_status.read().await.clone(),
    })
}

/// Going off duty always succeeds locally. Going on duty needs a position
/// and the backend's agreement. No lock is held while the backend answers, so
/// position fixes keep flowing during the call.
async fn set_duty(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DutyRequest>,
) -> Result<Json<DutyState>, AppError> {
    if !payload.on_duty {
        if let Err(err) = state.backend.set_duty(None).await {
            warn!(error = %err, "failed to report going off duty");
        }
        let duty = {
            let mut duty = state.duty.write().await;
            duty.on_duty = false;
            duty.clone()
        };
        state.profile.write().await.is_available = false;
        info!("off duty");
        return Ok(Json(duty));
    }

    let position = state
        .duty
        .read()
        .await
        .last_position
        .ok_or_else(|| AppError::BadRequest("location unavailable".to_string()))?;

    state.backend.set_duty(Some(position)).await.map_err(|err| {
        warn!(error = %err, "failed to go on duty");
        AppError::Upstream("could not go on duty".to_string())
    })?;

    let duty = {
        let mut duty = state.duty.write().await;
        duty.on_duty = true;
        duty.clone()
    };
    state.profile.write().await.is_available = true;
    info!(lat = position.lat, lng = position.lng, "on duty");
    Ok(Json(duty))
}

/// Device GPS bridge. Every fix updates the last known position and reaches
/// the position stream of an active order, if any.
async fn report_position(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<PositionSample>,
) -> Result<StatusCode, AppError> {
    if !(-90.0..=90.0).contains(&sample.lat) || !(-180.0..=180.0).contains(&sample.lng) {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }

    state.duty.write().await.last_position = Some(sample.point());

    if state.positions.send(sample).is_err() {
        debug!("no active order to stream position to");
    }
    Ok(StatusCode::ACCEPTED)
}

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use farebid_core::engine::NegotiationError;
use farebid_core::model::SessionTimeline;
use farebid_sdk::objects::{CounterRequest, CreateSessionRequest, SessionView};
use uuid::Uuid;

use super::ApiError;
use crate::api::extractors::AuthenticatedActor;
use crate::state::AppState;

fn to_response(session_id: Uuid, timeline: &SessionTimeline) -> Result<Json<SessionView>, ApiError> {
    timeline.to_view().map(Json).ok_or_else(|| {
        ApiError::session(
            session_id,
            NegotiationError::Internal("session has no current offer".into()),
        )
    })
}

/// `POST /negotiation/sessions`
pub(super) async fn create_session(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state.engine.create(actor, request, deadline).await?;
    let id = timeline.session.id;
    Ok((StatusCode::CREATED, to_response(id, &timeline)?))
}

/// `GET /negotiation/sessions/{id}`
pub(super) async fn get_session(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state
        .engine
        .get(id, actor, deadline)
        .await
        .map_err(|e| ApiError::session(id, e))?;
    to_response(id, &timeline)
}

/// `POST /negotiation/sessions/{id}/counter`
pub(super) async fn counter(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
    Json(body): Json<CounterRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state
        .engine
        .counter(id, actor, body.amount, deadline)
        .await
        .map_err(|e| ApiError::session(id, e))?;
    to_response(id, &timeline)
}

/// `POST /negotiation/sessions/{id}/accept`
pub(super) async fn accept(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state
        .engine
        .accept(id, actor, deadline)
        .await
        .map_err(|e| ApiError::session(id, e))?;
    to_response(id, &timeline)
}

/// `POST /negotiation/sessions/{id}/withdraw`
pub(super) async fn withdraw(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state
        .engine
        .withdraw(id, actor, deadline)
        .await
        .map_err(|e| ApiError::session(id, e))?;
    to_response(id, &timeline)
}

/// `POST /negotiation/sessions/{id}/reject`
pub(super) async fn reject(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state
        .engine
        .reject(id, actor, deadline)
        .await
        .map_err(|e| ApiError::session(id, e))?;
    to_response(id, &timeline)
}

/// `POST /negotiation/sessions/{id}/join`
pub(super) async fn join(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let deadline = state.request_deadline().await;
    let timeline = state
        .engine
        .join(id, actor, deadline)
        .await
        .map_err(|e| ApiError::session(id, e))?;
    to_response(id, &timeline)
}

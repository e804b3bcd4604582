use crate::api::AppState;
use crate::api::schemas::notifications::{FeedbackEntry, NotifyRequest};
use crate::domain::ServiceConfig;
use crate::error::{PushError, Result};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// Provisions (or re-provisions) a provider service for an app.
///
/// # Errors
/// Returns `PushError::UnknownProvider` for an unsupported provider and
/// `PushError::Configuration` if the provider rejects the configuration.
pub async fn provision(
    State(state): State<AppState>,
    Path((app_id, provider)): Path<(String, String)>,
    Json(config): Json<ServiceConfig>,
) -> Result<impl IntoResponse> {
    state.registry.create_service(&app_id, &provider, &config)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Sends one notification, or a batch of token/payload pairs.
///
/// # Errors
/// Returns `PushError::ServiceNotFound` if the app was never provisioned for
/// the provider, otherwise whatever the provider reports.
pub async fn notify(
    State(state): State<AppState>,
    Path((app_id, provider)): Path<(String, String)>,
    Json(request): Json<NotifyRequest>,
) -> Result<impl IntoResponse> {
    request.validate().map_err(PushError::Encoding)?;
    let service = state.registry.get_service(&app_id, &provider)?;
    service.notify(request.targets, request.payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists device tokens the provider reports as no longer valid.
///
/// # Errors
/// Returns `PushError::Configuration` for providers without a feedback service.
pub async fn feedback(
    State(state): State<AppState>,
    Path((app_id, provider)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let service = state.registry.get_service(&app_id, &provider)?;
    let records = service.feedback().await?;
    Ok(Json(records.into_iter().map(FeedbackEntry::from).collect::<Vec<_>>()))
}

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chispart_contracts::styles::StyleCatalog;
use chispart_engine::{ProviderAdapter, ProviderError, ProviderRoute};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiState {
    pub adapter: Arc<ProviderAdapter>,
    pub styles: Arc<StyleCatalog>,
    pub max_extracted_prompts: usize,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required parameters")]
    MissingParameters,

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("worker task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingParameters => StatusCode::BAD_REQUEST,
            Self::Provider(err) => {
                error!(provider = %err.provider, "provider call failed: {}", err.message);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Task(err) => {
                error!("blocking provider task failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: Option<String>,
    pub art_style: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineImageRequest {
    pub original_image_uri: Option<String>,
    pub refinement_prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractPromptsRequest {
    pub text_block: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

fn required(value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .ok_or(ApiError::MissingParameters)
}

fn route(provider: Option<String>, model: Option<String>) -> Result<ProviderRoute, ApiError> {
    Ok(ProviderRoute::new(required(provider)?, required(model)?))
}

pub async fn generate_image(
    State(state): State<ApiState>,
    Json(request): Json<GenerateImageRequest>,
) -> Result<Json<Value>, ApiError> {
    let prompt = required(request.prompt)?;
    let art_style = required(request.art_style)?;
    let route = route(request.provider, request.model)?;
    // Known styles are appended here; unknown values leave the prompt as sent.
    let prompt = match state.styles.get(&art_style) {
        Some(style) if !prompt.ends_with(style.prompt_suffix.as_str()) => style.apply(&prompt),
        _ => prompt,
    };
    let adapter = state.adapter.clone();
    let image_url =
        tokio::task::spawn_blocking(move || adapter.generate_image(&prompt, &route)).await??;
    Ok(Json(json!({ "imageUrl": image_url })))
}

pub async fn refine_image(
    State(state): State<ApiState>,
    Json(request): Json<RefineImageRequest>,
) -> Result<Json<Value>, ApiError> {
    let original = required(request.original_image_uri)?;
    let instruction = required(request.refinement_prompt)?;
    let route = route(request.provider, request.model)?;
    let adapter = state.adapter.clone();
    let refined = tokio::task::spawn_blocking(move || {
        adapter.refine_image(&original, &instruction, &route)
    })
    .await??;
    Ok(Json(json!({ "refinedImageUri": refined })))
}

pub async fn extract_prompts(
    State(state): State<ApiState>,
    Json(request): Json<ExtractPromptsRequest>,
) -> Result<Json<Value>, ApiError> {
    let text_block = required(request.text_block)?;
    let route = route(request.provider, request.model)?;
    let adapter = state.adapter.clone();
    let max_prompts = state.max_extracted_prompts;
    let prompts = tokio::task::spawn_blocking(move || {
        adapter.extract_prompts(&text_block, &route, max_prompts)
    })
    .await??;
    Ok(Json(json!({ "prompts": prompts })))
}

pub async fn list_providers(State(state): State<ApiState>) -> Json<Value> {
    Json(provider_catalog(&state.adapter))
}

/// Providers with their capabilities, models and whether credentials are present.
pub fn provider_catalog(adapter: &ProviderAdapter) -> Value {
    let providers = adapter
        .catalog()
        .providers()
        .iter()
        .map(|descriptor| {
            let configured = !descriptor.requires_api_key()
                || descriptor.credential_env.iter().any(|key| {
                    std::env::var(key)
                        .map(|value| !value.trim().is_empty())
                        .unwrap_or(false)
                });
            json!({
                "id": descriptor.id,
                "name": descriptor.name,
                "capabilities": descriptor.capabilities,
                "configured": configured,
                "models": adapter.models_for(&descriptor.id),
            })
        })
        .collect::<Vec<Value>>();
    json!({ "providers": providers })
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/generate-image", post(generate_image))
        .route("/api/refine-image", post(refine_image))
        .route("/api/extract-prompts", post(extract_prompts))
        .route("/api/providers", get(list_providers))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ApiState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("chispart api listening on http://{addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("chispart api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {err}");
    }
}

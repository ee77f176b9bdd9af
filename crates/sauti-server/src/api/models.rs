//! Model listing endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub available_models: Vec<&'static str>,
    pub loaded_models: Vec<&'static str>,
    pub device: String,
}

/// List supported models and the subset currently resident in the cache.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let available_models = state
        .engine
        .available_models()
        .iter()
        .map(|m| m.id())
        .collect();
    let loaded_models = state
        .engine
        .loaded_models()
        .await
        .iter()
        .map(|m| m.id())
        .collect();

    Json(ModelsResponse {
        available_models,
        loaded_models,
        device: state.engine.device().kind.to_string(),
    })
}

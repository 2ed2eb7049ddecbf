use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    state::AppState,
};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_view(config: &AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "telephony": {
            "public_ws_url": config.telephony.public_ws_url,
            "stream_path": config.telephony.stream_path,
            "content_type": config.telephony.content_type
        },
        "agent": {
            "base_url": config.agent.base_url,
            "connect_timeout_ms": config.agent.connect_timeout_ms,
            "input_sample_rate": config.agent.input_sample_rate,
            "output_sample_rate": config.agent.output_sample_rate,
            "greeting_text": config.agent.greeting_text,
            "farewell_text": config.agent.farewell_text
        },
        "bridge": {
            "stop_grace_ms": config.bridge.stop_grace_ms,
            "opus_passthrough": config.bridge.opus_passthrough
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_view(&config)
    })))
}

/// Partially update the agent and bridge sections. Calls already in progress
/// keep the settings they started with.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.update_config(current_config.clone()).map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_view(&current_config)
    })))
}

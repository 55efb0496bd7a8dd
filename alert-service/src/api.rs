use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::handlers::WebhookHandler;

/// Header set by the webhook gateway after it has verified the sender.
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<WebhookHandler>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/inventory_levels_update", post(inventory_levels_update))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Acknowledges with 200 unless the event has to be redelivered.
pub async fn inventory_levels_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let gateway_shop = headers
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.handler.handle_payload(gateway_shop, &body).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!(error = %e, "Inventory event not acknowledged");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

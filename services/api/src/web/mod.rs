pub mod chat;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::require_auth;
pub use state::AppState;

/// Builds the API router. Everything except `/health` goes through `require_auth`.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(rest::health_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/materials",
            post(rest::create_material_handler).get(rest::list_materials_handler),
        )
        .route(
            "/materials/{id}",
            get(rest::get_material_handler)
                .put(rest::update_material_handler)
                .delete(rest::delete_material_handler),
        )
        .route("/materials/{id}/status", get(rest::material_status_handler))
        .route("/materials/{id}/phrases", get(rest::list_phrases_handler))
        .route("/materials/{id}/chat", get(chat::get_chat_by_material_handler))
        .route("/chat", post(chat::create_chat_handler))
        .route("/chat/{chat_id}", get(chat::get_chat_handler))
        .route("/chat/{chat_id}/messages", get(chat::list_messages_handler))
        .route("/chat/{chat_id}/chat", post(chat::send_message_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
